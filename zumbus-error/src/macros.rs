/// Немедленно возвращает ошибку (аналогично `anyhow::bail!`).
///
/// Поддерживает три формы:
/// - `bail!(err)`: принимает готовый тип ошибки;
/// - `bail!(code, "msg")`: создаёт `GenericError` с кодом и сообщением;
/// - `bail!(code, "fmt {}", arg)`: форматирует сообщение.
///
/// ```ignore
/// use zumbus_error::{bail, StatusCode};
///
/// fn validate_topic(topic: &str) -> Result<(), zumbus_error::StackError> {
///     if topic.is_empty() {
///         bail!(StatusCode::InvalidArgs, "Topic cannot be empty");
///     }
///     Ok(())
/// }
/// ```
#[macro_export]
macro_rules! bail {
    ($err:expr) => {
        return Err($crate::StackError::from($err))
    };
    ($code:expr, $msg:expr) => {
        return Err($crate::StackError::new(
            $crate::types::GenericError::new($code, $msg)
        ))
    };
    ($code:expr, $fmt:expr, $($arg:tt)*) => {
        return Err($crate::StackError::new(
            $crate::types::GenericError::new($code, format!($fmt, $($arg)*))
        ))
    };
}

/// Проверяет условие и вызывает `bail!`, если условие ложно.
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $err:expr) => {
        if !($cond) {
            $crate::bail!($err);
        }
    };
    ($cond:expr, $code:expr, $msg:expr) => {
        if !($cond) {
            $crate::bail!($code, $msg);
        }
    };
    ($cond:expr, $code:expr, $fmt:expr, $($arg:tt)*) => {
        if !($cond) {
            $crate::bail!($code, $fmt, $($arg)*);
        }
    };
}

/// Трейт-расширение для `Result`, добавляющее методы контекстирования.
///
/// Позволяет вызывать `.context(...)` и `.with_context(...)` на результатах,
/// превращая ошибку в [`StackError`](crate::StackError) и приклеивая к ней
/// контекст.
pub trait ResultExt<T> {
    /// Если `self`: `Err`, оборачивает ошибку в `StackError` и добавляет
    /// указанный контекст.
    fn context<C>(
        self,
        ctx: C,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>;

    /// Ленивый контекст (вызывается только в случае ошибки).
    fn with_context<C, F>(
        self,
        f: F,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<crate::StackError>,
{
    #[track_caller]
    fn context<C>(
        self,
        ctx: C,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>,
    {
        // `match` вместо `map_err`: замыкание потеряло бы место вызова.
        match self {
            Ok(v) => Ok(v),
            Err(e) => Err(e.into().context(ctx)),
        }
    }

    #[track_caller]
    fn with_context<C, F>(
        self,
        f: F,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        match self {
            Ok(v) => Ok(v),
            Err(e) => Err(e.into().context(f())),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GenericError, StatusCode, ZumbusResult};

    #[test]
    fn test_bail_simple() {
        fn example() -> ZumbusResult<()> {
            bail!(GenericError::new(StatusCode::InvalidArgs, "test error"));
        }

        assert!(example().is_err());
    }

    #[test]
    fn test_bail_with_format() {
        fn example(value: i32) -> ZumbusResult<()> {
            bail!(StatusCode::InvalidArgs, "Invalid value: {}", value);
        }

        let err = example(42).unwrap_err();
        assert!(err.to_string().contains("Invalid value: 42"));
    }

    #[test]
    fn test_ensure() {
        fn validate(x: i32) -> ZumbusResult<()> {
            ensure!(x > 0, StatusCode::InvalidArgs, "Value must be positive");
            ensure!(x < 100, StatusCode::InvalidArgs, "Value too large: {}", x);
            Ok(())
        }

        assert!(validate(50).is_ok());
        assert!(validate(-1).is_err());
        assert!(validate(150).is_err());
    }

    #[test]
    fn test_result_ext() {
        fn inner() -> Result<(), GenericError> {
            Err(GenericError::new(StatusCode::Internal, "inner error"))
        }

        fn outer() -> ZumbusResult<()> {
            inner().context("outer context")?;
            Ok(())
        }

        let err = outer().unwrap_err();
        assert_eq!(err.contexts().len(), 1);
        assert_eq!(err.contexts()[0].message, "outer context");
    }

    #[test]
    fn test_with_context_lazy() {
        fn example(success: bool) -> ZumbusResult<()> {
            let result: Result<(), GenericError> = if success {
                Ok(())
            } else {
                Err(GenericError::new(StatusCode::Internal, "error"))
            };

            result.with_context(|| "expensive context".to_string())?;
            Ok(())
        }

        assert!(example(true).is_ok());
        assert!(example(false).is_err());
    }
}
