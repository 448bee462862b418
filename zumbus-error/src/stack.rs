use std::{fmt, panic::Location, sync::Arc};

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::{ErrorExt, LogLevel, StatusCode};

/// Ошибка шины с цепочкой контекстов.
///
/// Корневая ошибка (реестр, кодек, конверт, транспорт или жизненный цикл)
/// хранится как есть и доступна через [`StackError::downcast_ref`]. Каждый
/// слой, через который ошибка прошла, добавляет свою строку контекста с
/// местом вызова.
#[derive(Clone)]
pub struct StackError {
    root: Arc<dyn ErrorExt>,
    trail: Vec<ContextFrame>,
}

/// Одна строка контекста.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextFrame {
    pub message: String,
    pub location: &'static Location<'static>,
}

/// Отчёт об ошибке для внешнего кода (требует feature = "serde").
///
/// Цепочка контекстов попадает в отчёт только в отладочной сборке.
#[cfg(feature = "serde")]
#[derive(Debug, Serialize)]
pub struct ErrorReport {
    pub code: u32,
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub trail: Vec<String>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl StackError {
    pub fn new<E: ErrorExt>(err: E) -> Self {
        Self {
            root: Arc::new(err),
            trail: Vec::new(),
        }
    }

    /// Добавляет строку контекста. Последняя добавленная строка считается
    /// самой внешней.
    #[track_caller]
    pub fn context(
        mut self,
        msg: impl Into<String>,
    ) -> Self {
        self.trail.push(ContextFrame {
            message: msg.into(),
            location: Location::caller(),
        });
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.root.status_code()
    }

    /// Проверяет код корневой ошибки.
    pub fn is(
        &self,
        code: StatusCode,
    ) -> bool {
        self.status_code() == code
    }

    pub fn root(&self) -> &dyn ErrorExt {
        self.root.as_ref()
    }

    /// Контексты в порядке добавления: от ближнего к корню к внешнему.
    pub fn contexts(&self) -> &[ContextFrame] {
        &self.trail
    }

    pub fn downcast_ref<T: ErrorExt>(&self) -> Option<&T> {
        self.root.as_any().downcast_ref::<T>()
    }

    /// Сообщение без внутренних подробностей.
    pub fn client_message(&self) -> String {
        self.root.client_message()
    }

    pub fn log_level(&self) -> LogLevel {
        self.status_code().log_level()
    }

    #[cfg(feature = "serde")]
    pub fn report(&self) -> ErrorReport {
        let code = self.status_code();
        ErrorReport {
            code: code.code(),
            status: format!("{code:?}"),
            message: self.client_message(),
            trail: if cfg!(debug_assertions) {
                self.located_trail()
            } else {
                Vec::new()
            },
        }
    }

    fn located_trail(&self) -> Vec<String> {
        self.trail
            .iter()
            .rev()
            .map(|c| format!("{} at {}:{}", c.message, c.location.file(), c.location.line()))
            .collect()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl fmt::Debug for StackError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("StackError")
            .field("code", &self.status_code())
            .field("root", &self.root.log_message())
            .field("trail", &self.located_trail())
            .finish()
    }
}

/// Печатает цепочку от внешнего контекста к корню:
/// `Hub start: Hub ingress bind on 127.0.0.1:5555: bind failed ...`.
impl fmt::Display for StackError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        for frame in self.trail.iter().rev() {
            write!(f, "{}: ", frame.message)?;
        }
        write!(f, "{}", self.root)
    }
}

impl std::error::Error for StackError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.root.as_ref())
    }
}

impl<E: ErrorExt> From<E> for StackError {
    fn from(e: E) -> Self {
        StackError::new(e)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
