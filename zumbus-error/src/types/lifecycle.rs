use std::any::Any;

use crate::{ErrorExt, StatusCode};

/// Ошибки неправильного использования жизненного цикла компонентов.
///
/// Возвращаются немедленно и никогда не повторяются внутри шины.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// Компонент уже освобождён (`dispose`), нужен новый экземпляр
    Closed { component: String },
    /// Остановка компонента, который не был запущен
    NotStarted { component: String },
    /// Повторный запуск без промежуточной остановки
    AlreadyStarted { component: String },
}

impl LifecycleError {
    pub fn closed(component: impl Into<String>) -> Self {
        Self::Closed {
            component: component.into(),
        }
    }

    pub fn not_started(component: impl Into<String>) -> Self {
        Self::NotStarted {
            component: component.into(),
        }
    }

    pub fn already_started(component: impl Into<String>) -> Self {
        Self::AlreadyStarted {
            component: component.into(),
        }
    }
}

impl std::fmt::Display for LifecycleError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Self::Closed { component } => write!(f, "{component} is closed"),
            Self::NotStarted { component } => write!(f, "{component} is not started"),
            Self::AlreadyStarted { component } => write!(f, "{component} is already started"),
        }
    }
}

impl std::error::Error for LifecycleError {}

impl ErrorExt for LifecycleError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Closed { .. } => StatusCode::Closed,
            Self::NotStarted { .. } => StatusCode::NotStarted,
            Self::AlreadyStarted { .. } => StatusCode::AlreadyStarted,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
