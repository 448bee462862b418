use std::any::Any;

use crate::{ErrorExt, StatusCode};

/// Ошибки разбора конверта (topic / type-name / payload).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    /// Количество фреймов не соответствует выбранной раскладке
    FrameCount { expected: usize, got: usize },
    /// Строковая часть конверта не является корректным UTF-8
    InvalidUtf8 { part: &'static str },
    /// Явный topic не представим в двухчастной раскладке
    LayoutMismatch { topic: String, type_name: String },
}

impl std::fmt::Display for EnvelopeError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Self::FrameCount { expected, got } => {
                write!(f, "Envelope expects {expected} frames, got {got}")
            }
            Self::InvalidUtf8 { part } => write!(f, "Envelope {part} is not valid UTF-8"),
            Self::LayoutMismatch { topic, type_name } => write!(
                f,
                "Two-part envelope cannot carry topic '{topic}' distinct from type '{type_name}'"
            ),
        }
    }
}

impl std::error::Error for EnvelopeError {}

impl ErrorExt for EnvelopeError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::FrameCount { .. } => StatusCode::InvalidEnvelope,
            Self::InvalidUtf8 { .. } => StatusCode::InvalidUtf8,
            Self::LayoutMismatch { .. } => StatusCode::InvalidConfig,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
