use std::any::Any;

use crate::{ErrorExt, StatusCode};

/// Ошибки кодеков полезной нагрузки.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Не удалось сериализовать запись
    Encode {
        codec: &'static str,
        type_name: String,
        reason: String,
    },
    /// Повреждённые байты или несовпадающий тип
    Decode {
        codec: &'static str,
        type_name: String,
        reason: String,
    },
}

impl std::fmt::Display for CodecError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Self::Encode {
                codec,
                type_name,
                reason,
            } => write!(f, "{codec} codec failed to encode '{type_name}': {reason}"),
            Self::Decode {
                codec,
                type_name,
                reason,
            } => write!(f, "{codec} codec failed to decode '{type_name}': {reason}"),
        }
    }
}

impl std::error::Error for CodecError {}

impl ErrorExt for CodecError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Encode { .. } => StatusCode::SerializationFailed,
            Self::Decode { .. } => StatusCode::DeserializationFailed,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        let (codec, type_name) = match self {
            Self::Encode {
                codec, type_name, ..
            }
            | Self::Decode {
                codec, type_name, ..
            } => (codec, type_name),
        };
        vec![
            ("error_type", "codec".to_string()),
            ("status_code", self.status_code().to_string()),
            ("codec", codec.to_string()),
            ("type_name", type_name.clone()),
        ]
    }
}
