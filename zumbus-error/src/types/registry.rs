use std::any::Any;

use crate::{ErrorExt, StatusCode};

/// Ошибки реестра типов сообщений.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// У типа нет корректного wire-имени (пустое, пробелы, управляющие
    /// символы)
    MissingWireName { type_name: String },
    /// Wire-имя уже занято другим типом
    NameConflict {
        wire_name: String,
        registered: String,
        requested: String,
    },
    /// Тип не был зарегистрирован
    NotRegistered { type_name: String },
}

impl RegistryError {
    /// Ошибка конфигурации типа: исправляется изменением самого типа.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::MissingWireName { .. } | Self::NameConflict { .. }
        )
    }
}

impl std::fmt::Display for RegistryError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Self::MissingWireName { type_name } => {
                write!(f, "Missing or invalid wire name on message type '{type_name}'")
            }
            Self::NameConflict {
                wire_name,
                registered,
                requested,
            } => write!(
                f,
                "Wire name '{wire_name}' is already bound to '{registered}', cannot register '{requested}'"
            ),
            Self::NotRegistered { type_name } => {
                write!(f, "Message type '{type_name}' is not registered")
            }
        }
    }
}

impl std::error::Error for RegistryError {}

impl ErrorExt for RegistryError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingWireName { .. } => StatusCode::MissingWireName,
            Self::NameConflict { .. } => StatusCode::NameConflict,
            Self::NotRegistered { .. } => StatusCode::NotRegistered,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        let mut tags = vec![
            ("error_type", "registry".to_string()),
            ("status_code", self.status_code().to_string()),
        ];
        match self {
            Self::MissingWireName { type_name } | Self::NotRegistered { type_name } => {
                tags.push(("type_name", type_name.clone()))
            }
            Self::NameConflict { wire_name, .. } => tags.push(("wire_name", wire_name.clone())),
        }
        tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_errors() {
        let missing = RegistryError::MissingWireName {
            type_name: "chat::Message".to_string(),
        };
        let conflict = RegistryError::NameConflict {
            wire_name: "message".to_string(),
            registered: "chat::Message".to_string(),
            requested: "mail::Message".to_string(),
        };
        let not_registered = RegistryError::NotRegistered {
            type_name: "chat::Message".to_string(),
        };

        assert!(missing.is_configuration_error());
        assert!(conflict.is_configuration_error());
        assert!(!not_registered.is_configuration_error());
        assert_eq!(not_registered.status_code(), StatusCode::NotRegistered);
    }

    #[test]
    fn test_conflict_display_mentions_both_types() {
        let conflict = RegistryError::NameConflict {
            wire_name: "message".to_string(),
            registered: "chat::Message".to_string(),
            requested: "mail::Message".to_string(),
        };
        let s = conflict.to_string();
        assert!(s.contains("chat::Message"));
        assert!(s.contains("mail::Message"));
    }
}
