use std::fmt;

/// Состояние подписчика.
///
/// ```text
/// Idle -> Connecting -> Listening -> Draining -> Closed
///   ^         |             |
///   +---------+-------------+  (ошибка подключения / удалённая сторона закрыла соединение)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriberState {
    /// Транспорт не занят; набор topic может быть непустым.
    Idle,
    /// Идёт подключение. Единственное состояние, которое может завершиться
    /// ошибкой подключения.
    Connecting,
    /// Фоновый цикл владеет сокетом и принимает сообщения.
    Listening,
    /// Запрошено освобождение, цикл завершается.
    Draining,
    /// Терминальное состояние.
    Closed,
}

impl SubscriberState {
    /// Держит ли подписчик транспортный ресурс.
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Listening | Self::Draining)
    }

    /// После `Draining` и `Closed` новые операции недопустимы.
    pub fn is_shutting_down(self) -> bool {
        matches!(self, Self::Draining | Self::Closed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Listening => "listening",
            Self::Draining => "draining",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for SubscriberState {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_predicates() {
        assert!(!SubscriberState::Idle.is_connected());
        assert!(SubscriberState::Listening.is_connected());
        assert!(SubscriberState::Draining.is_shutting_down());
        assert!(SubscriberState::Closed.is_shutting_down());
        assert!(!SubscriberState::Connecting.is_shutting_down());
        assert_eq!(SubscriberState::Listening.to_string(), "listening");
    }
}
