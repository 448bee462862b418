use std::fmt;

use num_enum::TryFromPrimitive;
#[cfg(feature = "serde_repr")]
use serde_repr::{Deserialize_repr, Serialize_repr};

/// Коды статуса для категоризации ошибок шины.
///
/// # Диапазоны:
/// - 0xxx: Успех
/// - 1xxx: Общие ошибки и конфигурация
/// - 2xxx: Реестр типов сообщений
/// - 3xxx: Жизненный цикл (Closed / NotStarted / AlreadyStarted)
/// - 4xxx: Доставка и переполнение очередей
/// - 5xxx: Сериализация (кодеки)
/// - 6xxx: Сеть / IO
/// - 8xxx: Протокол (фреймы, конверты)
#[cfg_attr(feature = "serde_repr", derive(Serialize_repr, Deserialize_repr))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u32)]
#[non_exhaustive]
pub enum StatusCode {
    // === 0xxx: Успех ===
    Success = 0,

    // === 1xxx: Общие ошибки ===
    Unknown = 1000,
    Unexpected = 1001,
    Internal = 1002,
    InvalidArgs = 1003,
    InvalidConfig = 1004,

    // === 2xxx: Реестр типов ===
    NotRegistered = 2000,
    NameConflict = 2001,
    MissingWireName = 2002,

    // === 3xxx: Жизненный цикл ===
    Closed = 3000,
    NotStarted = 3001,
    AlreadyStarted = 3002,

    // === 4xxx: Доставка ===
    QueueFull = 4000,
    Lagged = 4001,

    // === 5xxx: Сериализация ===
    SerializationFailed = 5000,
    DeserializationFailed = 5001,

    // === 6xxx: Сеть/IO ===
    Io = 6000,
    ConnectionClosed = 6001,
    Timeout = 6002,
    ConnectionFailed = 6003,
    BindFailed = 6004,
    UnexpectedEof = 6005,

    // === 8xxx: Протокол ===
    InvalidFrame = 8000,
    InvalidEnvelope = 8001,
    InvalidUtf8 = 8002,
    SizeLimit = 8003,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl StatusCode {
    /// Числовое представление кода статуса.
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Пытается получить вариант `StatusCode` из `u32`.
    pub fn from_u32(v: u32) -> Option<Self> {
        Self::try_from(v).ok()
    }

    /// Ошибки, после которых вызывающий код может попробовать ещё раз.
    ///
    /// Сама шина никогда не повторяет операции автоматически.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::ConnectionFailed | Self::ConnectionClosed | Self::QueueFull
        )
    }

    /// Ошибки неправильного использования API (жизненный цикл, реестр,
    /// конфигурация).
    pub fn is_usage_error(&self) -> bool {
        let c = self.code();
        (2000..=3999).contains(&c) || matches!(self, Self::InvalidArgs | Self::InvalidConfig)
    }

    /// Ошибка протокола или разбора (диапазон 8xxx).
    pub fn is_protocol_error(&self) -> bool {
        (8000..=8999).contains(&self.code())
    }

    /// Рекомендуемый уровень логирования для данного кода.
    pub fn log_level(&self) -> LogLevel {
        match self {
            Self::Success => LogLevel::Trace,
            Self::NotRegistered | Self::Closed | Self::NotStarted | Self::AlreadyStarted => {
                LogLevel::Debug
            }
            Self::DeserializationFailed | Self::InvalidEnvelope | Self::QueueFull => LogLevel::Warn,
            Self::Timeout | Self::ConnectionClosed | Self::Lagged => LogLevel::Warn,
            Self::Internal | Self::Unexpected => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для StatusCode
////////////////////////////////////////////////////////////////////////////////

impl From<StatusCode> for u32 {
    fn from(c: StatusCode) -> Self {
        c.code()
    }
}

impl fmt::Display for StatusCode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.code())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
