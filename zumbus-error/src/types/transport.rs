use std::{any::Any, io};

use crate::{ErrorExt, StatusCode};

/// Ошибки транспортного уровня (TCP + multipart-фрейминг).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Не удалось подключиться к адресу
    Connect { address: String, reason: String },
    /// Не удалось привязаться к адресу
    Bind { address: String, reason: String },
    /// Адрес не удалось разобрать
    InvalidAddress { address: String },
    /// Ошибка ввода-вывода
    Io { kind: io::ErrorKind, message: String },
    /// Нарушение формата multipart-фрейма
    Frame { reason: String },
    /// Превышен лимит размера
    SizeLimit {
        what: &'static str,
        current: usize,
        max: usize,
    },
    /// Соединение закрыто
    Closed,
}

impl TransportError {
    pub fn frame(reason: impl Into<String>) -> Self {
        Self::Frame {
            reason: reason.into(),
        }
    }
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        Self::Io {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Self::Connect { address, reason } => {
                write!(f, "Failed to connect to {address}: {reason}")
            }
            Self::Bind { address, reason } => write!(f, "Failed to bind {address}: {reason}"),
            Self::InvalidAddress { address } => write!(f, "Invalid address: '{address}'"),
            Self::Io { kind, message } => write!(f, "I/O error ({kind:?}): {message}"),
            Self::Frame { reason } => write!(f, "Frame error: {reason}"),
            Self::SizeLimit { what, current, max } => {
                write!(f, "Size limit exceeded for {what}: {current} > {max}")
            }
            Self::Closed => write!(f, "Connection closed"),
        }
    }
}

impl std::error::Error for TransportError {}

impl ErrorExt for TransportError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Connect { .. } | Self::InvalidAddress { .. } => StatusCode::ConnectionFailed,
            Self::Bind { .. } => StatusCode::BindFailed,
            Self::Io { kind, .. } => match kind {
                io::ErrorKind::ConnectionRefused
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted => StatusCode::ConnectionFailed,
                io::ErrorKind::BrokenPipe | io::ErrorKind::NotConnected => {
                    StatusCode::ConnectionClosed
                }
                io::ErrorKind::TimedOut => StatusCode::Timeout,
                io::ErrorKind::UnexpectedEof => StatusCode::UnexpectedEof,
                _ => StatusCode::Io,
            },
            Self::Frame { .. } => StatusCode::InvalidFrame,
            Self::SizeLimit { .. } => StatusCode::SizeLimit,
            Self::Closed => StatusCode::ConnectionClosed,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn client_message(&self) -> String {
        match self {
            Self::Io { .. } => "Transport I/O error".to_string(),
            _ => self.to_string(),
        }
    }
}
