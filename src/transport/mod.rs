//! Транспорт шины: TCP + multipart-фрейминг.
//!
//! Четыре роли сокетов повторяют классическую схему PUSH/PULL + PUB/SUB:
//!
//! - [`PushSocket`] подключается и отправляет сообщения;
//! - [`PullListener`] принимает подключения и сливает сообщения в одну
//!   очередь (fan-in);
//! - [`PubListener`] принимает подключения и рассылает каждое сообщение всем
//!   (fan-out);
//! - [`SubSocket`] подключается, принимает сообщения и фильтрует их по
//!   префиксу первого фрейма.
//!
//! Адреса имеют вид `host:port`; префикс `tcp://` допускается и
//! отбрасывается, хост `*` означает все интерфейсы.

pub mod frame;
pub mod publish;
pub mod pull;
pub mod push;
pub mod sub;

use std::{
    sync::atomic::{AtomicU64, AtomicUsize, Ordering},
    sync::Arc,
    time::Duration,
};

pub use frame::{
    encode_frames, FramedReader, FramedWriter, MultipartDecoder, WireMessage, MAX_FRAMES,
    MAX_FRAME_LENGTH,
};
pub use publish::PubListener;
pub use pull::PullListener;
pub use push::PushSocket;
pub use sub::SubSocket;
use tokio::{
    net::{TcpListener, TcpStream},
    time::timeout,
};
use zumbus_error::TransportError;

/// Таймаут подключения по умолчанию.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Таймаут записи одного сообщения по умолчанию.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Счётчики слушающего сокета.
#[derive(Debug, Default)]
pub struct ListenerStats {
    connections: AtomicUsize,
    messages: AtomicU64,
}

/// Уменьшает счётчик соединений при завершении задачи соединения, в том
/// числе при её отмене.
pub(crate) struct ConnectionGuard(Arc<ListenerStats>);

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl ListenerStats {
    /// Текущее количество открытых соединений.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::Acquire)
    }

    /// Количество сообщений, прошедших через сокет.
    pub fn messages(&self) -> u64 {
        self.messages.load(Ordering::Relaxed)
    }

    pub(crate) fn record_message(&self) {
        self.messages.fetch_add(1, Ordering::Relaxed);
    }
}

impl ConnectionGuard {
    pub(crate) fn new(stats: Arc<ListenerStats>) -> Self {
        stats.connections.fetch_add(1, Ordering::AcqRel);
        Self(stats)
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.0.connections.fetch_sub(1, Ordering::AcqRel);
    }
}

////////////////////////////////////////////////////////////////////////////////
// Внутренние методы и функции
////////////////////////////////////////////////////////////////////////////////

/// Приводит адрес к виду `host:port`.
pub fn normalize_address(addr: &str) -> Result<String, TransportError> {
    let invalid = || TransportError::InvalidAddress {
        address: addr.to_string(),
    };

    let trimmed = addr.trim();
    let stripped = trimmed.strip_prefix("tcp://").unwrap_or(trimmed);
    let (host, port) = stripped.rsplit_once(':').ok_or_else(invalid)?;
    if host.is_empty() || port.parse::<u16>().is_err() {
        return Err(invalid());
    }

    let host = if host == "*" { "0.0.0.0" } else { host };
    Ok(format!("{host}:{port}"))
}

pub(crate) async fn connect_stream(
    addr: &str,
    connect_timeout: Duration,
) -> Result<TcpStream, TransportError> {
    let target = normalize_address(addr)?;
    let stream = timeout(connect_timeout, TcpStream::connect(&target))
        .await
        .map_err(|_| TransportError::Connect {
            address: target.clone(),
            reason: format!("timed out after {connect_timeout:?}"),
        })?
        .map_err(|e| TransportError::Connect {
            address: target.clone(),
            reason: e.to_string(),
        })?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

pub(crate) async fn bind_listener(addr: &str) -> Result<TcpListener, TransportError> {
    let target = normalize_address(addr)?;
    TcpListener::bind(&target)
        .await
        .map_err(|e| TransportError::Bind {
            address: target,
            reason: e.to_string(),
        })
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
