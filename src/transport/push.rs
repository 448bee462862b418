use std::{net::SocketAddr, time::Duration};

use bytes::Bytes;
use tokio::net::tcp::OwnedReadHalf;
use tracing::debug;
use zumbus_error::TransportError;

use super::{connect_stream, FramedWriter, WireMessage};

/// Отправляющий сокет: одно TCP-соединение к [`PullListener`](super::PullListener).
///
/// Сообщения одного сокета доставляются в порядке отправки.
pub struct PushSocket {
    peer: SocketAddr,
    writer: FramedWriter,
    // Читающая половина держит соединение открытым; входящих данных нет.
    _reader: OwnedReadHalf,
}

impl PushSocket {
    pub async fn connect(
        addr: &str,
        connect_timeout: Duration,
        write_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let stream = connect_stream(addr, connect_timeout).await?;
        let peer = stream.peer_addr()?;
        let (reader, writer) = stream.into_split();
        debug!(%peer, "Push socket connected");

        Ok(Self {
            peer,
            writer: FramedWriter::new(writer, write_timeout),
            _reader: reader,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Отправляет готовое сообщение одной записью.
    pub async fn send(
        &mut self,
        msg: &WireMessage,
    ) -> Result<(), TransportError> {
        self.writer.send(msg).await
    }

    /// Кодирует фреймы и отправляет их как одно сообщение.
    pub async fn send_frames(
        &mut self,
        frames: Vec<Bytes>,
    ) -> Result<(), TransportError> {
        let msg = WireMessage::from_frames(frames)?;
        self.send(&msg).await
    }

    /// Закрывает соединение, дописав буферизованные данные.
    pub async fn close(mut self) -> Result<(), TransportError> {
        debug!(peer = %self.peer, "Closing push socket");
        self.writer.shutdown().await
    }
}
