use std::{collections::BTreeSet, net::SocketAddr, time::Duration};

use bytes::Bytes;
use tokio::{
    net::tcp::OwnedWriteHalf,
    time::{timeout_at, Instant},
};
use tracing::{debug, trace};
use zumbus_error::TransportError;

use super::{connect_stream, FramedReader, WireMessage};

/// Принимающий сокет: одно TCP-соединение к [`PubListener`](super::PubListener).
///
/// Сообщение проходит фильтр, если его первый фрейм начинается с одного из
/// подписанных префиксов. Пустой префикс пропускает всё. Без подписок не
/// проходит ничего.
pub struct SubSocket {
    peer: SocketAddr,
    reader: FramedReader,
    // Закрытие пишущей половины выглядит для издателя как отключение.
    _writer: OwnedWriteHalf,
    filters: BTreeSet<Bytes>,
    filtered_out: u64,
}

impl SubSocket {
    pub async fn connect(
        addr: &str,
        connect_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let stream = connect_stream(addr, connect_timeout).await?;
        let peer = stream.peer_addr()?;
        let (reader, writer) = stream.into_split();
        debug!(%peer, "Sub socket connected");

        Ok(Self {
            peer,
            reader: FramedReader::new(reader),
            _writer: writer,
            filters: BTreeSet::new(),
            filtered_out: 0,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Добавляет префикс. Возвращает `false`, если он уже был.
    pub fn subscribe(
        &mut self,
        prefix: &[u8],
    ) -> bool {
        self.filters.insert(Bytes::copy_from_slice(prefix))
    }

    /// Удаляет префикс. Возвращает `false`, если его не было.
    pub fn unsubscribe(
        &mut self,
        prefix: &[u8],
    ) -> bool {
        self.filters.remove(prefix)
    }

    /// Заменяет набор префиксов целиком.
    pub fn set_filters<I, P>(
        &mut self,
        prefixes: I,
    ) where
        I: IntoIterator<Item = P>,
        P: AsRef<[u8]>,
    {
        self.filters = prefixes
            .into_iter()
            .map(|p| Bytes::copy_from_slice(p.as_ref()))
            .collect();
    }

    pub fn unsubscribe_all(&mut self) {
        self.filters.clear();
    }

    pub fn filter_count(&self) -> usize {
        self.filters.len()
    }

    /// Сколько сообщений отброшено фильтром.
    pub fn filtered_out(&self) -> u64 {
        self.filtered_out
    }

    pub fn matches(
        &self,
        msg: &WireMessage,
    ) -> bool {
        msg.first_frame()
            .is_some_and(|head| self.filters.iter().any(|p| head.starts_with(p)))
    }

    /// Ждёт подходящее сообщение не дольше `wait`.
    ///
    /// `Ok(None)` означает истечение времени ожидания. Закрытие соединения
    /// удалённой стороной возвращает [`TransportError::Closed`].
    pub async fn recv(
        &mut self,
        wait: Duration,
    ) -> Result<Option<WireMessage>, TransportError> {
        let deadline = Instant::now() + wait;
        loop {
            let next = match timeout_at(deadline, self.reader.next()).await {
                Ok(next) => next?,
                Err(_) => return Ok(None),
            };

            match next {
                Some(msg) if self.matches(&msg) => return Ok(Some(msg)),
                Some(msg) => {
                    self.filtered_out += 1;
                    trace!(frames = msg.len(), "Message filtered out");
                }
                None => return Err(TransportError::Closed),
            }
        }
    }
}
