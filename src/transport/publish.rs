use std::{net::SocketAddr, sync::Arc, time::Duration};

use bytes::Bytes;
use tokio::{
    io::AsyncReadExt,
    net::{TcpListener, TcpStream},
    select,
    sync::{broadcast, watch},
    task::{JoinHandle, JoinSet},
};
use tracing::{debug, info, warn};
use zumbus_error::TransportError;

use super::{bind_listener, ConnectionGuard, FramedWriter, ListenerStats, WireMessage};

/// Рассылающий сокет с fan-out: каждое сообщение уходит всем подключённым
/// [`SubSocket`](super::SubSocket).
///
/// У каждого подписчика своя задача записи. Медленный подписчик не
/// блокирует остальных: при отставании больше чем на `capacity` сообщений
/// старые сообщения для него теряются (с предупреждением в логе).
pub struct PubListener {
    local_addr: SocketAddr,
    tx: broadcast::Sender<Bytes>,
    stats: Arc<ListenerStats>,
    shutdown: watch::Sender<bool>,
    accept_task: Option<JoinHandle<()>>,
}

impl PubListener {
    pub async fn bind(
        addr: &str,
        capacity: usize,
        write_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let listener = bind_listener(addr).await?;
        let local_addr = listener.local_addr()?;
        let (tx, _) = broadcast::channel(capacity.max(1));
        let (shutdown, shutdown_rx) = watch::channel(false);
        let stats = Arc::new(ListenerStats::default());

        let accept_task = tokio::spawn(accept_loop(
            listener,
            tx.clone(),
            Arc::clone(&stats),
            shutdown_rx,
            write_timeout,
        ));
        info!(%local_addr, "Pub listener bound");

        Ok(Self {
            local_addr,
            tx,
            stats,
            shutdown,
            accept_task: Some(accept_task),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stats(&self) -> Arc<ListenerStats> {
        Arc::clone(&self.stats)
    }

    pub fn connection_count(&self) -> usize {
        self.stats.connections()
    }

    /// Рассылает уже закодированные байты сообщения без изменений.
    ///
    /// Возвращает количество подписчиков, получивших сообщение в очередь.
    pub fn send_raw(
        &self,
        raw: Bytes,
    ) -> usize {
        self.stats.record_message();
        self.tx.send(raw).unwrap_or(0)
    }

    pub fn send(
        &self,
        msg: &WireMessage,
    ) -> usize {
        self.send_raw(msg.raw().clone())
    }

    /// Останавливает приём, закрывает все соединения и ждёт их задачи.
    pub async fn close(&mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.accept_task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Pub accept loop terminated abnormally");
            }
        }
        debug!(local_addr = %self.local_addr, "Pub listener closed");
    }
}

impl Drop for PubListener {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.accept_task.take() {
            task.abort();
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    tx: broadcast::Sender<Bytes>,
    stats: Arc<ListenerStats>,
    mut shutdown: watch::Receiver<bool>,
    write_timeout: Duration,
) {
    let mut connections = JoinSet::new();

    loop {
        select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    // Подписка на рассылку оформляется до учёта соединения:
                    // подписчик, видимый в счётчике, уже получает сообщения.
                    let rx = tx.subscribe();
                    let guard = ConnectionGuard::new(Arc::clone(&stats));
                    debug!(%peer, "Pub connection accepted");
                    connections.spawn(write_connection(
                        stream,
                        peer,
                        rx,
                        shutdown.clone(),
                        write_timeout,
                        guard,
                    ));
                }
                Err(e) => warn!(error = %e, "Pub accept failed"),
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    connections.shutdown().await;
}

async fn write_connection(
    stream: TcpStream,
    peer: SocketAddr,
    mut rx: broadcast::Receiver<Bytes>,
    mut shutdown: watch::Receiver<bool>,
    write_timeout: Duration,
    _guard: ConnectionGuard,
) {
    let (mut read_half, write_half) = stream.into_split();
    let mut writer = FramedWriter::new(write_half, write_timeout);
    let mut probe = [0u8; 64];

    loop {
        select! {
            _ = shutdown.changed() => break,
            // Подписчик ничего не пишет; чтение нужно только чтобы заметить
            // отключение без трафика.
            read = read_half.read(&mut probe) => match read {
                Ok(0) | Err(_) => {
                    debug!(%peer, "Pub peer disconnected");
                    break;
                }
                Ok(_) => {}
            },
            next = rx.recv() => match next {
                Ok(raw) => {
                    if let Err(e) = writer.write_raw(&raw).await {
                        warn!(%peer, error = %e, "Dropping pub connection");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(%peer, skipped, "Pub subscriber lagging, messages skipped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    let _ = writer.shutdown().await;
}

#[cfg(test)]
mod tests {
    use tokio::time::timeout;

    use super::*;
    use crate::transport::SubSocket;

    const T: Duration = Duration::from_secs(2);

    async fn wait_for_connections(
        listener: &PubListener,
        n: usize,
    ) {
        timeout(T, async {
            while listener.connection_count() != n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    /// Тест проверяет, что каждое сообщение доходит до всех подписчиков
    /// байт в байт.
    #[tokio::test]
    async fn test_fan_out_to_all_subscribers() {
        let mut publisher = PubListener::bind("127.0.0.1:0", 64, T).await.unwrap();
        let addr = publisher.local_addr().to_string();

        let mut s1 = SubSocket::connect(&addr, T).await.unwrap();
        let mut s2 = SubSocket::connect(&addr, T).await.unwrap();
        s1.subscribe(b"");
        s2.subscribe(b"");
        wait_for_connections(&publisher, 2).await;

        let msg = WireMessage::from_frames(vec![
            Bytes::from_static(b"topic"),
            Bytes::from_static(b"type"),
            Bytes::from_static(b"\x00payload\xff"),
        ])
        .unwrap();
        assert_eq!(publisher.send(&msg), 2);

        for sub in [&mut s1, &mut s2] {
            let got = sub.recv(T).await.unwrap().unwrap();
            assert_eq!(got.raw(), msg.raw());
        }

        publisher.close().await;
        assert_eq!(publisher.connection_count(), 0);
    }

    /// Тест проверяет префиксный фильтр на стороне подписчика.
    #[tokio::test]
    async fn test_sub_prefix_filter() {
        let publisher = PubListener::bind("127.0.0.1:0", 64, T).await.unwrap();
        let mut sub = SubSocket::connect(&publisher.local_addr().to_string(), T)
            .await
            .unwrap();
        sub.subscribe(b"chat:");
        wait_for_connections(&publisher, 1).await;

        for topic in ["news", "chat:general", "chatter"] {
            let msg = WireMessage::from_frames(vec![Bytes::from(topic)]).unwrap();
            publisher.send(&msg);
        }

        let got = sub.recv(T).await.unwrap().unwrap();
        assert_eq!(&got.frames()[0][..], b"chat:general");
        assert!(sub.recv(Duration::from_millis(100)).await.unwrap().is_none());
        assert_eq!(sub.filtered_out(), 2);
    }

    #[tokio::test]
    async fn test_sub_without_filters_receives_nothing() {
        let publisher = PubListener::bind("127.0.0.1:0", 8, T).await.unwrap();
        let mut sub = SubSocket::connect(&publisher.local_addr().to_string(), T)
            .await
            .unwrap();
        wait_for_connections(&publisher, 1).await;

        publisher.send(&WireMessage::from_frames(vec![Bytes::from_static(b"x")]).unwrap());
        assert!(sub.recv(Duration::from_millis(100)).await.unwrap().is_none());
    }

    /// Тест проверяет, что закрытие издателя видно подписчику как `Closed`.
    #[tokio::test]
    async fn test_sub_sees_remote_close() {
        let mut publisher = PubListener::bind("127.0.0.1:0", 8, T).await.unwrap();
        let mut sub = SubSocket::connect(&publisher.local_addr().to_string(), T)
            .await
            .unwrap();
        wait_for_connections(&publisher, 1).await;

        publisher.close().await;
        let err = sub.recv(T).await.unwrap_err();
        assert_eq!(err, TransportError::Closed);
    }

    #[tokio::test]
    async fn test_send_without_subscribers() {
        let publisher = PubListener::bind("127.0.0.1:0", 8, T).await.unwrap();
        let msg = WireMessage::from_frames(vec![Bytes::from_static(b"x")]).unwrap();
        assert_eq!(publisher.send(&msg), 0);
    }
}
