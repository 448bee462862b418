use std::{net::SocketAddr, sync::Arc};

use tokio::{
    net::{TcpListener, TcpStream},
    select,
    sync::{mpsc, watch},
    task::{JoinHandle, JoinSet},
};
use tracing::{debug, info, warn};
use zumbus_error::TransportError;

use super::{bind_listener, ConnectionGuard, FramedReader, ListenerStats, WireMessage};

/// Принимающий сокет с fan-in: сообщения всех подключённых
/// [`PushSocket`](super::PushSocket) попадают в одну ограниченную очередь.
///
/// Порядок сохраняется в пределах одного соединения. Когда очередь полна,
/// чтение из соединений приостанавливается.
pub struct PullListener {
    local_addr: SocketAddr,
    rx: mpsc::Receiver<WireMessage>,
    stats: Arc<ListenerStats>,
    shutdown: watch::Sender<bool>,
    accept_task: Option<JoinHandle<()>>,
}

impl PullListener {
    pub async fn bind(
        addr: &str,
        capacity: usize,
    ) -> Result<Self, TransportError> {
        let listener = bind_listener(addr).await?;
        let local_addr = listener.local_addr()?;
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (shutdown, shutdown_rx) = watch::channel(false);
        let stats = Arc::new(ListenerStats::default());

        let accept_task = tokio::spawn(accept_loop(
            listener,
            tx,
            Arc::clone(&stats),
            shutdown_rx,
        ));
        info!(%local_addr, "Pull listener bound");

        Ok(Self {
            local_addr,
            rx,
            stats,
            shutdown,
            accept_task: Some(accept_task),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Счётчики сокета; можно читать из других задач.
    pub fn stats(&self) -> Arc<ListenerStats> {
        Arc::clone(&self.stats)
    }

    pub fn connection_count(&self) -> usize {
        self.stats.connections()
    }

    /// Следующее сообщение. `None` после закрытия сокета.
    pub async fn recv(&mut self) -> Option<WireMessage> {
        self.rx.recv().await
    }

    /// Останавливает приём и ждёт завершения всех задач соединений.
    pub async fn close(&mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.accept_task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Pull accept loop terminated abnormally");
            }
        }
        self.rx.close();
        debug!(local_addr = %self.local_addr, "Pull listener closed");
    }
}

impl Drop for PullListener {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.accept_task.take() {
            task.abort();
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    tx: mpsc::Sender<WireMessage>,
    stats: Arc<ListenerStats>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut connections = JoinSet::new();

    loop {
        select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, "Pull connection accepted");
                    let guard = ConnectionGuard::new(Arc::clone(&stats));
                    connections.spawn(read_connection(
                        stream,
                        peer,
                        tx.clone(),
                        Arc::clone(&stats),
                        shutdown.clone(),
                        guard,
                    ));
                }
                Err(e) => warn!(error = %e, "Pull accept failed"),
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    connections.shutdown().await;
}

async fn read_connection(
    stream: TcpStream,
    peer: SocketAddr,
    tx: mpsc::Sender<WireMessage>,
    stats: Arc<ListenerStats>,
    mut shutdown: watch::Receiver<bool>,
    _guard: ConnectionGuard,
) {
    let (read_half, _write_half) = stream.into_split();
    let mut reader = FramedReader::new(read_half);

    loop {
        select! {
            _ = shutdown.changed() => break,
            next = reader.next() => match next {
                Ok(Some(msg)) => {
                    stats.record_message();
                    if tx.send(msg).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    debug!(%peer, "Pull peer disconnected");
                    break;
                }
                Err(e) => {
                    warn!(%peer, error = %e, "Dropping pull connection");
                    break;
                }
            }
        }
    }
}
