//! Хаб: ретранслятор между издателями и подписчиками.
//!
//! Хаб принимает сообщения на входном адресе и без разбора пересылает их
//! исходные байты всем подключённым подписчикам. Конверт хаб не читает и
//! ничего не фильтрует: фильтрация по topic выполняется на стороне
//! подписчика.

use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::{
    select,
    sync::{watch, Mutex},
    task::JoinHandle,
    time::timeout,
};
use tracing::{debug, info, trace, warn};
use zumbus_error::{LifecycleError, ResultExt, ZumbusResult};

use crate::transport::{ListenerStats, PubListener, PullListener, DEFAULT_WRITE_TIMEOUT};

/// Конфигурация хаба.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Адрес, на который подключаются издатели.
    pub ingress: String,
    /// Адрес, на который подключаются подписчики.
    pub egress: String,
    /// Максимальное время одного ожидания в цикле ретрансляции.
    pub poll_interval: Duration,
    /// Ёмкость входной очереди (общей для всех издателей).
    pub ingress_capacity: usize,
    /// Допустимое отставание одного подписчика, в сообщениях.
    pub egress_capacity: usize,
    pub write_timeout: Duration,
}

/// Ретранслятор шины.
///
/// Между `start` и `stop` работает ровно одна задача ретрансляции.
/// Хаб можно запустить повторно после остановки; адреса с портом 0 при этом
/// получают новые порты.
pub struct Hub {
    config: HubConfig,
    running: Mutex<Option<Running>>,
    relayed: Arc<AtomicU64>,
}

struct Running {
    ingress_addr: SocketAddr,
    egress_addr: SocketAddr,
    publishers: Arc<ListenerStats>,
    subscribers: Arc<ListenerStats>,
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl Hub {
    pub fn new(config: HubConfig) -> Self {
        Self {
            config,
            running: Mutex::new(None),
            relayed: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Занимает оба адреса и запускает ретрансляцию.
    pub async fn start(&self) -> ZumbusResult<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(LifecycleError::already_started("hub").into());
        }

        let pull = PullListener::bind(&self.config.ingress, self.config.ingress_capacity)
            .await
            .with_context(|| format!("Hub ingress bind on {}", self.config.ingress))?;
        let publish = PubListener::bind(
            &self.config.egress,
            self.config.egress_capacity,
            self.config.write_timeout,
        )
        .await
        .with_context(|| format!("Hub egress bind on {}", self.config.egress))?;

        let (cancel, cancel_rx) = watch::channel(false);
        let state = Running {
            ingress_addr: pull.local_addr(),
            egress_addr: publish.local_addr(),
            publishers: pull.stats(),
            subscribers: publish.stats(),
            cancel,
            task: tokio::spawn(relay_loop(
                pull,
                publish,
                cancel_rx,
                self.config.poll_interval,
                Arc::clone(&self.relayed),
            )),
        };
        info!(
            ingress = %state.ingress_addr,
            egress = %state.egress_addr,
            "Hub started"
        );
        *running = Some(state);
        Ok(())
    }

    /// Останавливает ретрансляцию, дожидается задачи и освобождает адреса.
    pub async fn stop(&self) -> ZumbusResult<()> {
        let Some(state) = self.running.lock().await.take() else {
            return Err(LifecycleError::not_started("hub").into());
        };

        let _ = state.cancel.send(true);
        if let Err(e) = state.task.await {
            warn!(error = %e, "Hub relay task terminated abnormally");
        }
        info!(relayed = self.relayed_count(), "Hub stopped");
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Фактический входной адрес (с выданным системой портом).
    pub async fn ingress_addr(&self) -> Option<SocketAddr> {
        self.running.lock().await.as_ref().map(|r| r.ingress_addr)
    }

    pub async fn egress_addr(&self) -> Option<SocketAddr> {
        self.running.lock().await.as_ref().map(|r| r.egress_addr)
    }

    /// Количество подключённых издателей.
    pub async fn publisher_count(&self) -> usize {
        self.running
            .lock()
            .await
            .as_ref()
            .map_or(0, |r| r.publishers.connections())
    }

    /// Количество подключённых подписчиков.
    pub async fn subscriber_count(&self) -> usize {
        self.running
            .lock()
            .await
            .as_ref()
            .map_or(0, |r| r.subscribers.connections())
    }

    /// Количество сообщений, пересланных за всё время жизни хаба.
    pub fn relayed_count(&self) -> u64 {
        self.relayed.load(Ordering::Relaxed)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            ingress: "127.0.0.1:5555".to_string(),
            egress: "127.0.0.1:5556".to_string(),
            poll_interval: Duration::from_millis(250),
            ingress_capacity: 1024,
            egress_capacity: 1024,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

impl Drop for Hub {
    fn drop(&mut self) {
        if let Some(state) = self.running.get_mut().take() {
            let _ = state.cancel.send(true);
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Внутренние методы и функции
////////////////////////////////////////////////////////////////////////////////

async fn relay_loop(
    mut pull: PullListener,
    mut publish: PubListener,
    mut cancel: watch::Receiver<bool>,
    poll_interval: Duration,
    relayed: Arc<AtomicU64>,
) {
    loop {
        if *cancel.borrow() {
            break;
        }

        select! {
            biased;
            _ = cancel.changed() => break,
            received = timeout(poll_interval, pull.recv()) => match received {
                Ok(Some(msg)) => {
                    relayed.fetch_add(1, Ordering::Relaxed);
                    let receivers = publish.send_raw(msg.raw().clone());
                    trace!(frames = msg.len(), bytes = msg.raw().len(), receivers, "Message relayed");
                }
                // входная очередь закрыта
                Ok(None) => break,
                Err(_) => {}
            }
        }
    }

    pull.close().await;
    publish.close().await;
    debug!("Hub relay loop finished");
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use zumbus_error::StatusCode;

    use super::*;
    use crate::transport::{PushSocket, SubSocket, WireMessage, DEFAULT_CONNECT_TIMEOUT};

    const T: Duration = Duration::from_secs(2);

    fn local_config() -> HubConfig {
        HubConfig {
            ingress: "127.0.0.1:0".to_string(),
            egress: "127.0.0.1:0".to_string(),
            poll_interval: Duration::from_millis(50),
            ..Default::default()
        }
    }

    async fn wait_for_subscribers(
        hub: &Hub,
        n: usize,
    ) {
        timeout(T, async {
            while hub.subscriber_count().await != n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let hub = Hub::new(local_config());
        assert!(!hub.is_running().await);
        assert!(hub.ingress_addr().await.is_none());

        hub.start().await.unwrap();
        assert!(hub.is_running().await);
        assert_ne!(hub.ingress_addr().await.unwrap().port(), 0);
        assert_ne!(hub.egress_addr().await.unwrap().port(), 0);

        hub.stop().await.unwrap();
        assert!(!hub.is_running().await);
    }

    #[tokio::test]
    async fn test_double_start_is_rejected() {
        let hub = Hub::new(local_config());
        hub.start().await.unwrap();
        let err = hub.start().await.unwrap_err();
        assert!(err.is(StatusCode::AlreadyStarted));
        hub.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_without_start() {
        let hub = Hub::new(local_config());
        let err = hub.stop().await.unwrap_err();
        assert!(err.is(StatusCode::NotStarted));

        hub.start().await.unwrap();
        hub.stop().await.unwrap();
        let err = hub.stop().await.unwrap_err();
        assert!(err.is(StatusCode::NotStarted));
    }

    #[tokio::test]
    async fn test_bind_failure() {
        let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = HubConfig {
            ingress: taken.local_addr().unwrap().to_string(),
            ..local_config()
        };
        let hub = Hub::new(config);
        let err = hub.start().await.unwrap_err();
        assert!(err.is(StatusCode::BindFailed));
        assert!(!hub.is_running().await);
    }

    /// Тест проверяет, что хаб пересылает исходные байты без изменений,
    /// в том числе сообщения, которые не являются конвертами.
    #[tokio::test]
    async fn test_relay_is_byte_exact() {
        let hub = Hub::new(local_config());
        hub.start().await.unwrap();
        let ingress = hub.ingress_addr().await.unwrap().to_string();
        let egress = hub.egress_addr().await.unwrap().to_string();

        let mut sub = SubSocket::connect(&egress, DEFAULT_CONNECT_TIMEOUT).await.unwrap();
        sub.subscribe(b"");
        wait_for_subscribers(&hub, 1).await;

        let mut push = PushSocket::connect(&ingress, DEFAULT_CONNECT_TIMEOUT, T)
            .await
            .unwrap();
        let sent = WireMessage::from_frames(vec![
            Bytes::from_static(b"any"),
            Bytes::from_static(&[0, 159, 146, 150]),
            Bytes::new(),
            Bytes::from_static(b"\r\n$3\r\n"),
        ])
        .unwrap();
        push.send(&sent).await.unwrap();

        let got = sub.recv(T).await.unwrap().unwrap();
        assert_eq!(got.raw(), sent.raw());
        assert_eq!(got.frames(), sent.frames());
        assert_eq!(hub.relayed_count(), 1);
        assert_eq!(hub.publisher_count().await, 1);

        hub.stop().await.unwrap();
    }

    /// Тест проверяет, что после `stop` соединения закрыты, а хаб можно
    /// запустить заново.
    #[tokio::test]
    async fn test_stop_closes_connections_and_restart() {
        let hub = Hub::new(local_config());
        hub.start().await.unwrap();
        let egress = hub.egress_addr().await.unwrap().to_string();

        let mut sub = SubSocket::connect(&egress, DEFAULT_CONNECT_TIMEOUT).await.unwrap();
        wait_for_subscribers(&hub, 1).await;

        timeout(T, hub.stop()).await.unwrap().unwrap();
        let err = sub.recv(T).await.unwrap_err();
        assert_eq!(err, zumbus_error::TransportError::Closed);

        hub.start().await.unwrap();
        assert!(hub.is_running().await);
        assert_eq!(hub.subscriber_count().await, 0);
        hub.stop().await.unwrap();
    }
}
