//! Издатель: отправляет типизированные записи на входной адрес хаба.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::sync::Mutex;
use tracing::{debug, trace, warn};
use zumbus_error::{ensure, LifecycleError, ResultExt, StatusCode, ZumbusResult};

use crate::{
    codec::Codec,
    envelope::{Envelope, EnvelopeLayout},
    registry::{MessageType, TypeRegistry},
    transport::{PushSocket, WireMessage, DEFAULT_CONNECT_TIMEOUT, DEFAULT_WRITE_TIMEOUT},
};

/// Конфигурация издателя.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Раскладка конверта; должна совпадать у всех участников шины.
    pub layout: EnvelopeLayout,
    /// Регистрировать тип при первой отправке. Если выключено, отправка
    /// незарегистрированного типа завершается `NotRegistered`.
    pub auto_register: bool,
    pub connect_timeout: Duration,
    pub write_timeout: Duration,
}

/// Издатель, привязанный к одному соединению.
///
/// Ошибка записи закрывает издателя: последующие отправки завершаются
/// `Closed`. Все фреймы одного сообщения записываются одной операцией под
/// асинхронным мьютексом, поэтому сообщения из разных задач никогда не
/// перемешиваются.
pub struct Publisher<C: Codec> {
    addr: String,
    registry: Arc<TypeRegistry>,
    codec: C,
    config: PublisherConfig,
    socket: Mutex<Option<PushSocket>>,
    closed: AtomicBool,
    sent: AtomicU64,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl<C: Codec> Publisher<C> {
    /// Подключается к `addr`.
    pub async fn connect(
        addr: &str,
        registry: Arc<TypeRegistry>,
        codec: C,
        config: PublisherConfig,
    ) -> ZumbusResult<Self> {
        let socket = PushSocket::connect(addr, config.connect_timeout, config.write_timeout)
            .await
            .with_context(|| format!("Publisher connect to {addr}"))?;
        debug!(addr, codec = codec.name(), layout = %config.layout, "Publisher connected");

        Ok(Self {
            addr: addr.to_string(),
            registry,
            codec,
            config,
            socket: Mutex::new(Some(socket)),
            closed: AtomicBool::new(false),
            sent: AtomicU64::new(0),
        })
    }

    /// Отправляет запись; topic совпадает с wire-именем типа.
    pub async fn send<T: MessageType>(
        &self,
        msg: &T,
    ) -> ZumbusResult<()> {
        self.publish(msg, None).await
    }

    /// Отправляет запись под явным topic.
    pub async fn send_to<T: MessageType>(
        &self,
        msg: &T,
        topic: &str,
    ) -> ZumbusResult<()> {
        ensure!(!topic.is_empty(), StatusCode::InvalidArgs, "Topic cannot be empty");
        self.publish(msg, Some(topic)).await
    }

    /// Отправляет готовый конверт без участия реестра и кодека.
    pub async fn send_envelope(
        &self,
        envelope: Envelope,
    ) -> ZumbusResult<()> {
        self.ensure_open()?;

        let frames = envelope.to_frames(self.config.layout)?;
        let msg = WireMessage::from_frames(frames)?;

        let mut guard = self.socket.lock().await;
        let socket = guard
            .as_mut()
            .ok_or_else(|| LifecycleError::closed("publisher"))?;
        let written = socket.send(&msg).await;
        if let Err(e) = written {
            // Сообщение могло уйти частично: дописывать в этот поток нельзя.
            guard.take();
            self.closed.store(true, Ordering::Release);
            warn!(addr = %self.addr, error = %e, "Publisher connection dropped after failed write");
            return Err(e)
                .with_context(|| format!("Publishing '{}' to {}", envelope.topic(), self.addr));
        }
        drop(guard);

        self.sent.fetch_add(1, Ordering::Relaxed);
        trace!(
            topic = envelope.topic(),
            type_name = envelope.type_name(),
            bytes = msg.raw().len(),
            "Envelope sent"
        );
        Ok(())
    }

    /// Закрывает соединение. Повторный вызов ничего не делает.
    pub async fn dispose(&self) -> ZumbusResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let socket = self.socket.lock().await.take();
        if let Some(socket) = socket {
            if let Err(e) = socket.close().await {
                warn!(addr = %self.addr, error = %e, "Publisher close failed");
            }
        }
        debug!(addr = %self.addr, sent = self.sent_count(), "Publisher disposed");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Количество успешно отправленных сообщений.
    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn layout(&self) -> EnvelopeLayout {
        self.config.layout
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    async fn publish<T: MessageType>(
        &self,
        msg: &T,
        topic: Option<&str>,
    ) -> ZumbusResult<()> {
        self.ensure_open()?;

        let name = if self.config.auto_register {
            self.registry.register::<T>()?
        } else {
            self.registry.name_of::<T>()?
        };
        let payload = self.codec.encode(msg)?;

        self.send_envelope(Envelope::new(topic, &*name, payload))
            .await
    }

    fn ensure_open(&self) -> ZumbusResult<()> {
        ensure!(!self.is_closed(), LifecycleError::closed("publisher"));
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            layout: EnvelopeLayout::default(),
            auto_register: true,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
