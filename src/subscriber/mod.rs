//! Подписчик: принимает конверты с выходного адреса хаба и раздаёт
//! типизированные записи потокам приложения.
//!
//! Один подписчик держит не больше одного соединения и один фоновый цикл.
//! Поверх цикла может быть сколько угодно [`TypedStream`]: цикл декодирует
//! каждую запись один раз и кладёт её в очереди всех подходящих потоков.

pub mod state;
pub mod stream;
mod worker;

use std::{
    any::{type_name, TypeId},
    sync::{atomic::AtomicU64, Arc},
    time::Duration,
};

pub use state::SubscriberState;
pub use stream::TypedStream;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};
use zumbus_error::{ensure, LifecycleError, ResultExt, StatusCode, ZumbusResult};

use self::worker::{Connection, DecodeFn, Decoded, Shared, Slot};
use crate::{
    codec::Codec,
    envelope::EnvelopeLayout,
    registry::{MessageType, TypeRegistry},
    transport::{SubSocket, DEFAULT_CONNECT_TIMEOUT},
};

/// Интервал ожидания сообщения в фоновом цикле по умолчанию.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);
/// Ёмкость очереди одного потока по умолчанию.
pub const DEFAULT_HANDLE_CAPACITY: usize = 4096;

/// Конфигурация подписчика.
#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    pub layout: EnvelopeLayout,
    /// Подключаться сразу в [`Subscriber::open`], не дожидаясь первого
    /// потока.
    pub eager_connect: bool,
    /// Максимальное время одного ожидания в фоновом цикле.
    pub poll_interval: Duration,
    /// Ёмкость очереди каждого потока.
    pub handle_capacity: usize,
    pub connect_timeout: Duration,
}

/// Подписчик шины.
///
/// Подключение ленивое: соединение создаётся при первом потоке (или сразу,
/// если включён `eager_connect`). Если удалённая сторона закрыла
/// соединение, подписчик возвращается в [`SubscriberState::Idle`], потоки и
/// topic сохраняются; новое соединение создаёт следующий поток или
/// [`Subscriber::reconnect`]. Автоматических повторов нет.
pub struct Subscriber<C: Codec> {
    shared: Arc<Shared>,
    codec: Arc<C>,
    /// Сериализует подключение, переподключение и освобождение.
    connection: Mutex<Option<Connection>>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl<C: Codec> Subscriber<C> {
    /// Создаёт подписчика в состоянии `Idle` без сетевых операций.
    pub fn new(
        addr: &str,
        registry: Arc<TypeRegistry>,
        codec: C,
        config: SubscriberConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared::new(addr.to_string(), registry, config)),
            codec: Arc::new(codec),
            connection: Mutex::new(None),
        }
    }

    /// Создаёт подписчика и, если включён `eager_connect`, сразу
    /// подключается.
    pub async fn open(
        addr: &str,
        registry: Arc<TypeRegistry>,
        codec: C,
        config: SubscriberConfig,
    ) -> ZumbusResult<Self> {
        let eager = config.eager_connect;
        let subscriber = Self::new(addr, registry, codec, config);
        if eager {
            subscriber.connect().await?;
        }
        Ok(subscriber)
    }

    pub fn state(&self) -> SubscriberState {
        self.shared.state()
    }

    pub fn addr(&self) -> &str {
        &self.shared.addr
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.shared.registry
    }

    /// Добавляет topic в набор подписки.
    ///
    /// Изменение применяется к фильтру транспорта до следующего ожидания
    /// фонового цикла. Возвращает `false`, если topic уже был в наборе.
    pub fn add_topic(
        &self,
        topic: &str,
    ) -> ZumbusResult<bool> {
        self.ensure_open()?;
        ensure!(!topic.is_empty(), StatusCode::InvalidArgs, "Topic cannot be empty");
        let changed = self.shared.add_topic(topic);
        if changed {
            debug!(addr = %self.shared.addr, topic, "Topic added");
        }
        Ok(changed)
    }

    /// Удаляет topic из набора. Возвращает `false`, если его не было.
    pub fn remove_topic(
        &self,
        topic: &str,
    ) -> ZumbusResult<bool> {
        self.ensure_open()?;
        let changed = self.shared.remove_topic(topic);
        if changed {
            debug!(addr = %self.shared.addr, topic, "Topic removed");
        }
        Ok(changed)
    }

    /// Снимок набора подписки в отсортированном виде.
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.shared.topics.read().iter().cloned().collect();
        topics.sort();
        topics
    }

    /// Поток всех записей типа `T`, опубликованных под его wire-именем.
    pub async fn stream<T: MessageType>(&self) -> ZumbusResult<TypedStream<T>> {
        self.attach::<T, _>(None, |_| true).await
    }

    /// Поток записей типа `T`, принятых предикатом.
    pub async fn stream_where<T, F>(
        &self,
        predicate: F,
    ) -> ZumbusResult<TypedStream<T>>
    where
        T: MessageType,
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.attach(None, predicate).await
    }

    /// Поток записей типа `T` под явным topic.
    pub async fn stream_topic<T, F>(
        &self,
        topic: &str,
        predicate: F,
    ) -> ZumbusResult<TypedStream<T>>
    where
        T: MessageType,
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.attach(Some(topic), predicate).await
    }

    /// Подключается, если подписчик в `Idle`. В `Listening` ничего не
    /// делает.
    pub async fn connect(&self) -> ZumbusResult<()> {
        self.ensure_open()?;
        let mut connection = self.connection.lock().await;
        self.connect_locked(&mut connection, false).await
    }

    /// Разрывает текущее соединение (дожидаясь цикла) и создаёт новое.
    /// Потоки и topic сохраняются.
    pub async fn reconnect(&self) -> ZumbusResult<()> {
        self.ensure_open()?;
        let mut connection = self.connection.lock().await;
        self.connect_locked(&mut connection, true).await
    }

    /// Освобождает подписчика.
    ///
    /// Цикл замечает отмену не позже чем через один интервал ожидания,
    /// снимает подписки и закрывает сокет; после его завершения все потоки
    /// получают конец (`recv` возвращает `None`). Повторный вызов ничего не
    /// делает.
    pub async fn dispose(&self) -> ZumbusResult<()> {
        let mut connection = self.connection.lock().await;
        if self.state() == SubscriberState::Closed {
            return Ok(());
        }

        self.shared.set_state(SubscriberState::Draining);
        if let Some(live) = connection.take() {
            live.stop().await;
        }
        let detached = self.shared.detach_all();
        self.shared.set_state(SubscriberState::Closed);

        info!(
            addr = %self.shared.addr,
            streams = detached,
            received = self.received_count(),
            discarded = self.discarded_count(),
            "Subscriber disposed"
        );
        Ok(())
    }

    /// Количество подключённых потоков.
    pub fn handle_count(&self) -> usize {
        self.shared.handle_count()
    }

    /// Сообщений, полученных с транспорта.
    pub fn received_count(&self) -> u64 {
        self.shared.received()
    }

    /// Доставок в очереди потоков (одна запись может дать несколько).
    pub fn delivered_count(&self) -> u64 {
        self.shared.delivered()
    }

    /// Сообщений, отброшенных до раздачи: чужой topic, неизвестный тип,
    /// ошибка разбора или декодирования.
    pub fn discarded_count(&self) -> u64 {
        self.shared.discarded()
    }

    async fn attach<T, F>(
        &self,
        topic: Option<&str>,
        predicate: F,
    ) -> ZumbusResult<TypedStream<T>>
    where
        T: MessageType,
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.ensure_open()?;
        if let Some(topic) = topic {
            ensure!(!topic.is_empty(), StatusCode::InvalidArgs, "Topic cannot be empty");
        }

        let name = self.shared.registry.register::<T>()?;
        let topic = topic.unwrap_or(&name).to_string();
        self.shared.add_topic(&topic);

        let id = self.shared.next_slot_id();
        let (tx, rx) = mpsc::channel(self.shared.config.handle_capacity.max(1));
        let dropped = Arc::new(AtomicU64::new(0));
        let slot = Slot::new(id, tx, predicate, Arc::clone(&dropped));

        let codec = Arc::clone(&self.codec);
        self.shared
            .attach(TypeId::of::<T>(), || decoder_for::<T, C>(codec), slot);
        debug!(
            addr = %self.shared.addr,
            handle = id,
            type_name = %name,
            topic = %topic,
            "Stream attached"
        );

        let stream = TypedStream::new(id, topic, rx, dropped);

        let mut connection = self.connection.lock().await;
        match self.state() {
            // `dispose` завершился между проверкой и подключением потока.
            SubscriberState::Draining | SubscriberState::Closed => {
                self.shared.detach(TypeId::of::<T>(), id);
                return Err(LifecycleError::closed("subscriber").into());
            }
            SubscriberState::Idle => self.connect_locked(&mut connection, false).await?,
            _ => {}
        }
        Ok(stream)
    }

    /// Подключение под захваченным мьютексом соединения.
    async fn connect_locked(
        &self,
        connection: &mut Option<Connection>,
        force: bool,
    ) -> ZumbusResult<()> {
        match self.state() {
            SubscriberState::Draining | SubscriberState::Closed => {
                return Err(LifecycleError::closed("subscriber").into());
            }
            SubscriberState::Listening if !force => return Ok(()),
            _ => {}
        }

        // Старое соединение полностью завершается до создания нового.
        if let Some(old) = connection.take() {
            old.stop().await;
        }

        self.shared.set_state(SubscriberState::Connecting);
        let socket = match SubSocket::connect(&self.shared.addr, self.shared.config.connect_timeout)
            .await
            .with_context(|| format!("Subscriber connect to {}", self.shared.addr))
        {
            Ok(socket) => socket,
            Err(e) => {
                self.shared.set_state(SubscriberState::Idle);
                return Err(e);
            }
        };

        *connection = Some(Connection::spawn(Arc::clone(&self.shared), socket));
        self.shared.set_state(SubscriberState::Listening);
        info!(addr = %self.shared.addr, topics = self.shared.topics.read().len(), "Subscriber listening");
        Ok(())
    }

    fn ensure_open(&self) -> ZumbusResult<()> {
        ensure!(
            !self.state().is_shutting_down(),
            LifecycleError::closed("subscriber")
        );
        Ok(())
    }
}

impl<C: Codec> Drop for Subscriber<C> {
    fn drop(&mut self) {
        if let Some(live) = self.connection.get_mut().take() {
            live.signal();
        }
    }
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            layout: EnvelopeLayout::default(),
            eager_connect: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
            handle_capacity: DEFAULT_HANDLE_CAPACITY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Внутренние методы и функции
////////////////////////////////////////////////////////////////////////////////

fn decoder_for<T, C>(codec: Arc<C>) -> DecodeFn
where
    T: MessageType,
    C: Codec,
{
    debug!(type_name = type_name::<T>(), codec = codec.name(), "Decoder installed");
    Arc::new(move |bytes: &[u8]| {
        codec
            .decode::<T>(bytes)
            .map(|record| Arc::new(record) as Decoded)
    })
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
