//! Общее состояние подписчика и фоновый цикл приёма.

use std::{
    any::{Any, TypeId},
    collections::{HashMap, HashSet},
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use parking_lot::{Mutex, RwLock};
use tokio::{
    select,
    sync::{mpsc, watch, Notify},
    task::JoinHandle,
};
use tracing::{debug, info, trace, warn};
use zumbus_error::{CodecError, TransportError};

use super::{SubscriberConfig, SubscriberState};
use crate::{
    envelope::Envelope,
    registry::TypeRegistry,
    transport::{SubSocket, WireMessage},
};

/// Декодированная запись, общая для всех потоков её типа.
pub(crate) type Decoded = Arc<dyn Any + Send + Sync>;
/// Декодер полезной нагрузки в запись конкретного типа.
pub(crate) type DecodeFn = Arc<dyn Fn(&[u8]) -> Result<Decoded, CodecError> + Send + Sync>;
type DeliverFn = Arc<dyn Fn(&Decoded) -> Delivery + Send + Sync>;

/// Результат попытки доставить запись одному потоку.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    Delivered,
    /// Предикат потока отклонил запись.
    Rejected,
    /// Очередь потока заполнена, запись отброшена.
    Full,
    /// Получатель закрыт, поток нужно отсоединить.
    Closed,
}

/// Один подключённый поток.
pub(crate) struct Slot {
    pub(crate) id: u64,
    deliver: DeliverFn,
}

/// Все потоки одного типа и общий для них декодер.
pub(crate) struct Route {
    decoder: DecodeFn,
    slots: Vec<Slot>,
}

/// Состояние, которое разделяют вызывающий код и фоновый цикл.
pub(crate) struct Shared {
    pub(crate) addr: String,
    pub(crate) registry: Arc<TypeRegistry>,
    pub(crate) config: SubscriberConfig,
    pub(crate) state: Mutex<SubscriberState>,
    pub(crate) topics: RwLock<HashSet<String>>,
    /// Увеличивается при каждом изменении набора topic.
    generation: AtomicU64,
    topics_changed: Notify,
    routes: RwLock<HashMap<TypeId, Route>>,
    next_slot_id: AtomicU64,
    received: AtomicU64,
    delivered: AtomicU64,
    discarded: AtomicU64,
}

/// Живое соединение: сигнал остановки и задача цикла.
pub(crate) struct Connection {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

enum Exit {
    Cancelled,
    RemoteClosed,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl Slot {
    /// Оборачивает типизированную очередь и предикат в стёртую форму.
    pub(crate) fn new<T, F>(
        id: u64,
        tx: mpsc::Sender<Arc<T>>,
        predicate: F,
        dropped: Arc<AtomicU64>,
    ) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let deliver = move |record: &Decoded| -> Delivery {
            if tx.is_closed() {
                return Delivery::Closed;
            }
            let Ok(typed) = Arc::clone(record).downcast::<T>() else {
                return Delivery::Rejected;
            };
            if !predicate(typed.as_ref()) {
                return Delivery::Rejected;
            }
            match tx.try_send(typed) {
                Ok(()) => Delivery::Delivered,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    dropped.fetch_add(1, Ordering::Relaxed);
                    Delivery::Full
                }
                Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Closed,
            }
        };

        Self {
            id,
            deliver: Arc::new(deliver),
        }
    }
}

impl Shared {
    pub(crate) fn new(
        addr: String,
        registry: Arc<TypeRegistry>,
        config: SubscriberConfig,
    ) -> Self {
        Self {
            addr,
            registry,
            config,
            state: Mutex::new(SubscriberState::Idle),
            topics: RwLock::new(HashSet::new()),
            generation: AtomicU64::new(0),
            topics_changed: Notify::new(),
            routes: RwLock::new(HashMap::new()),
            next_slot_id: AtomicU64::new(1),
            received: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        }
    }

    pub(crate) fn state(&self) -> SubscriberState {
        *self.state.lock()
    }

    pub(crate) fn set_state(
        &self,
        next: SubscriberState,
    ) {
        let mut state = self.state.lock();
        let prev = *state;
        if prev != next {
            debug!(addr = %self.addr, from = %prev, to = %next, "Subscriber state changed");
            *state = next;
        }
    }

    /// Добавляет topic. Возвращает `true`, если набор изменился.
    pub(crate) fn add_topic(
        &self,
        topic: &str,
    ) -> bool {
        let inserted = self.topics.write().insert(topic.to_string());
        if inserted {
            self.bump_generation();
        }
        inserted
    }

    pub(crate) fn remove_topic(
        &self,
        topic: &str,
    ) -> bool {
        let removed = self.topics.write().remove(topic);
        if removed {
            self.bump_generation();
        }
        removed
    }

    fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.topics_changed.notify_one();
    }

    pub(crate) fn next_slot_id(&self) -> u64 {
        self.next_slot_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Подключает поток. Декодер типа ставится первым потоком этого типа.
    pub(crate) fn attach(
        &self,
        type_id: TypeId,
        decoder: impl FnOnce() -> DecodeFn,
        slot: Slot,
    ) {
        let mut routes = self.routes.write();
        routes
            .entry(type_id)
            .or_insert_with(|| Route {
                decoder: decoder(),
                slots: Vec::new(),
            })
            .slots
            .push(slot);
    }

    /// Отсоединяет один поток. Возвращает `false`, если его уже нет.
    pub(crate) fn detach(
        &self,
        type_id: TypeId,
        id: u64,
    ) -> bool {
        let mut routes = self.routes.write();
        let Some(route) = routes.get_mut(&type_id) else {
            return false;
        };
        let before = route.slots.len();
        route.slots.retain(|s| s.id != id);
        before != route.slots.len()
    }

    /// Отсоединяет все потоки; их очереди закрываются.
    pub(crate) fn detach_all(&self) -> usize {
        let mut routes = self.routes.write();
        let count = routes.values().map(|r| r.slots.len()).sum();
        routes.clear();
        count
    }

    pub(crate) fn handle_count(&self) -> usize {
        self.routes.read().values().map(|r| r.slots.len()).sum()
    }

    pub(crate) fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub(crate) fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub(crate) fn discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }

    /// Разбирает одно входящее сообщение и раздаёт запись потокам.
    ///
    /// Любая ошибка здесь касается только этого сообщения: оно
    /// отбрасывается, цикл продолжается.
    pub(crate) fn dispatch(
        &self,
        msg: &WireMessage,
    ) {
        self.received.fetch_add(1, Ordering::Relaxed);

        let envelope = match Envelope::from_frames(msg.frames(), self.config.layout) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(addr = %self.addr, error = %e, "Malformed envelope discarded");
                self.discard();
                return;
            }
        };

        if !self.topics.read().contains(envelope.topic()) {
            trace!(topic = envelope.topic(), "Envelope outside subscription set");
            self.discard();
            return;
        }

        let Some(registered) = self.registry.resolve(envelope.type_name()) else {
            debug!(type_name = envelope.type_name(), "Unknown message type discarded");
            self.discard();
            return;
        };

        let decoder = self
            .routes
            .read()
            .get(&registered.type_id)
            .filter(|route| !route.slots.is_empty())
            .map(|route| Arc::clone(&route.decoder));
        let Some(decoder) = decoder else {
            trace!(type_name = envelope.type_name(), "No consumers for message type");
            self.discard();
            return;
        };

        let record = match decoder(envelope.payload()) {
            Ok(record) => record,
            Err(e) => {
                warn!(
                    topic = envelope.topic(),
                    type_name = envelope.type_name(),
                    error = %e,
                    "Payload decode failed, envelope discarded"
                );
                self.discard();
                return;
            }
        };

        self.fan_out(registered.type_id, &record, envelope.type_name());
    }

    fn fan_out(
        &self,
        type_id: TypeId,
        record: &Decoded,
        type_name: &str,
    ) {
        let mut detached = Vec::new();
        let mut delivered = 0u64;

        // Предикаты вызываются без блокировки: они вправе обращаться к
        // подписчику, в том числе подключать новые потоки.
        let targets: Vec<(u64, DeliverFn)> = self
            .routes
            .read()
            .get(&type_id)
            .map(|route| {
                route
                    .slots
                    .iter()
                    .map(|slot| (slot.id, Arc::clone(&slot.deliver)))
                    .collect()
            })
            .unwrap_or_default();

        for (id, deliver) in targets {
            match catch_unwind(AssertUnwindSafe(|| deliver(record))) {
                Ok(Delivery::Delivered) => delivered += 1,
                Ok(Delivery::Rejected) => {}
                Ok(Delivery::Full) => {
                    warn!(handle = id, type_name, "Stream queue full, record dropped");
                }
                Ok(Delivery::Closed) => detached.push(id),
                Err(_) => {
                    warn!(handle = id, type_name, "Stream predicate panicked, detaching stream");
                    detached.push(id);
                }
            }
        }

        if delivered > 0 {
            self.delivered.fetch_add(delivered, Ordering::Relaxed);
        }

        if !detached.is_empty() {
            let mut routes = self.routes.write();
            if let Some(route) = routes.get_mut(&type_id) {
                route.slots.retain(|s| !detached.contains(&s.id));
                debug!(type_name, detached = detached.len(), remaining = route.slots.len(), "Streams detached");
            }
        }
    }

    fn discard(&self) {
        self.discarded.fetch_add(1, Ordering::Relaxed);
    }
}

impl Connection {
    /// Запускает фоновый цикл над подключённым сокетом.
    pub(crate) fn spawn(
        shared: Arc<Shared>,
        socket: SubSocket,
    ) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(receive_loop(shared, socket, shutdown_rx));
        Self { shutdown, task }
    }

    /// Просит цикл остановиться и ждёт его завершения.
    pub(crate) async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Subscriber receive loop terminated abnormally");
        }
    }

    /// Сигнал остановки без ожидания (для `Drop`).
    pub(crate) fn signal(&self) {
        let _ = self.shutdown.send(true);
    }
}

////////////////////////////////////////////////////////////////////////////////
// Внутренние методы и функции
////////////////////////////////////////////////////////////////////////////////

async fn receive_loop(
    shared: Arc<Shared>,
    mut socket: SubSocket,
    mut shutdown: watch::Receiver<bool>,
) {
    let poll_interval = shared.config.poll_interval;
    let mut synced: Option<u64> = None;

    let exit = loop {
        if *shutdown.borrow() {
            break Exit::Cancelled;
        }

        // Изменения набора topic применяются к фильтру сокета до ожидания.
        let generation = shared.generation.load(Ordering::Acquire);
        if synced != Some(generation) {
            let topics = shared.topics.read();
            socket.set_filters(topics.iter().map(String::as_bytes));
            trace!(filters = socket.filter_count(), generation, "Transport filter synced");
            drop(topics);
            synced = Some(generation);
        }

        select! {
            biased;
            _ = shutdown.changed() => break Exit::Cancelled,
            _ = shared.topics_changed.notified() => continue,
            received = socket.recv(poll_interval) => match received {
                Ok(Some(msg)) => shared.dispatch(&msg),
                Ok(None) => {}
                Err(TransportError::Closed) => {
                    info!(addr = %shared.addr, "Remote end closed the subscriber connection");
                    break Exit::RemoteClosed;
                }
                Err(e) => {
                    warn!(addr = %shared.addr, error = %e, "Subscriber connection failed");
                    break Exit::RemoteClosed;
                }
            }
        }
    };

    match exit {
        Exit::Cancelled => {
            socket.unsubscribe_all();
            debug!(
                addr = %shared.addr,
                received = shared.received(),
                filtered_out = socket.filtered_out(),
                "Subscriber receive loop drained"
            );
        }
        Exit::RemoteClosed => {
            // Подписчик возвращается в Idle; потоки и topic сохраняются.
            let mut state = shared.state.lock();
            if *state == SubscriberState::Listening {
                *state = SubscriberState::Idle;
            }
        }
    }
}
