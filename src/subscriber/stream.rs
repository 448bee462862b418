use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::sync::mpsc::{self, error::TryRecvError};

/// Типизированный поток записей одного типа.
///
/// У каждого потока своя ограниченная очередь. Когда очередь заполнена,
/// новые записи для этого потока отбрасываются и учитываются в
/// [`TypedStream::dropped`]; остальные потоки и фоновый цикл это не
/// затрагивает.
///
/// После освобождения подписчика (`dispose`) поток отдаёт оставшиеся в
/// очереди записи, а затем `recv` возвращает `None`.
pub struct TypedStream<T> {
    id: u64,
    topic: String,
    rx: mpsc::Receiver<Arc<T>>,
    dropped: Arc<AtomicU64>,
}

impl<T> TypedStream<T> {
    pub(crate) fn new(
        id: u64,
        topic: String,
        rx: mpsc::Receiver<Arc<T>>,
        dropped: Arc<AtomicU64>,
    ) -> Self {
        Self {
            id,
            topic,
            rx,
            dropped,
        }
    }

    /// Ждёт следующую запись. `None` означает, что поток завершён.
    pub async fn recv(&mut self) -> Option<Arc<T>> {
        self.rx.recv().await
    }

    /// Забирает запись без ожидания.
    pub fn try_recv(&mut self) -> Option<Arc<T>> {
        match self.rx.try_recv() {
            Ok(v) => Some(v),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Ждёт запись не дольше `wait`. `None` при таймауте или завершении
    /// потока; различить их можно через [`TypedStream::is_closed`].
    pub async fn recv_timeout(
        &mut self,
        wait: Duration,
    ) -> Option<Arc<T>> {
        tokio::time::timeout(wait, self.rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Количество записей, отброшенных из-за переполнения очереди.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Topic, добавленный при создании потока.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Записей в очереди прямо сейчас.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Поток завершён отправителем и очередь пуста.
    pub fn is_closed(&self) -> bool {
        self.rx.is_closed() && self.rx.is_empty()
    }

    /// Отсоединяет поток от подписчика. Уже полученные записи можно
    /// дочитать.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

impl<T> fmt::Debug for TypedStream<T> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("TypedStream")
            .field("id", &self.id)
            .field("type", &std::any::type_name::<T>())
            .field("topic", &self.topic)
            .field("queued", &self.rx.len())
            .field("dropped", &self.dropped())
            .finish()
    }
}
