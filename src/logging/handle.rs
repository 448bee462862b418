use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tracing_appender::non_blocking::WorkerGuard;

/// Handle для управления lifecycle логирования.
///
/// Держит guard файлового писателя: пока handle жив, фоновый поток
/// дописывает буфер в файл.
pub struct LoggingHandle {
    file_guard: Option<WorkerGuard>,
    shutdown: Arc<AtomicBool>,
}

impl LoggingHandle {
    pub fn new(file_guard: Option<WorkerGuard>) -> Self {
        Self {
            file_guard,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Включена ли запись в файл.
    pub fn has_file_sink(&self) -> bool {
        self.file_guard.is_some()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Сбрасывает буферы и освобождает файловый писатель.
    pub fn shutdown(mut self) {
        self.shutdown.store(true, Ordering::Release);
        tracing::info!(file_sink = self.has_file_sink(), "Logging shutdown");
        drop(self.file_guard.take());
    }
}

impl Drop for LoggingHandle {
    fn drop(&mut self) {
        if !self.is_shutdown() && self.file_guard.is_some() {
            eprintln!("WARNING: LoggingHandle dropped without shutdown(), some logs may be lost");
        }
    }
}
