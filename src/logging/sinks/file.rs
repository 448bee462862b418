use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling::daily};
use tracing_subscriber::{fmt, registry::LookupSpan, Layer};

use crate::logging::config::{LogFormat, LoggingConfig};

/// Файловый слой с ежедневной ротацией.
///
/// Запись идёт через фоновый поток; возвращаемый [`WorkerGuard`] нужно
/// держать до конца работы, иначе хвост логов будет потерян.
pub fn layer_with_config<S>(config: &LoggingConfig) -> (Box<dyn Layer<S> + Send + Sync>, WorkerGuard)
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let file_appender = daily(&config.log_dir, &config.file_name);
    let (writer, guard) = non_blocking(file_appender);

    let layer = fmt::layer()
        .with_ansi(false)
        .with_target(config.with_target)
        .with_writer(writer);

    let layer: Box<dyn Layer<S> + Send + Sync> = match config.format {
        LogFormat::Json => Box::new(layer.json()),
        LogFormat::Pretty | LogFormat::Compact => Box::new(layer),
    };
    (layer, guard)
}
