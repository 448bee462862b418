//! Инициализация `tracing`: фильтр, консольный слой и необязательный
//! файловый слой.

pub mod config;
mod filters;
mod formatter;
pub mod handle;
pub mod sinks;

use std::path::PathBuf;

pub use config::{LogFormat, LoggingConfig};
pub use handle::LoggingHandle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Ошибки настройки логирования.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Invalid log level '{0}', expected one of trace, debug, info, warn, error")]
    InvalidLevel(String),
    #[error("Invalid log format '{0}', expected pretty, compact or json")]
    InvalidFormat(String),
    #[error("Invalid logging config: {0}")]
    InvalidConfig(String),
    #[error("Cannot create log directory {path}: {source}")]
    LogDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Global tracing subscriber is already set: {0}")]
    AlreadyInitialized(String),
}

/// Инициализация логирования с конфигурацией.
///
/// Устанавливает глобальный subscriber; повторный вызов в том же процессе
/// возвращает [`LoggingError::AlreadyInitialized`].
pub fn init_logging(mut config: LoggingConfig) -> Result<LoggingHandle, LoggingError> {
    config.apply_env_overrides();
    config.validate()?;
    config.ensure_log_dir()?;

    let env_filter = filters::build_filter_from_config(&config);
    let mut layers = vec![formatter::build_formatter_from_config(&config)];

    let file_guard = if config.file_enabled {
        let (file_layer, guard) = sinks::file::layer_with_config(&config);
        layers.push(file_layer);
        Some(guard)
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layers)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        log_level = %config.level,
        format = %config.format,
        file_enabled = config.file_enabled,
        log_file = %config.log_file_path().display(),
        "Logging system initialized"
    );

    Ok(LoggingHandle::new(file_guard))
}
