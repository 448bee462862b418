//! Процесс хаба шины zumbus.
//!
//! Значения по умолчанию берутся из [`Settings::load`] (файл и переменные
//! `ZUMBUS_*`), аргументы командной строки их перекрывают.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use zumbus::{init_logging, Hub, LogFormat, Settings};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_COMMIT"),
    ", built ",
    env!("BUILD_TIME"),
    ")"
);

/// Аргументы командной строки хаба.
#[derive(Parser, Debug)]
#[command(name = "zumbus-hub")]
#[command(version = VERSION)]
#[command(about = "Zumbus hub - forwards messages from publishers to subscribers", long_about = None)]
struct Cli {
    /// Файл конфигурации (toml, yaml, json)
    #[arg(short, long, env = "ZUMBUS_CONFIG")]
    config: Option<PathBuf>,
    /// Адрес для издателей
    #[arg(long, help = "Адрес, на который подключаются издатели")]
    ingress: Option<String>,
    /// Адрес для подписчиков
    #[arg(long, help = "Адрес, на который подключаются подписчики")]
    egress: Option<String>,
    /// Интервал ожидания цикла ретрансляции
    #[arg(
        long,
        value_parser = clap::value_parser!(u64).range(100..=1000),
        help = "Интервал ожидания цикла ретрансляции, мс (100..=1000)"
    )]
    poll_interval_ms: Option<u64>,
    /// Уровень логирования
    #[arg(long, help = "Уровень логирования: trace, debug, info, warn, error")]
    log_level: Option<String>,
    /// Формат логов
    #[arg(long, help = "Формат логов: pretty, compact, json")]
    log_format: Option<LogFormat>,
}

impl Cli {
    /// Накладывает аргументы на загруженные настройки.
    fn apply(
        self,
        settings: &mut Settings,
    ) {
        if let Some(ingress) = self.ingress {
            settings.hub.ingress = ingress;
        }
        if let Some(egress) = self.egress {
            settings.hub.egress = egress;
        }
        if let Some(ms) = self.poll_interval_ms {
            settings.hub.poll_interval_ms = ms;
        }
        if let Some(level) = self.log_level {
            settings.logging.level = level.to_ascii_lowercase();
        }
        if let Some(format) = self.log_format {
            settings.logging.format = format;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings =
        Settings::load_from(cli.config.as_deref()).context("Failed to load hub settings")?;
    cli.apply(&mut settings);
    settings.validate().context("Invalid hub settings")?;

    let logging =
        init_logging(settings.logging.clone()).context("Failed to initialize logging")?;
    info!(version = VERSION, layout = %settings.hub.layout, "Starting zumbus hub");

    let hub = Hub::new(settings.hub_config());
    hub.start().await.context("Failed to start hub")?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Shutdown signal received");

    hub.stop().await.context("Failed to stop hub")?;
    logging.shutdown();
    Ok(())
}
