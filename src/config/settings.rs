use std::{path::Path, time::Duration};

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::{envelope::EnvelopeLayout, hub::HubConfig, logging::LoggingConfig};

/// Границы допустимого интервала ожидания, мс.
const POLL_INTERVAL_RANGE_MS: (u64, u64) = (100, 1000);

/// Настройки хаба.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HubSettings {
    pub ingress: String,
    pub egress: String,
    pub poll_interval_ms: u64,
    pub ingress_capacity: usize,
    pub egress_capacity: usize,
    pub write_timeout_ms: u64,
    /// Раскладка, которую ожидают участники шины. Хаб конверты не читает,
    /// значение нужно для логов и клиентов, читающих тот же файл.
    pub layout: EnvelopeLayout,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settings {
    pub hub: HubSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Settings {
    /// Значения по умолчанию и переменные окружения
    /// (`ZUMBUS_HUB__INGRESS`, `ZUMBUS_LOGGING__LEVEL` и т.д.).
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// То же, что [`Settings::load`], плюс файл между значениями по
    /// умолчанию и окружением. Формат определяется по расширению.
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        let defaults = HubConfig::default();
        let mut builder = Config::builder()
            // Добавляем значения по умолчанию
            .set_default("hub.ingress", defaults.ingress)?
            .set_default("hub.egress", defaults.egress)?
            .set_default("hub.poll_interval_ms", defaults.poll_interval.as_millis() as u64)?
            .set_default("hub.ingress_capacity", defaults.ingress_capacity as u64)?
            .set_default("hub.egress_capacity", defaults.egress_capacity as u64)?
            .set_default("hub.write_timeout_ms", defaults.write_timeout.as_millis() as u64)?
            .set_default("hub.layout", EnvelopeLayout::default().as_str())?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        // Переменные окружения с префиксом ZUMBUS_
        let cfg = builder
            .add_source(
                Environment::with_prefix("ZUMBUS")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Self = cfg.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let (min, max) = POLL_INTERVAL_RANGE_MS;
        if !(min..=max).contains(&self.hub.poll_interval_ms) {
            return Err(ConfigError::Message(format!(
                "hub.poll_interval_ms must be within {min}..={max}, got {}",
                self.hub.poll_interval_ms
            )));
        }
        if self.hub.ingress_capacity == 0 || self.hub.egress_capacity == 0 {
            return Err(ConfigError::Message(
                "hub capacities must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            ingress: self.hub.ingress.clone(),
            egress: self.hub.egress.clone(),
            poll_interval: Duration::from_millis(self.hub.poll_interval_ms),
            ingress_capacity: self.hub.ingress_capacity,
            egress_capacity: self.hub.egress_capacity,
            write_timeout: Duration::from_millis(self.hub.write_timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{env, io::Write};

    use serial_test::serial;

    use super::*;

    const KEYS: [&str; 3] = [
        "ZUMBUS_HUB__INGRESS",
        "ZUMBUS_HUB__POLL_INTERVAL_MS",
        "ZUMBUS_LOGGING__LEVEL",
    ];

    fn clear_env() {
        for key in KEYS {
            env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        let settings = Settings::load().unwrap();
        assert_eq!(settings.hub.ingress, "127.0.0.1:5555");
        assert_eq!(settings.hub.egress, "127.0.0.1:5556");
        assert_eq!(settings.hub.poll_interval_ms, 250);
        assert_eq!(settings.hub.layout, EnvelopeLayout::ThreePart);
        assert_eq!(settings.logging, LoggingConfig::default());

        let hub = settings.hub_config();
        assert_eq!(hub.poll_interval, Duration::from_millis(250));
    }

    /// Тест проверяет, что окружение перекрывает значения по умолчанию.
    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        env::set_var("ZUMBUS_HUB__INGRESS", "0.0.0.0:7000");
        env::set_var("ZUMBUS_HUB__POLL_INTERVAL_MS", "500");
        env::set_var("ZUMBUS_LOGGING__LEVEL", "debug");
        let settings = Settings::load();
        clear_env();

        let settings = settings.unwrap();
        assert_eq!(settings.hub.ingress, "0.0.0.0:7000");
        assert_eq!(settings.hub.poll_interval_ms, 500);
        assert_eq!(settings.logging.level, "debug");
    }

    #[test]
    #[serial]
    fn test_poll_interval_out_of_range() {
        clear_env();
        env::set_var("ZUMBUS_HUB__POLL_INTERVAL_MS", "5");
        let result = Settings::load();
        clear_env();
        assert!(result.is_err());
    }

    #[test]
    #[serial]
    fn test_file_source() {
        clear_env();
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[hub]\negress = \"127.0.0.1:9999\"\nlayout = \"two_part\"\n\n[logging]\nformat = \"json\""
        )
        .unwrap();

        let settings = Settings::load_from(Some(file.path())).unwrap();
        assert_eq!(settings.hub.egress, "127.0.0.1:9999");
        assert_eq!(settings.hub.ingress, "127.0.0.1:5555");
        assert_eq!(settings.hub.layout, EnvelopeLayout::TwoPart);
        assert_eq!(settings.logging.format, crate::logging::LogFormat::Json);
    }
}
