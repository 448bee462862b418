use std::{
    env, fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use super::LoggingError;

/// Допустимые уровни логирования.
const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Формат вывода в консоль.
#[derive(Debug, Default, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

/// Конфигурация логирования.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Уровень для крейта `zumbus` (`trace`..`error`).
    pub level: String,
    pub format: LogFormat,
    pub with_ansi: bool,
    pub with_target: bool,
    pub with_thread_ids: bool,
    /// Дополнительно писать логи в файл с ежедневной ротацией.
    pub file_enabled: bool,
    pub log_dir: PathBuf,
    pub file_name: String,
}

impl LoggingConfig {
    /// Переопределения из окружения: `ZUMBUS_LOG_LEVEL`, `ZUMBUS_LOG_FORMAT`,
    /// `ZUMBUS_LOG_DIR`, `ZUMBUS_LOG_FILE`.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = env::var("ZUMBUS_LOG_LEVEL") {
            self.level = level.trim().to_ascii_lowercase();
        }
        if let Some(format) = env::var("ZUMBUS_LOG_FORMAT")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.format = format;
        }
        if let Ok(dir) = env::var("ZUMBUS_LOG_DIR") {
            self.log_dir = PathBuf::from(dir);
            self.file_enabled = true;
        }
        if let Ok(file) = env::var("ZUMBUS_LOG_FILE") {
            self.file_name = file;
        }
    }

    pub fn validate(&self) -> Result<(), LoggingError> {
        if !LEVELS.contains(&self.level.as_str()) {
            return Err(LoggingError::InvalidLevel(self.level.clone()));
        }
        if self.file_enabled && self.file_name.trim().is_empty() {
            return Err(LoggingError::InvalidConfig(
                "file logging enabled without a file name".to_string(),
            ));
        }
        Ok(())
    }

    /// Создаёт каталог логов, если запись в файл включена.
    pub fn ensure_log_dir(&self) -> Result<(), LoggingError> {
        if self.file_enabled {
            std::fs::create_dir_all(&self.log_dir).map_err(|source| LoggingError::LogDir {
                path: self.log_dir.clone(),
                source,
            })?;
        }
        Ok(())
    }

    /// Директива `EnvFilter`: свой уровень для `zumbus`, `warn` для
    /// остальных крейтов.
    pub fn build_filter_directive(&self) -> String {
        format!("warn,zumbus={level},zumbus_hub={level}", level = self.level)
    }

    pub fn log_file_path(&self) -> PathBuf {
        Path::new(&self.log_dir).join(&self.file_name)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
            with_ansi: true,
            with_target: true,
            with_thread_ids: false,
            file_enabled: false,
            log_dir: PathBuf::from("logs"),
            file_name: "zumbus.log".to_string(),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(match self {
            Self::Pretty => "pretty",
            Self::Compact => "compact",
            Self::Json => "json",
        })
    }
}

impl FromStr for LogFormat {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(LoggingError::InvalidFormat(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    fn clear_env() {
        for key in [
            "ZUMBUS_LOG_LEVEL",
            "ZUMBUS_LOG_FORMAT",
            "ZUMBUS_LOG_DIR",
            "ZUMBUS_LOG_FILE",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn test_default_is_valid() {
        let config = LoggingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(config.build_filter_directive(), "warn,zumbus=info,zumbus_hub=info");
    }

    #[test]
    fn test_invalid_level() {
        let config = LoggingConfig {
            level: "loud".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(LoggingError::InvalidLevel(_))));
    }

    #[test]
    fn test_format_parse() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("compact".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    /// Тест проверяет переопределения из переменных окружения.
    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        env::set_var("ZUMBUS_LOG_LEVEL", " DEBUG ");
        env::set_var("ZUMBUS_LOG_FORMAT", "json");
        env::set_var("ZUMBUS_LOG_DIR", "/tmp/zumbus-logs");

        let mut config = LoggingConfig::default();
        config.apply_env_overrides();
        clear_env();

        assert_eq!(config.level, "debug");
        assert_eq!(config.format, LogFormat::Json);
        assert!(config.file_enabled);
        assert_eq!(config.log_file_path(), PathBuf::from("/tmp/zumbus-logs/zumbus.log"));
    }

    #[test]
    fn test_ensure_log_dir_creates_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            file_enabled: true,
            log_dir: tmp.path().join("nested").join("logs"),
            ..Default::default()
        };
        config.ensure_log_dir().unwrap();
        assert!(config.log_dir.is_dir());
    }
}
