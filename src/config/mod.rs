//! Конфигурация процесса хаба: значения по умолчанию, необязательный файл и
//! переменные окружения с префиксом `ZUMBUS_`.

pub mod settings;

pub use settings::{HubSettings, Settings};
