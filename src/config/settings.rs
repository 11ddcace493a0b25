use serde::{Deserialize, Serialize};

use config::{Config, ConfigError, Environment};

use crate::logging::LogFormat;

/// Префикс переменных окружения (`IPC_PUBSUB_CHANNEL_CAPACITY` и т.д.).
pub const ENV_PREFIX: &str = "IPC_PUBSUB";

pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;
pub const DEFAULT_FAILURE_CAPACITY: usize = 64;
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Настройки pub/sub соединений и логирования.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Ёмкость очередей межпроцессных каналов.
    ///
    /// Доставка best-effort: если слушатель канала отстал больше чем на
    /// это число сообщений, самые старые теряются (с предупреждением в
    /// логе), даже если отправитель уже получил `Ok` от `publish`. Для
    /// групп с частыми публикациями значение стоит увеличить.
    pub channel_capacity: usize,
    /// Ёмкость канала сбоев обработчиков.
    pub failure_capacity: usize,
    /// Уровень логирования по умолчанию.
    pub log_level: String,
    /// Формат вывода логов.
    pub log_format: LogFormat,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            failure_capacity: DEFAULT_FAILURE_CAPACITY,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_format: LogFormat::Compact,
        }
    }
}

impl Settings {
    /// Загружает настройки: значения по умолчанию, затем окружение
    /// с префиксом `IPC_PUBSUB_`.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_prefix(ENV_PREFIX)
    }

    pub fn load_with_prefix(prefix: &str) -> Result<Self, ConfigError> {
        let cfg = Config::builder()
            // Добавляем значения по умолчанию
            .set_default("channel_capacity", DEFAULT_CHANNEL_CAPACITY as u64)?
            .set_default("failure_capacity", DEFAULT_FAILURE_CAPACITY as u64)?
            .set_default("log_level", DEFAULT_LOG_LEVEL)?
            .set_default("log_format", "compact")?
            // Добавляем переменные окружения с префиксом
            .add_source(Environment::with_prefix(prefix).try_parsing(true))
            .build()?;

        let settings: Self = cfg.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Нулевая ёмкость недопустима для каналов `broadcast`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel_capacity == 0 {
            return Err(ConfigError::Message(
                "channel_capacity must be greater than zero".to_string(),
            ));
        }
        if self.failure_capacity == 0 {
            return Err(ConfigError::Message(
                "failure_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
