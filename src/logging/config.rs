use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::Level;

use crate::config::Settings;

/// Формат вывода логов.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

/// Ошибки инициализации логирования.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log level '{0}'")]
    InvalidLevel(String),
    #[error("failed to install tracing subscriber: {0}")]
    Init(String),
}

/// Конфигурация логирования.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub with_target: bool,
    pub with_thread_ids: bool,
    pub with_line_numbers: bool,
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
            with_target: true,
            with_thread_ids: false,
            with_line_numbers: false,
            ansi: true,
        }
    }
}

impl LoggingConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            level: settings.log_level.clone(),
            format: settings.log_format,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), LoggingError> {
        self.level
            .parse::<Level>()
            .map(|_| ())
            .map_err(|_| LoggingError::InvalidLevel(self.level.clone()))
    }

    /// Директива фильтра: уровень для крейта и уровень `warn` для остальных.
    pub fn build_filter_directive(&self) -> String {
        format!("warn,ipc_pubsub={}", self.level.to_ascii_lowercase())
    }
}
