use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибки одного межпроцессного канала (координатор ↔ воркер).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// Канал закрыт или процесс на другой стороне завершился
    #[error("channel to '{peer}' is disconnected")]
    Disconnected { peer: String },

    /// Транспорт не принял запись
    #[error("I/O failure on channel to '{peer}': {reason}")]
    Io { peer: String, reason: String },

    /// Сообщение не удалось закодировать
    #[error("message serialization failed: {reason}")]
    Serialization { reason: String },
}

impl ChannelError {
    /// Идентификатор процесса на другой стороне, если он известен.
    pub fn peer(&self) -> Option<&str> {
        match self {
            Self::Disconnected { peer } | Self::Io { peer, .. } => Some(peer),
            Self::Serialization { .. } => None,
        }
    }
}

impl ErrorExt for ChannelError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Disconnected { .. } => StatusCode::ConnectionClosed,
            Self::Io { .. } => StatusCode::Io,
            Self::Serialization { .. } => StatusCode::SerializationFailed,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        let mut tags = vec![
            ("error_type", "relay_channel".to_string()),
            ("status_code", self.status_code().to_string()),
        ];
        if let Some(peer) = self.peer() {
            tags.push(("peer", peer.to_string()));
        }
        tags
    }
}
