use std::any::Any;

use crate::{ChannelError, ErrorExt, StatusCode};

/// Ошибки pub/sub API, возвращаемые вызывающей стороне.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PubSubError {
    /// `open()` на уже открытом соединении
    AlreadyOpen { strategy: &'static str },
    /// Операция на закрытом (или ещё не открытом) соединении
    NotOpen { strategy: &'static str },
    /// Некорректный фильтр топиков или топик публикации
    InvalidPattern { pattern: String, reason: String },
    /// Неизвестная схема или подсхема дескриптора
    UnknownStrategy { descriptor: String, reason: String },
    /// Схема распознана, но тело дескриптора некорректно
    InvalidDescriptor { descriptor: String, reason: String },
    /// Воркер не смог отправить сообщение координатору
    RelaySend { peer: String, source: ChannelError },
    /// Координатор не смог доставить сообщение части воркеров
    RelayFanout { failed: Vec<FailedRecipient> },
}

/// Получатель, которому не удалось доставить сообщение при рассылке.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedRecipient {
    pub peer: String,
    pub error: ChannelError,
}

impl PubSubError {
    /// Получатели, до которых не дошла рассылка (пусто для прочих ошибок).
    pub fn failed_recipients(&self) -> &[FailedRecipient] {
        match self {
            Self::RelayFanout { failed } => failed,
            _ => &[],
        }
    }
}

impl std::fmt::Display for PubSubError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Self::AlreadyOpen { strategy } => {
                write!(f, "{strategy} connection is already open")
            }
            Self::NotOpen { strategy } => write!(f, "{strategy} connection is not open"),
            Self::InvalidPattern { pattern, reason } => {
                write!(f, "Invalid topic pattern '{pattern}': {reason}")
            }
            Self::UnknownStrategy { descriptor, reason } => {
                write!(f, "Unknown implementation strategy \"{descriptor}\": {reason}")
            }
            Self::InvalidDescriptor { descriptor, reason } => {
                write!(f, "Invalid connection descriptor \"{descriptor}\": {reason}")
            }
            Self::RelaySend { peer, source } => {
                write!(f, "Relay send to '{peer}' failed: {source}")
            }
            Self::RelayFanout { failed } => {
                let peers: Vec<&str> = failed.iter().map(|r| r.peer.as_str()).collect();
                write!(
                    f,
                    "Relay fan-out failed for {} recipient(s): {}",
                    failed.len(),
                    peers.join(", ")
                )
            }
        }
    }
}

impl std::error::Error for PubSubError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::RelaySend { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl ErrorExt for PubSubError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::AlreadyOpen { .. } => StatusCode::AlreadyOpen,
            Self::NotOpen { .. } => StatusCode::NotOpen,
            Self::InvalidPattern { .. } => StatusCode::InvalidPattern,
            Self::UnknownStrategy { .. } => StatusCode::UnknownStrategy,
            Self::InvalidDescriptor { .. } => StatusCode::InvalidDescriptor,
            Self::RelaySend { .. } => StatusCode::SendFailed,
            Self::RelayFanout { .. } => StatusCode::FanoutFailed,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        let mut tags = vec![
            ("error_type", "pubsub".to_string()),
            ("status_code", self.status_code().to_string()),
        ];

        match self {
            Self::AlreadyOpen { strategy } | Self::NotOpen { strategy } => {
                tags.push(("strategy", strategy.to_string()));
            }
            Self::RelaySend { peer, .. } => {
                tags.push(("peer", peer.clone()));
            }
            Self::RelayFanout { failed } => {
                tags.push(("failed_recipients", failed.len().to_string()));
            }
            _ => {}
        }

        tags
    }
}
