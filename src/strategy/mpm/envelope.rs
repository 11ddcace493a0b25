use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ChannelError;

/// Направление сообщения внутри группы процессов.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnvelopeKind {
    /// Запрос воркера на публикацию, адресован координатору.
    ToCoordinator,
    /// Рассылка координатора, адресована воркерам.
    ToWorker,
}

/// Конверт сообщения ретранслятора.
///
/// `group_id` привязывает конверт к одному логическому соединению, чтобы
/// несколько групп на общем физическом канале не получали чужие сообщения.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayEnvelope {
    pub kind: EnvelopeKind,
    pub group_id: String,
    pub channel: String,
    #[serde(default)]
    pub value: Value,
}

impl RelayEnvelope {
    pub fn to_coordinator(
        group_id: &str,
        channel: &str,
        value: Value,
    ) -> Self {
        Self {
            kind: EnvelopeKind::ToCoordinator,
            group_id: group_id.to_string(),
            channel: channel.to_string(),
            value,
        }
    }

    pub fn to_worker(
        group_id: &str,
        channel: &str,
        value: Value,
    ) -> Self {
        Self {
            kind: EnvelopeKind::ToWorker,
            group_id: group_id.to_string(),
            channel: channel.to_string(),
            value,
        }
    }

    /// Представление конверта для передачи по каналу.
    pub fn to_value(&self) -> Result<Value, ChannelError> {
        serde_json::to_value(self).map_err(|e| ChannelError::Serialization {
            reason: e.to_string(),
        })
    }

    /// Разбирает входящее сообщение.
    ///
    /// Возвращает `None` для сообщений другой формы или другой группы:
    /// такие сообщения игнорируются, а не считаются ошибкой.
    pub fn parse(
        raw: &Value,
        group_id: &str,
    ) -> Option<Self> {
        serde_json::from_value::<Self>(raw.clone())
            .ok()
            .filter(|envelope| envelope.group_id == group_id)
    }
}
