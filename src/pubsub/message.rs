use serde_json::Value;

/// Доставленное сообщение: топик публикации и полезная нагрузка.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub channel: String,
    pub payload: Value,
}

impl Message {
    pub fn new(
        channel: impl Into<String>,
        payload: impl Into<Value>,
    ) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    /// Тест проверяет создание сообщения со строковым значением.
    #[test]
    fn test_message_creation_with_str() {
        let msg = Message::new("foo/bar", "x");
        assert_eq!(msg.channel, "foo/bar");
        assert_eq!(msg.payload, json!("x"));
    }

    /// Тест проверяет создание сообщения со структурированной нагрузкой.
    #[test]
    fn test_message_with_object_payload() {
        let payload = json!({ "id": 7, "tags": ["a", "b"] });
        let msg = Message::new(String::from("orders/created"), payload.clone());
        assert_eq!(msg.payload, payload);
    }

    /// Тест проверяет, что `null` — допустимая нагрузка.
    #[test]
    fn test_message_with_null_payload() {
        let msg = Message::new("system", Value::Null);
        assert!(msg.payload.is_null());
    }
}
