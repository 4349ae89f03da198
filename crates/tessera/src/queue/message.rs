use std::collections::BTreeMap;
use std::time::Duration;
use tessera_core::{Entry, Key, KeyPart, Result, TesseraError, Value, Versionstamp};

use super::{EnqueueOptions, QUEUE_NAMESPACE};

/// A queue entry as stored: payload plus delivery state.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct QueueMessage {
    pub id: String,
    pub payload: Value,
    /// Failed deliveries so far; also the index of the next backoff step
    pub attempt: u32,
    pub backoff_ms: Vec<u64>,
    /// Encoded dead-letter keys
    pub keys_if_undelivered: Vec<Vec<u8>>,
}

impl QueueMessage {
    pub fn new(payload: Value, options: &EnqueueOptions) -> Result<Self> {
        let keys_if_undelivered = options
            .keys_if_undelivered
            .iter()
            .map(Key::encode)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            payload,
            attempt: 0,
            backoff_ms: options
                .backoff_schedule()
                .iter()
                .map(|d| d.as_millis() as u64)
                .collect(),
            keys_if_undelivered,
        })
    }

    /// Queue key of this message when it becomes due at `ready_at` (ms)
    pub fn key_at(&self, ready_at: i64) -> Key {
        Key::new(vec![
            KeyPart::Text(QUEUE_NAMESPACE.to_string()),
            KeyPart::Uint(ready_at.max(0) as u64),
            KeyPart::Text(self.id.clone()),
        ])
    }

    /// Delay before the next attempt, or `None` once the schedule is spent
    pub fn next_backoff(&self) -> Option<Duration> {
        self.backoff_ms
            .get(self.attempt as usize)
            .map(|ms| Duration::from_millis(*ms))
    }

    pub fn dead_letter_keys(&self) -> Result<Vec<Key>> {
        self.keys_if_undelivered
            .iter()
            .map(|encoded| Key::decode(encoded))
            .collect()
    }

    pub fn to_value(&self) -> Value {
        let mut fields = BTreeMap::new();
        fields.insert("id".to_string(), Value::String(self.id.clone()));
        fields.insert("payload".to_string(), self.payload.clone());
        fields.insert("attempt".to_string(), Value::Int(self.attempt as i64));
        fields.insert(
            "backoff_ms".to_string(),
            Value::Array(self.backoff_ms.iter().map(|ms| Value::Int(*ms as i64)).collect()),
        );
        fields.insert(
            "keys_if_undelivered".to_string(),
            Value::Array(
                self.keys_if_undelivered
                    .iter()
                    .map(|k| Value::Bytes(k.clone()))
                    .collect(),
            ),
        );
        Value::Object(fields)
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        let field = |name: &str| {
            value
                .get(name)
                .ok_or_else(|| TesseraError::Queue(format!("queue message lacks {:?}", name)))
        };

        let id = field("id")?
            .as_str()
            .ok_or_else(|| TesseraError::Queue("queue message id is not text".into()))?
            .to_string();
        let attempt = field("attempt")?
            .as_i64()
            .and_then(|a| u32::try_from(a).ok())
            .ok_or_else(|| TesseraError::Queue("queue message attempt is invalid".into()))?;
        let backoff_ms = field("backoff_ms")?
            .as_array()
            .ok_or_else(|| TesseraError::Queue("queue backoff is not a list".into()))?
            .iter()
            .map(|v| {
                v.as_i64()
                    .and_then(|ms| u64::try_from(ms).ok())
                    .ok_or_else(|| TesseraError::Queue("queue backoff step is invalid".into()))
            })
            .collect::<Result<Vec<_>>>()?;
        let keys_if_undelivered = field("keys_if_undelivered")?
            .as_array()
            .ok_or_else(|| TesseraError::Queue("dead-letter keys are not a list".into()))?
            .iter()
            .map(|v| {
                v.as_bytes()
                    .map(<[u8]>::to_vec)
                    .ok_or_else(|| TesseraError::Queue("dead-letter key is not binary".into()))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            id,
            payload: field("payload")?.clone(),
            attempt,
            backoff_ms,
            keys_if_undelivered,
        })
    }
}

/// A due queue entry as seen by the listener
#[derive(Debug, Clone)]
pub(crate) struct QueuedItem {
    pub key: Key,
    pub versionstamp: Versionstamp,
    pub message: QueueMessage,
}

impl QueuedItem {
    pub fn from_entry(entry: Entry) -> Result<Self> {
        Ok(Self {
            message: QueueMessage::from_value(&entry.value)?,
            key: entry.key,
            versionstamp: entry.versionstamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::key;

    #[test]
    fn test_value_roundtrip() {
        let options = EnqueueOptions::new()
            .with_keys_if_undelivered(vec![key!["failed", 1]])
            .with_backoff_schedule(vec![Duration::from_millis(10), Duration::from_millis(20)]);
        let message = QueueMessage::new(Value::from("job"), &options).unwrap();

        let decoded = QueueMessage::from_value(&message.to_value()).unwrap();
        assert_eq!(decoded, message);
        assert_eq!(decoded.dead_letter_keys().unwrap(), vec![key!["failed", 1]]);
    }

    #[test]
    fn test_backoff_is_consumed_in_order() {
        let options = EnqueueOptions::new()
            .with_backoff_schedule(vec![Duration::from_millis(10), Duration::from_millis(20)]);
        let mut message = QueueMessage::new(Value::Null, &options).unwrap();

        assert_eq!(message.next_backoff(), Some(Duration::from_millis(10)));
        message.attempt += 1;
        assert_eq!(message.next_backoff(), Some(Duration::from_millis(20)));
        message.attempt += 1;
        assert_eq!(message.next_backoff(), None);
    }

    #[test]
    fn test_key_layout() {
        let message = QueueMessage::new(Value::Null, &EnqueueOptions::new()).unwrap();
        let key = message.key_at(1_000);
        assert_eq!(key.parts()[0], KeyPart::Text(QUEUE_NAMESPACE.into()));
        assert_eq!(key.parts()[1], KeyPart::Uint(1_000));
        assert_eq!(key.parts()[2], KeyPart::Text(message.id.clone()));
    }

    #[test]
    fn test_malformed_message_rejected() {
        let err = QueueMessage::from_value(&Value::from("not a message")).unwrap_err();
        assert!(matches!(err, TesseraError::Queue(_)));
    }
}
