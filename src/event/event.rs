use crate::core::value::{get_i64, get_str};
use crate::core::{AttributeValue, EventLogError, Item, Result};
use crate::event::index::SortKey;
use crate::event::partition::{MAX_TIMESTAMP, TimePartition};
use crate::event::{KEY_DELIMITER, validate_key_component};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::str::FromStr;
use uuid::Uuid;

/// Length of the payload checksum embedded in sort keys.
pub const CHECKSUM_LEN: usize = 27;

/// Length of a content id (a full SHA-256 digest in unpadded base64).
pub const CONTENT_ID_LEN: usize = 43;

/// Field names of the primary event record.
pub mod fields {
    pub const UUID: &str = "uuid";
    pub const TYPE: &str = "t";
    pub const TIMESTAMP: &str = "ts";
    pub const DATA: &str = "ds";
}

/// One immutable fact in the log.
///
/// The payload is kept both as a JSON value and in its canonical serialized
/// form; the serialized form is what gets stored and hashed, so a record read
/// back from the store reproduces the exact bytes that were written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    uuid: Uuid,
    event_type: String,
    timestamp: i64,
    payload: Value,
    data: String,
    checksum: String,
}

impl Event {
    /// Creates an event with a random id.
    pub fn new(event_type: impl Into<String>, payload: Value, timestamp: i64) -> Result<Self> {
        let event_type = event_type.into();
        validate_key_component("event type", &event_type)?;
        validate_timestamp(timestamp)?;

        let data = serde_json::to_string(&payload)
            .map_err(|err| EventLogError::validation(format!("payload is not a document: {}", err)))?;
        let checksum = checksum(&data);

        Ok(Self {
            uuid: Uuid::new_v4(),
            event_type,
            timestamp,
            payload,
            data,
            checksum,
        })
    }

    /// Creates an event from any serializable payload.
    pub fn from_value<T: Serialize + ?Sized>(
        event_type: impl Into<String>,
        payload: &T,
        timestamp: i64,
    ) -> Result<Self> {
        let payload = serde_json::to_value(payload)
            .map_err(|err| EventLogError::validation(format!("payload is not a document: {}", err)))?;
        Self::new(event_type, payload, timestamp)
    }

    pub fn at(event_type: impl Into<String>, payload: Value, date: DateTime<Utc>) -> Result<Self> {
        Self::new(event_type, payload, date.timestamp_millis())
    }

    /// Creates an event whose id is derived from its content, so publishing
    /// the same fact twice lands on the same primary record.
    pub fn content_addressed(
        namespace: &str,
        event_type: impl Into<String>,
        payload: Value,
        timestamp: i64,
    ) -> Result<Self> {
        let event = Self::new(event_type, payload, timestamp)?;
        let content_id = event.content_id(namespace)?;
        let uuid = Uuid::new_v5(&Uuid::NAMESPACE_OID, content_id.as_bytes());
        Ok(event.with_uuid(uuid))
    }

    /// Replaces the id, for idempotent replay of a known event.
    pub fn with_uuid(mut self, uuid: Uuid) -> Self {
        self.uuid = uuid;
        self
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Milliseconds since the Unix epoch.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn date(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.timestamp).unwrap_or_default()
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Canonical serialized payload, as stored.
    pub fn serialized_payload(&self) -> &str {
        &self.data
    }

    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    /// Deterministic identity over namespace, type, timestamp and payload.
    pub fn content_id(&self, namespace: &str) -> Result<String> {
        validate_key_component("namespace", namespace)?;
        let mut hasher = Sha256::new();
        hasher.update(namespace.as_bytes());
        hasher.update([KEY_DELIMITER as u8]);
        hasher.update(self.event_type.as_bytes());
        hasher.update([KEY_DELIMITER as u8]);
        hasher.update(self.timestamp.to_string().as_bytes());
        hasher.update([KEY_DELIMITER as u8]);
        hasher.update(self.data.as_bytes());
        let mut encoded = URL_SAFE_NO_PAD.encode(hasher.finalize());
        encoded.truncate(CONTENT_ID_LEN);
        Ok(encoded)
    }

    /// Namespace-wide partition this event falls into.
    pub fn time_partition(&self, namespace: &str) -> TimePartition {
        TimePartition::containing(namespace, self.timestamp, None)
    }

    /// Per-type partition this event falls into.
    pub fn typed_time_partition(&self, namespace: &str) -> TimePartition {
        TimePartition::containing(namespace, self.timestamp, Some(&self.event_type))
    }

    /// Position of this event inside any partition it belongs to.
    pub fn sort_key(&self) -> SortKey {
        SortKey::new(self.timestamp, self.checksum.clone(), self.uuid)
    }

    pub fn as_record(&self) -> Item {
        let mut record = Item::new();
        record.insert(fields::UUID.to_string(), AttributeValue::S(self.uuid.to_string()));
        record.insert(fields::TYPE.to_string(), AttributeValue::S(self.event_type.clone()));
        record.insert(fields::TIMESTAMP.to_string(), AttributeValue::N(self.timestamp));
        record.insert(fields::DATA.to_string(), AttributeValue::S(self.data.clone()));
        record
    }

    pub fn from_record(record: &Item) -> Result<Self> {
        let uuid = Uuid::from_str(get_str(record, fields::UUID)?).map_err(|err| {
            EventLogError::Serialization(format!("invalid event uuid: {}", err))
        })?;
        let event_type = get_str(record, fields::TYPE)?.to_string();
        let timestamp = get_i64(record, fields::TIMESTAMP)?;
        let data = get_str(record, fields::DATA)?.to_string();
        let payload: Value = serde_json::from_str(&data)?;

        validate_key_component("event type", &event_type)
            .map_err(|err| EventLogError::Serialization(err.to_string()))?;

        Ok(Self {
            uuid,
            event_type,
            timestamp,
            payload,
            checksum: checksum(&data),
            data,
        })
    }
}

fn validate_timestamp(timestamp: i64) -> Result<()> {
    if !(0..=MAX_TIMESTAMP).contains(&timestamp) {
        return Err(EventLogError::validation(format!(
            "timestamp {} is outside 0..={}",
            timestamp, MAX_TIMESTAMP
        )));
    }
    Ok(())
}

fn checksum(data: &str) -> String {
    let digest = Sha256::digest(data.as_bytes());
    let mut encoded = URL_SAFE_NO_PAD.encode(digest);
    encoded.truncate(CHECKSUM_LEN);
    encoded
}
