//! Secondary index layout.
//!
//! Every published event produces five index records next to its primary
//! record. Keys are built from typed fields and only rendered to the store's
//! string format when an item is produced.

use crate::core::value::get_str;
use crate::core::{AttributeValue, EventLogError, Item, Key, Result};
use crate::event::partition::{TimePartition, decode_timestamp, encode_timestamp};
use crate::event::{Event, KEY_DELIMITER};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Partition key attribute of the index table.
pub const PARTITION_KEY_ATTR: &str = "n";
/// Sort key attribute of the index table.
pub const SORT_KEY_ATTR: &str = "v";
/// Event reference carried by membership records.
pub const EVENT_ID_ATTR: &str = "id";
/// Primary key attribute of the events table.
pub const PRIMARY_KEY_ATTR: &str = "uuid";

/// The series an index record belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndexKey {
    /// `{ns},event_types`: every event type ever published.
    EventTypes { namespace: String },
    /// `{ns},partitions`: every window touched by any event.
    Partitions { namespace: String },
    /// `{ns},partitions,{type}`: every window touched by one type.
    TypePartitions { namespace: String, event_type: String },
    /// Events inside one window, bare or narrowed to a type.
    PartitionEvents(TimePartition),
}

impl IndexKey {
    pub fn partitions(namespace: &str, event_type: Option<&str>) -> Self {
        match event_type {
            Some(event_type) => Self::TypePartitions {
                namespace: namespace.to_string(),
                event_type: event_type.to_string(),
            },
            None => Self::Partitions {
                namespace: namespace.to_string(),
            },
        }
    }

    /// The rendered partition-key value.
    pub fn partition_value(&self) -> String {
        let d = KEY_DELIMITER;
        match self {
            Self::EventTypes { namespace } => format!("{namespace}{d}event_types"),
            Self::Partitions { namespace } => format!("{namespace}{d}partitions"),
            Self::TypePartitions {
                namespace,
                event_type,
            } => format!("{namespace}{d}partitions{d}{event_type}"),
            Self::PartitionEvents(partition) => partition.id(),
        }
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.partition_value())
    }
}

/// Position of an event inside a partition: `timestamp,checksum,uuid`.
///
/// Ordering is by timestamp first; the checksum and uuid only make keys of
/// simultaneous events distinct and deterministically ordered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SortKey {
    timestamp: i64,
    checksum: String,
    uuid: Uuid,
}

impl SortKey {
    pub fn new(timestamp: i64, checksum: String, uuid: Uuid) -> Self {
        Self {
            timestamp,
            checksum,
            uuid,
        }
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn encode(&self) -> String {
        format!(
            "{}{d}{}{d}{}",
            encode_timestamp(self.timestamp),
            self.checksum,
            self.uuid,
            d = KEY_DELIMITER
        )
    }

    pub fn parse(encoded: &str) -> Result<Self> {
        let mut parts = encoded.splitn(3, KEY_DELIMITER);
        let (Some(ts), Some(checksum), Some(uuid)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(EventLogError::Serialization(format!(
                "malformed event sort key '{}'",
                encoded
            )));
        };
        let uuid = Uuid::from_str(uuid)
            .map_err(|err| EventLogError::Serialization(format!("invalid uuid in sort key: {}", err)))?;
        Ok(Self::new(decode_timestamp(ts)?, checksum.to_string(), uuid))
    }
}

/// One `(n, v[, id])` item destined for the index table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRecord {
    pub key: IndexKey,
    pub sort_value: String,
    pub event_id: Option<Uuid>,
}

impl IndexRecord {
    /// All index records for `event` published under `namespace`.
    pub fn for_event(namespace: &str, event: &Event) -> Vec<IndexRecord> {
        let window = encode_timestamp(event.time_partition(namespace).start());
        let sort_key = event.sort_key().encode();

        vec![
            IndexRecord {
                key: IndexKey::partitions(namespace, None),
                sort_value: window.clone(),
                event_id: None,
            },
            IndexRecord {
                key: IndexKey::partitions(namespace, Some(event.event_type())),
                sort_value: window,
                event_id: None,
            },
            IndexRecord {
                key: IndexKey::PartitionEvents(event.time_partition(namespace)),
                sort_value: sort_key.clone(),
                event_id: Some(event.uuid()),
            },
            IndexRecord {
                key: IndexKey::PartitionEvents(event.typed_time_partition(namespace)),
                sort_value: sort_key,
                event_id: Some(event.uuid()),
            },
            IndexRecord {
                key: IndexKey::EventTypes {
                    namespace: namespace.to_string(),
                },
                sort_value: event.event_type().to_string(),
                event_id: None,
            },
        ]
    }

    pub fn into_item(self) -> Item {
        let mut item = Item::new();
        item.insert(
            PARTITION_KEY_ATTR.to_string(),
            AttributeValue::S(self.key.partition_value()),
        );
        item.insert(SORT_KEY_ATTR.to_string(), AttributeValue::S(self.sort_value));
        if let Some(id) = self.event_id {
            item.insert(EVENT_ID_ATTR.to_string(), AttributeValue::S(id.to_string()));
        }
        item
    }
}

/// Key of an event's primary record.
pub fn primary_key(uuid: Uuid) -> Key {
    let mut key = Key::new();
    key.insert(PRIMARY_KEY_ATTR.to_string(), AttributeValue::S(uuid.to_string()));
    key
}

/// Reads the event id referenced by a membership record.
pub fn referenced_event_id(item: &Item) -> Result<Uuid> {
    let raw = get_str(item, EVENT_ID_ATTR)?;
    Uuid::from_str(raw)
        .map_err(|err| EventLogError::Serialization(format!("invalid event reference '{}': {}", raw, err)))
}
