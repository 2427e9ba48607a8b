use crate::core::{EventLogError, Item, Result};
use crate::event::KEY_DELIMITER;
use crate::event::index::SORT_KEY_ATTR;
use std::fmt;

/// Width of a time partition: 14 days in milliseconds.
///
/// This is a deployment constant. Changing it orphans every partition index
/// written under the previous value.
pub const WINDOW_MILLIS: i64 = 14 * 24 * 60 * 60 * 1000;

/// Number of digits timestamps are zero-padded to inside keys, so that string
/// order equals numeric order.
pub const TIMESTAMP_WIDTH: usize = 15;

/// Largest timestamp (ms) representable in a key.
pub const MAX_TIMESTAMP: i64 = 999_999_999_999_999;

pub fn encode_timestamp(timestamp: i64) -> String {
    format!("{:0width$}", timestamp, width = TIMESTAMP_WIDTH)
}

pub fn decode_timestamp(encoded: &str) -> Result<i64> {
    encoded.parse::<i64>().map_err(|err| {
        EventLogError::Serialization(format!("invalid timestamp '{}': {}", encoded, err))
    })
}

/// A fixed-width time bucket of one namespace, optionally narrowed to a
/// single event type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TimePartition {
    namespace: String,
    window_start: i64,
    event_type: Option<String>,
}

impl TimePartition {
    /// Start of the window containing `timestamp`.
    pub fn timestamp_for(timestamp: i64) -> i64 {
        timestamp - timestamp.rem_euclid(WINDOW_MILLIS)
    }

    /// The partition containing `timestamp`.
    pub fn containing(namespace: &str, timestamp: i64, event_type: Option<&str>) -> Self {
        Self {
            namespace: namespace.to_string(),
            window_start: Self::timestamp_for(timestamp),
            event_type: event_type.map(str::to_string),
        }
    }

    /// Rebuilds a partition from a partition-lookup index item.
    pub fn from_lookup_item(namespace: &str, event_type: Option<&str>, item: &Item) -> Result<Self> {
        let value = crate::core::value::get_str(item, SORT_KEY_ATTR)?;
        let window_start = decode_timestamp(value)?;
        if Self::timestamp_for(window_start) != window_start {
            return Err(EventLogError::Serialization(format!(
                "partition value {} is not a window boundary",
                window_start
            )));
        }
        Ok(Self::containing(namespace, window_start, event_type))
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn event_type(&self) -> Option<&str> {
        self.event_type.as_deref()
    }

    pub fn start(&self) -> i64 {
        self.window_start
    }

    /// Exclusive end of the window.
    pub fn end(&self) -> i64 {
        self.window_start + WINDOW_MILLIS
    }

    pub fn covers(&self, timestamp: i64) -> bool {
        self.start() <= timestamp && timestamp < self.end()
    }

    /// Canonical partition key: `namespace,windowStart[,type]`.
    pub fn id(&self) -> String {
        let mut id = format!(
            "{}{}{}",
            self.namespace,
            KEY_DELIMITER,
            encode_timestamp(self.window_start)
        );
        if let Some(event_type) = &self.event_type {
            id.push(KEY_DELIMITER);
            id.push_str(event_type);
        }
        id
    }
}

impl fmt::Display for TimePartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}
