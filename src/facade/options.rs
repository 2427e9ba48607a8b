use crate::core::{AttributeValue, Key, Result};
use crate::event::index::{PARTITION_KEY_ATTR, SORT_KEY_ATTR};
use crate::event::{Event, SortKey, TimePartition};
use crate::query::Order;
use std::fmt;
use std::str::FromStr;

/// Position strictly after an already-seen event.
///
/// Round-trips through its string form so callers can hand it out as an
/// opaque page token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventCursor {
    position: SortKey,
}

impl EventCursor {
    pub fn after(event: &Event) -> Self {
        Self {
            position: event.sort_key(),
        }
    }

    pub fn position(&self) -> &SortKey {
        &self.position
    }

    pub fn timestamp(&self) -> i64 {
        self.position.timestamp()
    }

    /// Window start of the partition the cursor points into.
    pub(crate) fn window_start(&self) -> i64 {
        TimePartition::timestamp_for(self.position.timestamp())
    }

    /// Store key to resume a membership scan of `partition` from.
    pub(crate) fn start_key(&self, partition: &TimePartition) -> Key {
        let mut key = Key::new();
        key.insert(PARTITION_KEY_ATTR.to_string(), AttributeValue::S(partition.id()));
        key.insert(SORT_KEY_ATTR.to_string(), AttributeValue::S(self.position.encode()));
        key
    }
}

impl fmt::Display for EventCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.position.encode())
    }
}

impl FromStr for EventCursor {
    type Err = crate::core::EventLogError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(Self {
            position: SortKey::parse(s)?,
        })
    }
}

/// Options of `find_events` and `find_events_by_type`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadOptions {
    pub order: Order,
    /// Maximum events across all partitions; `None` reads everything.
    pub limit: Option<usize>,
    pub exclusive_start: Option<EventCursor>,
}

impl ReadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn descending(mut self) -> Self {
        self.order = Order::Desc;
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn after(mut self, cursor: EventCursor) -> Self {
        self.exclusive_start = Some(cursor);
        self
    }
}
