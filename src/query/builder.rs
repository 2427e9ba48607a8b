//! Compiles event-log reads into [`KeyQuery`] descriptors. Pure, no I/O.

use crate::event::index::{EVENT_ID_ATTR, IndexKey, PARTITION_KEY_ATTR, SORT_KEY_ATTR};
use crate::event::partition::{MAX_TIMESTAMP, encode_timestamp};
use crate::event::TimePartition;
use crate::query::{KeyQuery, SortKeyCondition};

/// Scan direction of an event range read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    #[default]
    Asc,
    Desc,
}

impl Order {
    pub fn is_forward(self) -> bool {
        self == Order::Asc
    }
}

/// Builds queries against the namespace-level series of the index table:
/// partition lookup and event-type discovery.
pub struct PartitionQueryBuilder<'a> {
    namespace: &'a str,
    index_table: &'a str,
}

impl<'a> PartitionQueryBuilder<'a> {
    pub fn new(namespace: &'a str, index_table: &'a str) -> Self {
        Self {
            namespace,
            index_table,
        }
    }

    /// Partitions whose window may hold events between `from` and `to`
    /// (inclusive, milliseconds), optionally restricted to one event type.
    pub fn build(&self, event_type: Option<&str>, from: i64, to: i64) -> KeyQuery {
        let key = IndexKey::partitions(self.namespace, event_type);
        let first_window = TimePartition::timestamp_for(from.clamp(0, MAX_TIMESTAMP));
        KeyQuery::new(self.index_table, PARTITION_KEY_ATTR, key.partition_value()).sort_key(
            SORT_KEY_ATTR,
            Some(SortKeyCondition::Between(
                encode_timestamp(first_window),
                encode_timestamp(to.clamp(0, MAX_TIMESTAMP)),
            )),
        )
    }

    pub fn event_types(&self) -> KeyQuery {
        let key = IndexKey::EventTypes {
            namespace: self.namespace.to_string(),
        };
        KeyQuery::new(self.index_table, PARTITION_KEY_ATTR, key.partition_value())
            .sort_key(SORT_KEY_ATTR, None)
            .project([SORT_KEY_ATTR])
    }
}

/// Builds the membership scan of a single partition.
pub struct EventQueryBuilder<'a> {
    partition: &'a TimePartition,
    index_table: &'a str,
}

impl<'a> EventQueryBuilder<'a> {
    pub fn new(partition: &'a TimePartition, index_table: &'a str) -> Self {
        Self {
            partition,
            index_table,
        }
    }

    /// Event ids of the partition between `from` and `to` (inclusive).
    ///
    /// A bound is only applied when it falls inside the partition; otherwise
    /// the partition side is scanned to its edge.
    pub fn build(&self, from: i64, to: i64, order: Order, limit: Option<usize>) -> KeyQuery {
        self.base(from, to)
            .project([SORT_KEY_ATTR, EVENT_ID_ATTR])
            .scan_forward(order.is_forward())
            .limit(limit)
    }

    pub fn count(&self, from: i64, to: i64) -> KeyQuery {
        self.base(from, to).count_only()
    }

    fn base(&self, from: i64, to: i64) -> KeyQuery {
        let lower = self
            .partition
            .covers(from)
            .then(|| encode_timestamp(from));
        // Sort keys are `timestamp,checksum,uuid`, so the bare padded `to + 1`
        // sorts after every key stamped `to` and before every later one.
        let upper = (self.partition.covers(to) && to < MAX_TIMESTAMP)
            .then(|| encode_timestamp(to + 1));

        let condition = match (lower, upper) {
            (Some(lower), Some(upper)) => Some(SortKeyCondition::Between(lower, upper)),
            (Some(lower), None) => Some(SortKeyCondition::GreaterOrEqual(lower)),
            (None, Some(upper)) => Some(SortKeyCondition::LessOrEqual(upper)),
            (None, None) => None,
        };

        KeyQuery::new(self.index_table, PARTITION_KEY_ATTR, self.partition.id())
            .sort_key(SORT_KEY_ATTR, condition)
    }
}
