// ============================================================================
// eventlog
// ============================================================================
//
// Append-only, time-ordered, typed event log on top of a key-value store that
// can only do point lookups and range queries inside one partition key.
//
// Events are bucketed into fixed time windows. Every publish writes the
// primary record plus five index records, so that "events of type T between
// `from` and `to`" becomes a handful of single-partition range scans.

pub mod connection;
pub mod core;
pub mod event;
pub mod facade;
pub mod query;
pub mod storage;

pub use crate::core::{AttributeValue, EventLogError, Item, Key, Result};
pub use connection::{
    ClientFactory, Connection, ConnectionPool, EventLogConfig, PoolGuard, PoolStats, RetryPolicy,
    TransportConfig,
};
pub use event::{Event, IndexKey, SortKey, TimePartition, WINDOW_MILLIS};
pub use facade::{Database, EventCursor, EventStream, ReadOptions};
pub use query::{EventFetcher, KeyQuery, Order, QueryExecutor, SortKeyCondition};
pub use storage::{
    BatchGetOutput, BatchGetRequest, BatchWriteOutput, BatchWriteRequest, InMemoryKvStore,
    KeySchema, KvStore, QueryPage, SnapshotManager, StoreSnapshot, WriteRequest,
};

pub mod prelude {
    pub use crate::{
        Database, Event, EventCursor, EventLogConfig, EventLogError, EventStream, InMemoryKvStore,
        KvStore, Order, ReadOptions, Result,
    };
    pub use futures::{StreamExt, TryStreamExt};
}
