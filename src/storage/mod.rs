pub mod engine;
pub mod memory;
pub mod snapshot;
pub mod table;

pub use engine::{
    BatchGetOutput, BatchGetRequest, BatchWriteOutput, BatchWriteRequest, KeySchema, KvStore,
    MAX_BATCH_GET_KEYS, MAX_BATCH_WRITE_ITEMS, QueryPage, WriteRequest,
};
pub use memory::InMemoryKvStore;
pub use snapshot::{SnapshotManager, StoreSnapshot};
pub use table::Table;
