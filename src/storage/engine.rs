use crate::core::{Item, Key, Result};
use crate::query::KeyQuery;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Maximum number of keys a single batch get may carry.
pub const MAX_BATCH_GET_KEYS: usize = 100;

/// Maximum number of items a single batch write may carry.
pub const MAX_BATCH_WRITE_ITEMS: usize = 25;

/// Key layout of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySchema {
    pub partition_key: String,
    pub sort_key: Option<String>,
}

impl KeySchema {
    pub fn partition(partition_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key: None,
        }
    }

    pub fn composite(partition_key: impl Into<String>, sort_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key: Some(sort_key.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteRequest {
    Put(Item),
}

/// Table name to the writes destined for it.
pub type BatchWriteRequest = BTreeMap<String, Vec<WriteRequest>>;

/// Table name to the keys to read from it.
pub type BatchGetRequest = BTreeMap<String, Vec<Key>>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchWriteOutput {
    /// Writes the store did not apply; the caller must resubmit them.
    pub unprocessed: BatchWriteRequest,
}

impl BatchWriteOutput {
    pub fn unprocessed_count(&self) -> usize {
        self.unprocessed.values().map(Vec::len).sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchGetOutput {
    pub responses: BTreeMap<String, Vec<Item>>,
    /// Keys the store did not read this time; not an error.
    pub unprocessed_keys: BatchGetRequest,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryPage {
    pub items: Vec<Item>,
    /// Matching items on this page; equals `items.len()` unless the query
    /// asked for a count only.
    pub count: usize,
    /// Present when more pages may follow.
    pub last_evaluated_key: Option<Key>,
}

/// The key-value store the event log is built on.
///
/// Only point lookups, batched puts, batched gets and range queries inside one
/// partition key are required. Implementations report partially applied
/// batches through the `unprocessed` fields rather than as errors.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get_item(&self, table: &str, key: &Key) -> Result<Option<Item>>;

    async fn batch_write(&self, request: BatchWriteRequest) -> Result<BatchWriteOutput>;

    async fn query(&self, query: &KeyQuery) -> Result<QueryPage>;

    async fn batch_get(&self, request: BatchGetRequest) -> Result<BatchGetOutput>;
}
