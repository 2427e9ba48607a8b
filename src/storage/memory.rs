use super::Table;
use super::engine::{
    BatchGetOutput, BatchGetRequest, BatchWriteOutput, BatchWriteRequest, KeySchema, KvStore,
    MAX_BATCH_GET_KEYS, MAX_BATCH_WRITE_ITEMS, QueryPage, WriteRequest,
};
use super::snapshot::StoreSnapshot;
use crate::connection::EventLogConfig;
use crate::core::{EventLogError, Item, Key, Result};
use crate::event::index::{PARTITION_KEY_ATTR, PRIMARY_KEY_ATTR, SORT_KEY_ATTR};
use crate::query::KeyQuery;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Default number of items returned per query page.
pub const DEFAULT_PAGE_SIZE: usize = 1_000;

/// Process-local [`KvStore`] with the same limits and paging behaviour as the
/// remote store: batch caps, per-partition range queries and continuation
/// keys. Used for development, the CLI and tests.
pub struct InMemoryKvStore {
    /// Tables with individual locks
    tables: RwLock<HashMap<String, Arc<RwLock<Table>>>>,
    page_size: usize,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Caps every query page at `page_size` items.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// A store with the events and index tables of `config` already created.
    pub async fn provisioned(config: &EventLogConfig) -> Result<Self> {
        let store = Self::new();
        store.provision(config).await?;
        Ok(store)
    }

    /// Creates the events and index tables of `config` if they are missing.
    pub async fn provision(&self, config: &EventLogConfig) -> Result<()> {
        let wanted = [
            (config.events_table(), KeySchema::partition(PRIMARY_KEY_ATTR)),
            (
                config.index_table(),
                KeySchema::composite(PARTITION_KEY_ATTR, SORT_KEY_ATTR),
            ),
        ];
        for (name, schema) in wanted {
            if !self.table_exists(&name).await {
                self.create_table(&name, schema).await?;
            }
        }
        Ok(())
    }

    pub async fn create_table(&self, name: &str, schema: KeySchema) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.contains_key(name) {
            return Err(EventLogError::store(format!("table '{}' already exists", name)));
        }
        tables.insert(name.to_string(), Arc::new(RwLock::new(Table::new(schema))));
        Ok(())
    }

    pub async fn table_exists(&self, name: &str) -> bool {
        self.tables.read().await.contains_key(name)
    }

    pub async fn list_tables(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn item_count(&self, table: &str) -> Result<usize> {
        let handle = self.get_table(table).await?;
        let table = handle.read().await;
        Ok(table.item_count())
    }

    /// Copies every table into a snapshot.
    pub async fn snapshot(&self) -> StoreSnapshot {
        let tables = self.tables.read().await;
        let mut copied = HashMap::with_capacity(tables.len());
        for (name, handle) in tables.iter() {
            copied.insert(name.clone(), handle.read().await.clone());
        }
        StoreSnapshot::new(copied)
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let tables = snapshot
            .tables
            .into_iter()
            .map(|(name, table)| (name, Arc::new(RwLock::new(table))))
            .collect();
        Self {
            tables: RwLock::new(tables),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    async fn get_table(&self, name: &str) -> Result<Arc<RwLock<Table>>> {
        self.tables
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| EventLogError::store(format!("table '{}' not found", name)))
    }
}

impl Default for InMemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn get_item(&self, table: &str, key: &Key) -> Result<Option<Item>> {
        let handle = self.get_table(table).await?;
        let table = handle.read().await;
        table.get(key)
    }

    async fn batch_write(&self, request: BatchWriteRequest) -> Result<BatchWriteOutput> {
        let total: usize = request.values().map(Vec::len).sum();
        if total > MAX_BATCH_WRITE_ITEMS {
            return Err(EventLogError::store(format!(
                "batch write of {} items exceeds the limit of {}",
                total, MAX_BATCH_WRITE_ITEMS
            )));
        }

        // Resolve every table first so an unknown table fails the whole batch.
        let mut resolved = Vec::with_capacity(request.len());
        for (name, writes) in request {
            resolved.push((self.get_table(&name).await?, writes));
        }

        for (handle, writes) in resolved {
            let mut table = handle.write().await;
            for write in writes {
                match write {
                    WriteRequest::Put(item) => table.put(item)?,
                }
            }
        }
        Ok(BatchWriteOutput::default())
    }

    async fn query(&self, query: &KeyQuery) -> Result<QueryPage> {
        let handle = self.get_table(&query.table).await?;
        let table = handle.read().await;
        table.query(query, self.page_size)
    }

    async fn batch_get(&self, request: BatchGetRequest) -> Result<BatchGetOutput> {
        let total: usize = request.values().map(Vec::len).sum();
        if total > MAX_BATCH_GET_KEYS {
            return Err(EventLogError::store(format!(
                "batch get of {} keys exceeds the limit of {}",
                total, MAX_BATCH_GET_KEYS
            )));
        }

        let mut output = BatchGetOutput::default();
        for (name, keys) in request {
            let handle = self.get_table(&name).await?;
            let table = handle.read().await;
            let mut found = Vec::with_capacity(keys.len());
            for key in &keys {
                if let Some(item) = table.get(key)? {
                    found.push(item);
                }
            }
            output.responses.insert(name, found);
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::item;

    #[tokio::test]
    async fn test_provisioned_creates_both_tables() {
        let config = EventLogConfig::new("ns").table_prefix("app");
        let store = InMemoryKvStore::provisioned(&config).await.unwrap();
        assert_eq!(store.list_tables().await, vec!["app-events", "app-events-idx"]);

        // provisioning twice is a no-op
        store.provision(&config).await.unwrap();
        assert!(store.create_table("app-events", KeySchema::partition("uuid")).await.is_err());
    }

    #[tokio::test]
    async fn test_batch_limits_enforced() {
        let store = InMemoryKvStore::new();
        store.create_table("t", KeySchema::partition("k")).await.unwrap();

        let puts = (0..=MAX_BATCH_WRITE_ITEMS)
            .map(|i| WriteRequest::Put(item([("k", i.to_string())])))
            .collect();
        let request = BatchWriteRequest::from([("t".to_string(), puts)]);
        assert!(store.batch_write(request).await.is_err());
        assert_eq!(store.item_count("t").await.unwrap(), 0);

        let keys = (0..=MAX_BATCH_GET_KEYS).map(|i| item([("k", i.to_string())])).collect();
        let request = BatchGetRequest::from([("t".to_string(), keys)]);
        assert!(store.batch_get(request).await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_table_fails_whole_batch() {
        let store = InMemoryKvStore::new();
        store.create_table("t", KeySchema::partition("k")).await.unwrap();
        let request = BatchWriteRequest::from([
            ("t".to_string(), vec![WriteRequest::Put(item([("k", "1")]))]),
            ("zzz".to_string(), vec![WriteRequest::Put(item([("k", "1")]))]),
        ]);
        assert!(store.batch_write(request).await.is_err());
        assert_eq!(store.item_count("t").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_batch_get_skips_missing_items() {
        let store = InMemoryKvStore::new();
        store.create_table("t", KeySchema::partition("k")).await.unwrap();
        let request = BatchWriteRequest::from([(
            "t".to_string(),
            vec![WriteRequest::Put(item([("k", "a"), ("x", "1")]))],
        )]);
        store.batch_write(request).await.unwrap();

        let request = BatchGetRequest::from([(
            "t".to_string(),
            vec![item([("k", "a")]), item([("k", "b")])],
        )]);
        let output = store.batch_get(request).await.unwrap();
        assert_eq!(output.responses["t"].len(), 1);
        assert!(output.unprocessed_keys.is_empty());
    }
}
