//! Shared helpers for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use eventlog::{
    BatchGetOutput, BatchGetRequest, BatchWriteOutput, BatchWriteRequest, Database, EventLogConfig,
    InMemoryKvStore, Item, Key, KeyQuery, KvStore, QueryPage, Result, RetryPolicy,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub const NAMESPACE: &str = "test";

pub fn config() -> EventLogConfig {
    EventLogConfig::new(NAMESPACE)
        .pool_size(4)
        .write_retry(RetryPolicy::new(5, 1, 4))
        .fetch_retry(RetryPolicy::new(5, 1, 4))
}

pub async fn memory_store(config: &EventLogConfig, page_size: usize) -> InMemoryKvStore {
    let store = InMemoryKvStore::new().with_page_size(page_size);
    store.provision(config).await.unwrap();
    store
}

pub async fn database() -> Database {
    let config = config();
    let store = memory_store(&config, 1_000).await;
    Database::with_store(config, Arc::new(store)).unwrap()
}

/// Wraps a store and injects partial batch results.
///
/// While flaky, each batch call applies only the first half of its items and
/// reports the rest as unprocessed. In stuck mode nothing ever completes.
pub struct FlakyStore {
    inner: Arc<dyn KvStore>,
    flaky_writes: AtomicUsize,
    flaky_gets: AtomicUsize,
    stuck: AtomicBool,
    write_calls: AtomicUsize,
    get_calls: AtomicUsize,
    query_calls: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: Arc<dyn KvStore>) -> Self {
        Self {
            inner,
            flaky_writes: AtomicUsize::new(0),
            flaky_gets: AtomicUsize::new(0),
            stuck: AtomicBool::new(false),
            write_calls: AtomicUsize::new(0),
            get_calls: AtomicUsize::new(0),
            query_calls: AtomicUsize::new(0),
        }
    }

    /// The next `calls` batch writes are only half applied.
    pub fn flaky_writes(self, calls: usize) -> Self {
        self.flaky_writes.store(calls, Ordering::SeqCst);
        self
    }

    /// The next `calls` batch gets only read half their keys.
    pub fn flaky_gets(self, calls: usize) -> Self {
        self.flaky_gets.store(calls, Ordering::SeqCst);
        self
    }

    /// Every batch call leaves at least one item unprocessed.
    pub fn stuck(self) -> Self {
        self.stuck.store(true, Ordering::SeqCst);
        self
    }

    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn query_calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }

    /// How many of `total` items this call should apply.
    fn processed_share(&self, budget: &AtomicUsize, total: usize) -> usize {
        if self.stuck.load(Ordering::SeqCst) {
            return total.saturating_sub(1);
        }
        let flaky = budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if flaky { total / 2 } else { total }
    }
}

/// Splits a batch into the first `keep` entries and the rest, table by table
/// in key order.
fn split<T>(request: BTreeMap<String, Vec<T>>, keep: usize) -> (BTreeMap<String, Vec<T>>, BTreeMap<String, Vec<T>>) {
    let mut kept = BTreeMap::new();
    let mut rest = BTreeMap::new();
    let mut budget = keep;
    for (table, entries) in request {
        let mut head = Vec::new();
        let mut tail = Vec::new();
        for entry in entries {
            if budget > 0 {
                budget -= 1;
                head.push(entry);
            } else {
                tail.push(entry);
            }
        }
        if !head.is_empty() {
            kept.insert(table.clone(), head);
        }
        if !tail.is_empty() {
            rest.insert(table, tail);
        }
    }
    (kept, rest)
}

#[async_trait]
impl KvStore for FlakyStore {
    async fn get_item(&self, table: &str, key: &Key) -> Result<Option<Item>> {
        self.inner.get_item(table, key).await
    }

    async fn batch_write(&self, request: BatchWriteRequest) -> Result<BatchWriteOutput> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        let total = request.values().map(Vec::len).sum();
        let keep = self.processed_share(&self.flaky_writes, total);
        let (apply, unprocessed) = split(request, keep);
        if !apply.is_empty() {
            self.inner.batch_write(apply).await?;
        }
        Ok(BatchWriteOutput { unprocessed })
    }

    async fn query(&self, query: &KeyQuery) -> Result<QueryPage> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.query(query).await
    }

    async fn batch_get(&self, request: BatchGetRequest) -> Result<BatchGetOutput> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        let total = request.values().map(Vec::len).sum();
        let keep = self.processed_share(&self.flaky_gets, total);
        let (read, unprocessed_keys) = split(request, keep);
        let mut output = if read.is_empty() {
            BatchGetOutput::default()
        } else {
            self.inner.batch_get(read).await?
        };
        output.unprocessed_keys = unprocessed_keys;
        Ok(output)
    }
}
