use crate::connection::{ConnectionPool, RetryPolicy};
use crate::core::{EventLogError, Key, Result};
use crate::event::Event;
use crate::event::index::primary_key;
use crate::storage::{BatchGetRequest, MAX_BATCH_GET_KEYS};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};
use uuid::Uuid;

/// Resolves event ids to full events with concurrent batch gets.
///
/// Ids are split into chunks the store accepts in one request and each chunk
/// runs on its own task. At most `workers` chunks are in flight at a time.
#[derive(Clone)]
pub struct EventFetcher {
    table: String,
    pool: Arc<ConnectionPool>,
    retry: RetryPolicy,
    workers: usize,
}

impl EventFetcher {
    /// Runs as many workers as the pool has handles.
    pub fn new(table: impl Into<String>, pool: Arc<ConnectionPool>, retry: RetryPolicy) -> Self {
        let workers = pool.size();
        Self {
            table: table.into(),
            pool,
            retry,
            workers,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Fetches the events behind `ids`, sorted by timestamp, then checksum,
    /// then uuid. Ids without a primary record are skipped; duplicates are
    /// fetched once.
    ///
    /// Every chunk task runs to completion. If any failed, the first failure
    /// is returned as [`EventLogError::FetchFailed`] together with every event
    /// resolved before the failures.
    pub async fn batch_get_events(&self, ids: &[Uuid]) -> Result<Vec<Event>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut seen = HashSet::with_capacity(ids.len());
        let keys: Vec<Key> = ids
            .iter()
            .filter(|id| seen.insert(**id))
            .map(|id| primary_key(*id))
            .collect();

        let permits = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();
        for chunk in keys.chunks(MAX_BATCH_GET_KEYS) {
            let chunk = chunk.to_vec();
            let permits = Arc::clone(&permits);
            let pool = Arc::clone(&self.pool);
            let table = self.table.clone();
            let retry = self.retry.clone();
            tasks.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return (Vec::new(), Some(EventLogError::Execution("fetch semaphore closed".into())));
                };
                let mut events = Vec::with_capacity(chunk.len());
                let result = fetch_chunk(&pool, &table, chunk, &retry, &mut events).await;
                (events, result.err())
            });
        }

        let mut events = Vec::with_capacity(keys.len());
        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            let error = match joined {
                Ok((chunk, error)) => {
                    events.extend(chunk);
                    error
                }
                Err(join_error) => Some(EventLogError::from(join_error)),
            };
            if first_error.is_none() {
                first_error = error;
            }
        }

        events.sort_by(|a, b| {
            (a.timestamp(), a.checksum(), a.uuid()).cmp(&(b.timestamp(), b.checksum(), b.uuid()))
        });

        if let Some(source) = first_error {
            return Err(EventLogError::FetchFailed {
                requested: keys.len(),
                partial: events,
                source: Box::new(source),
            });
        }

        if events.len() < keys.len() {
            debug!(
                requested = keys.len(),
                resolved = events.len(),
                "some referenced events have no primary record"
            );
        }
        Ok(events)
    }
}

/// Batch-gets one chunk into `events`, re-requesting exactly the unprocessed
/// keys until none remain or the retry policy is exhausted. Events resolved
/// before a failure stay in `events`.
async fn fetch_chunk(
    pool: &ConnectionPool,
    table: &str,
    keys: Vec<Key>,
    retry: &RetryPolicy,
    events: &mut Vec<Event>,
) -> Result<()> {
    let mut pending = keys;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let mut output = {
            let conn = pool.get_connection().await?;
            conn.batch_get(BatchGetRequest::from([(table.to_string(), pending)]))
                .await?
        };

        for record in output.responses.remove(table).unwrap_or_default() {
            events.push(Event::from_record(&record)?);
        }

        pending = output.unprocessed_keys.remove(table).unwrap_or_default();
        if pending.is_empty() {
            return Ok(());
        }
        if attempt >= retry.max_attempts {
            return Err(EventLogError::UnprocessedKeys {
                remaining: pending.len(),
                attempts: attempt,
            });
        }

        let delay = retry.backoff(attempt);
        warn!(
            table,
            unprocessed = pending.len(),
            attempt,
            delay_ms = delay.as_millis() as u64,
            "batch get left keys unprocessed; retrying"
        );
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{
        BatchWriteRequest, InMemoryKvStore, KeySchema, KvStore, WriteRequest,
    };
    use serde_json::json;

    async fn seeded(count: usize) -> (Arc<ConnectionPool>, Vec<Event>) {
        let store = InMemoryKvStore::new();
        store.create_table("events", KeySchema::partition("uuid")).await.unwrap();
        let events: Vec<Event> = (0..count)
            .map(|i| Event::new("tick", json!({ "i": i }), 1_000 + (count - i) as i64).unwrap())
            .collect();
        for chunk in events.chunks(25) {
            let puts = chunk.iter().map(|e| WriteRequest::Put(e.as_record())).collect();
            store
                .batch_write(BatchWriteRequest::from([("events".to_string(), puts)]))
                .await
                .unwrap();
        }
        let pool = ConnectionPool::shared(Arc::new(store), 4, None).unwrap();
        (Arc::new(pool), events)
    }

    #[tokio::test]
    async fn test_resolves_more_than_one_chunk_in_timestamp_order() {
        let (pool, events) = seeded(250).await;
        let ids: Vec<Uuid> = events.iter().map(Event::uuid).collect();
        let fetcher = EventFetcher::new("events", pool, RetryPolicy::immediate(3));

        let fetched = fetcher.batch_get_events(&ids).await.unwrap();
        assert_eq!(fetched.len(), 250);
        assert!(fetched.windows(2).all(|w| w[0].timestamp() <= w[1].timestamp()));
    }

    #[tokio::test]
    async fn test_missing_and_duplicate_ids() {
        let (pool, events) = seeded(3).await;
        let ids = vec![events[0].uuid(), Uuid::new_v4(), events[0].uuid()];
        let fetcher = EventFetcher::new("events", pool, RetryPolicy::immediate(3)).with_workers(1);

        let fetched = fetcher.batch_get_events(&ids).await.unwrap();
        assert_eq!(fetched, vec![events[0].clone()]);
        assert!(fetcher.batch_get_events(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_reported_as_fetch_failed() {
        let (pool, events) = seeded(2).await;
        let ids: Vec<Uuid> = events.iter().map(Event::uuid).collect();
        let fetcher = EventFetcher::new("no-such-table", pool, RetryPolicy::immediate(3));

        match fetcher.batch_get_events(&ids).await {
            Err(EventLogError::FetchFailed { requested, partial, source }) => {
                assert_eq!(requested, 2);
                assert!(partial.is_empty());
                assert!(matches!(*source, EventLogError::Store(_)));
            }
            other => panic!("expected FetchFailed, got {:?}", other.map(|e| e.len())),
        }
    }
}
