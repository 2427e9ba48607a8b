use super::options::ReadOptions;
use super::scan::{EventScan, EventStream};
use crate::connection::{ClientFactory, ConnectionPool, EventLogConfig, PoolStats};
use crate::core::value::get_str;
use crate::core::{EventLogError, Result};
use crate::event::index::{IndexRecord, SORT_KEY_ATTR, primary_key};
use crate::event::partition::MAX_TIMESTAMP;
use crate::event::{Event, TimePartition, validate_key_component};
use crate::query::{EventFetcher, EventQueryBuilder, Order, PartitionQueryBuilder, QueryExecutor};
use crate::storage::{BatchWriteRequest, KvStore, WriteRequest};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Event log of one namespace.
///
/// Cheap to clone; clones share the connection pool.
///
/// ```ignore
/// let db = Database::with_store(EventLogConfig::new("shop"), store)?;
/// let event = db.publish("order_placed", &json!({"order": 17})).await?;
///
/// let mut events = db.find_events_by_type("order_placed", from, to, ReadOptions::new()).await?;
/// while let Some(event) = events.next().await {
///     println!("{}", event?.payload());
/// }
/// ```
#[derive(Clone)]
pub struct Database {
    config: Arc<EventLogConfig>,
    events_table: String,
    index_table: String,
    pool: Arc<ConnectionPool>,
    executor: QueryExecutor,
    fetcher: EventFetcher,
}

impl Database {
    pub fn new(config: EventLogConfig, pool: Arc<ConnectionPool>) -> Result<Self> {
        config.validate()?;
        let events_table = config.events_table();
        let index_table = config.index_table();
        let fetcher = EventFetcher::new(&events_table, Arc::clone(&pool), config.fetch_retry.clone())
            .with_workers(config.effective_fetch_workers());

        Ok(Self {
            executor: QueryExecutor::new(Arc::clone(&pool)),
            fetcher,
            events_table,
            index_table,
            pool,
            config: Arc::new(config),
        })
    }

    /// Builds `config.pool_size` store clients through `factory`.
    pub fn connect<F: ClientFactory + ?Sized>(config: EventLogConfig, factory: &F) -> Result<Self> {
        let pool = ConnectionPool::new(&config, factory)?;
        Self::new(config, Arc::new(pool))
    }

    /// Pools `config.pool_size` handles of one shared client.
    pub fn with_store(config: EventLogConfig, store: Arc<dyn KvStore>) -> Result<Self> {
        config.validate()?;
        let pool = ConnectionPool::shared(store, config.pool_size, config.acquire_timeout_duration())?;
        Self::new(config, Arc::new(pool))
    }

    pub fn namespace(&self) -> &str {
        &self.config.namespace
    }

    pub fn config(&self) -> &EventLogConfig {
        &self.config
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Publishes an event stamped with the current time.
    pub async fn publish<T: Serialize + ?Sized>(&self, event_type: &str, payload: &T) -> Result<Event> {
        self.publish_at(event_type, payload, Utc::now()).await
    }

    pub async fn publish_at<T: Serialize + ?Sized>(
        &self,
        event_type: &str,
        payload: &T,
        date: DateTime<Utc>,
    ) -> Result<Event> {
        let event = Event::from_value(event_type, payload, date.timestamp_millis())?;
        self.publish_event(event).await
    }

    /// Writes the primary record and all index records of `event` in one
    /// batch, resubmitting whatever the store leaves unprocessed.
    ///
    /// Publishing an event with a known uuid again rewrites the same records.
    /// Fails with [`EventLogError::WriteNotDurable`] once the write retry
    /// policy is exhausted; the event may then be partially indexed.
    pub async fn publish_event(&self, event: Event) -> Result<Event> {
        let index_writes = IndexRecord::for_event(self.namespace(), &event)
            .into_iter()
            .map(|record| WriteRequest::Put(record.into_item()))
            .collect();
        let mut pending = BatchWriteRequest::from([
            (self.events_table.clone(), vec![WriteRequest::Put(event.as_record())]),
            (self.index_table.clone(), index_writes),
        ]);

        let policy = &self.config.write_retry;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let output = {
                let conn = self.pool.get_connection().await?;
                conn.batch_write(pending).await?
            };

            let unprocessed = output.unprocessed_count();
            if unprocessed == 0 {
                info!(
                    namespace = %self.namespace(),
                    event_type = %event.event_type(),
                    uuid = %event.uuid(),
                    attempts = attempt,
                    "event published"
                );
                return Ok(event);
            }
            if attempt >= policy.max_attempts {
                return Err(EventLogError::WriteNotDurable {
                    event_id: event.uuid(),
                    unprocessed,
                    attempts: attempt,
                });
            }

            let delay = policy.backoff(attempt);
            warn!(
                uuid = %event.uuid(),
                unprocessed,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "batch write left items unprocessed; retrying"
            );
            tokio::time::sleep(delay).await;
            pending = output.unprocessed;
        }
    }

    pub async fn find(&self, uuid: Uuid) -> Result<Option<Event>> {
        self.executor
            .find_one(&self.events_table, &primary_key(uuid))
            .await?
            .map(|record| Event::from_record(&record))
            .transpose()
    }

    /// Events of every type between `from` and `to` (inclusive, epoch
    /// milliseconds).
    ///
    /// Events come out sorted within each fetched page; across partitions
    /// the order follows the partition order.
    pub async fn find_events(&self, from: i64, to: i64, options: ReadOptions) -> Result<EventStream> {
        self.scan(None, from, to, options).await
    }

    pub async fn find_events_by_type(
        &self,
        event_type: &str,
        from: i64,
        to: i64,
        options: ReadOptions,
    ) -> Result<EventStream> {
        validate_key_component("event type", event_type)?;
        self.scan(Some(event_type), from, to, options).await
    }

    pub async fn count_events(&self, from: i64, to: i64) -> Result<u64> {
        self.count(None, from, to).await
    }

    pub async fn count_events_by_type(&self, event_type: &str, from: i64, to: i64) -> Result<u64> {
        validate_key_component("event type", event_type)?;
        self.count(Some(event_type), from, to).await
    }

    /// Every event type ever published in this namespace, in lexical order.
    pub async fn list_event_types(&self) -> Result<Vec<String>> {
        let query = PartitionQueryBuilder::new(self.namespace(), &self.index_table).event_types();
        self.executor
            .collect_all(query)
            .await?
            .iter()
            .map(|item| get_str(item, SORT_KEY_ATTR).map(str::to_string))
            .collect()
    }

    /// Partitions touched between `from` and `to`, oldest first, either
    /// namespace-wide or for one event type.
    pub async fn find_partitions(
        &self,
        event_type: Option<&str>,
        from: i64,
        to: i64,
    ) -> Result<Vec<TimePartition>> {
        if let Some(event_type) = event_type {
            validate_key_component("event type", event_type)?;
        }
        // Nothing can be stored outside [0, MAX_TIMESTAMP].
        if from > to || to < 0 || from > MAX_TIMESTAMP {
            return Ok(Vec::new());
        }
        let query = PartitionQueryBuilder::new(self.namespace(), &self.index_table)
            .build(event_type, from, to);
        let partitions = self
            .executor
            .collect_all(query)
            .await?
            .iter()
            .map(|item| TimePartition::from_lookup_item(self.namespace(), event_type, item))
            .collect::<Result<Vec<_>>>()?;
        debug!(
            namespace = %self.namespace(),
            event_type = event_type.unwrap_or("*"),
            partitions = partitions.len(),
            "partition lookup"
        );
        Ok(partitions)
    }

    async fn scan(
        &self,
        event_type: Option<&str>,
        from: i64,
        to: i64,
        options: ReadOptions,
    ) -> Result<EventStream> {
        if from > to || options.limit == Some(0) {
            return Ok(stream::empty().boxed());
        }

        let mut partitions = self.find_partitions(event_type, from, to).await?;
        let descending = options.order == Order::Desc;
        if descending {
            partitions.reverse();
        }

        let cursor = options.exclusive_start.as_ref();
        let queries = partitions
            .iter()
            .filter(|partition| match cursor {
                Some(cursor) if descending => partition.start() <= cursor.window_start(),
                Some(cursor) => partition.start() >= cursor.window_start(),
                None => true,
            })
            .map(|partition| {
                let query = EventQueryBuilder::new(partition, &self.index_table).build(
                    from,
                    to,
                    options.order,
                    None,
                );
                match cursor {
                    Some(cursor) if partition.start() == cursor.window_start() => {
                        query.starting_after(cursor.start_key(partition))
                    }
                    _ => query,
                }
            })
            .collect();

        Ok(EventScan::new(
            self.executor.clone(),
            self.fetcher.clone(),
            queries,
            options.limit,
            descending,
        )
        .into_stream())
    }

    async fn count(&self, event_type: Option<&str>, from: i64, to: i64) -> Result<u64> {
        let mut total = 0u64;
        for partition in self.find_partitions(event_type, from, to).await? {
            let query = EventQueryBuilder::new(&partition, &self.index_table).count(from, to);
            total += self.executor.count(&query).await?;
        }
        Ok(total)
    }
}
