use crate::connection::ConnectionPool;
use crate::core::{EventLogError, Item, Key, Result};
use crate::query::KeyQuery;
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use tracing::debug;

/// Pages of items in the order the store returned them.
pub type PageStream = BoxStream<'static, Result<Vec<Item>>>;

/// Runs queries through pooled connections.
///
/// Store errors are returned as-is; retrying reads is the store client's job.
#[derive(Clone)]
pub struct QueryExecutor {
    pool: Arc<ConnectionPool>,
}

impl QueryExecutor {
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        Self { pool }
    }

    pub async fn find_one(&self, table: &str, key: &Key) -> Result<Option<Item>> {
        self.pool
            .with_connection(|client| async move { client.get_item(table, key).await })
            .await
    }

    /// Number of items matching `query`, summed over every page.
    pub async fn count(&self, query: &KeyQuery) -> Result<u64> {
        let mut query = query.clone().count_only();
        let mut total = 0u64;
        loop {
            let current = &query;
            let page = self
                .pool
                .with_connection(|client| async move { client.query(current).await })
                .await?;
            total += page.count as u64;
            match page.last_evaluated_key {
                Some(key) => query.exclusive_start_key = Some(key),
                None => break,
            }
        }
        debug!(partition = %query.partition_key_value, total, "count query drained");
        Ok(total)
    }

    /// Lazily follows the pagination token until the store reports no more
    /// pages. Each poll that needs a page costs exactly one round trip, and
    /// dropping the stream stops further requests.
    pub fn find_all(&self, query: KeyQuery) -> PageStream {
        let pool = Arc::clone(&self.pool);
        stream::try_unfold(Some(query), move |state| {
            let pool = Arc::clone(&pool);
            async move {
                let Some(mut query) = state else {
                    return Ok(None);
                };
                let page = {
                    let conn = pool.get_connection().await?;
                    conn.query(&query).await?
                };
                debug!(
                    table = %query.table,
                    partition = %query.partition_key_value,
                    items = page.items.len(),
                    more = page.last_evaluated_key.is_some(),
                    "query page"
                );
                let next = page.last_evaluated_key.map(|key| {
                    query.exclusive_start_key = Some(key);
                    query
                });
                Ok::<_, EventLogError>(Some((page.items, next)))
            }
        })
        .boxed()
    }

    /// Drains [`find_all`](Self::find_all) into a single vector.
    pub async fn collect_all(&self, query: KeyQuery) -> Result<Vec<Item>> {
        let mut pages = self.find_all(query);
        let mut items = Vec::new();
        while let Some(page) = pages.next().await {
            items.extend(page?);
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::item;
    use crate::storage::{BatchWriteRequest, InMemoryKvStore, KeySchema, KvStore, WriteRequest};
    use crate::query::SortKeyCondition;

    async fn executor_with_items(page_size: usize, count: usize) -> QueryExecutor {
        let store = InMemoryKvStore::new().with_page_size(page_size);
        store.create_table("idx", KeySchema::composite("n", "v")).await.unwrap();
        let puts = (0..count)
            .map(|i| WriteRequest::Put(item([("n", "p".to_string()), ("v", format!("{:03}", i))])))
            .collect::<Vec<_>>();
        for chunk in puts.chunks(20) {
            let request = BatchWriteRequest::from([("idx".to_string(), chunk.to_vec())]);
            store.batch_write(request).await.unwrap();
        }
        let pool = ConnectionPool::shared(Arc::new(store), 2, None).unwrap();
        QueryExecutor::new(Arc::new(pool))
    }

    #[tokio::test]
    async fn test_find_all_follows_pagination() {
        let executor = executor_with_items(3, 10).await;
        let pages: Vec<Vec<Item>> = executor
            .find_all(KeyQuery::new("idx", "n", "p").sort_key("v", None))
            .map(|page| page.unwrap())
            .collect()
            .await;

        assert_eq!(pages.len(), 4);
        let values: Vec<String> = pages.iter().flatten().map(|i| i["v"].to_string()).collect();
        let expected: Vec<String> = (0..10).map(|i| format!("{:03}", i)).collect();
        assert_eq!(values, expected);
    }

    #[tokio::test]
    async fn test_count_sums_pages() {
        let executor = executor_with_items(4, 10).await;
        let query = KeyQuery::new("idx", "n", "p").sort_key(
            "v",
            Some(SortKeyCondition::Between("002".into(), "008".into())),
        );
        assert_eq!(executor.count(&query).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_find_one_absent_is_none() {
        let executor = executor_with_items(4, 1).await;
        let key = item([("n", "p"), ("v", "999")]);
        assert!(executor.find_one("idx", &key).await.unwrap().is_none());
        let key = item([("n", "p"), ("v", "000")]);
        assert!(executor.find_one("idx", &key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_store_errors_propagate() {
        let executor = executor_with_items(4, 1).await;
        let result = executor.collect_all(KeyQuery::new("missing", "n", "p")).await;
        assert!(matches!(result, Err(crate::core::EventLogError::Store(_))));
    }
}
