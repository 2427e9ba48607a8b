//! Concurrent publishers and readers sharing one pool.

mod common;

use common::{config, memory_store};
use eventlog::prelude::*;
use eventlog::{ConnectionPool, EventLogError};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_concurrent_publishers() {
    let config = config().pool_size(2);
    let store = memory_store(&config, 16).await;
    let db = Database::with_store(config, Arc::new(store)).unwrap();

    let mut handles = vec![];
    for task_id in 0..8 {
        let db = db.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..10 {
                db.publish(&format!("task_{}", task_id), &json!({ "i": i }))
                    .await
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let stats = db.pool_stats();
    assert_eq!(stats.in_use, 0);
    assert_eq!(stats.available, 2);
    assert_eq!(db.list_event_types().await.unwrap().len(), 8);
    assert_eq!(db.count_events(0, i64::MAX).await.unwrap(), 80);
}

#[tokio::test]
async fn test_concurrent_readers_see_the_same_events() {
    let db = common::database().await;
    for i in 0..50 {
        db.publish("tick", &json!({ "i": i })).await.unwrap();
    }

    let mut handles = vec![];
    for _ in 0..6 {
        let db = db.clone();
        handles.push(tokio::spawn(async move {
            let events: Vec<Event> = db
                .find_events(0, i64::MAX, ReadOptions::new())
                .await
                .unwrap()
                .try_collect()
                .await
                .unwrap();
            events.iter().map(Event::uuid).collect::<Vec<_>>()
        }));
    }

    let mut results = vec![];
    for handle in handles {
        results.push(handle.await.unwrap());
    }
    assert_eq!(results[0].len(), 50);
    assert!(results.iter().all(|r| r == &results[0]));
}

#[tokio::test]
async fn test_pool_timeout_surfaces_as_error() {
    let config = config();
    let store: Arc<dyn KvStore> = Arc::new(memory_store(&config, 100).await);
    let pool = Arc::new(ConnectionPool::shared(store, 1, Some(Duration::from_millis(10))).unwrap());
    let db = Database::new(config, pool.clone()).unwrap();

    let held = pool.get_connection().await.unwrap();
    let err = db.publish("tick", &json!({})).await.unwrap_err();
    assert!(matches!(err, EventLogError::PoolTimeout(_)));

    drop(held);
    assert!(db.publish("tick", &json!({})).await.is_ok());
}
