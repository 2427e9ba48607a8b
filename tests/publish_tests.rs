//! Publish path: index records, lookup by id, write retries.

mod common;

use chrono::{DateTime, Utc};
use common::{FlakyStore, NAMESPACE, config, database, memory_store};
use eventlog::prelude::*;
use eventlog::{EventLogError, RetryPolicy};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

fn at(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap()
}

#[tokio::test]
async fn test_publish_then_find_by_id() {
    let db = database().await;
    let event = db.publish("login", &json!({"user": "alice", "ok": true})).await.unwrap();

    let found = db.find(event.uuid()).await.unwrap().expect("event should exist");
    assert_eq!(found.uuid(), event.uuid());
    assert_eq!(found.event_type(), "login");
    assert_eq!(found.payload(), &json!({"user": "alice", "ok": true}));
    assert_eq!(found.checksum(), event.checksum());
}

#[tokio::test]
async fn test_published_event_is_found_by_type_around_its_timestamp() {
    let db = database().await;
    let event = db.publish("login", &json!({"user": "bob"})).await.unwrap();
    let t = event.timestamp();

    let events: Vec<Event> = db
        .find_events_by_type("login", t - 1, t + 1, ReadOptions::new())
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert!(events.iter().any(|e| e.uuid() == event.uuid()));

    let other: Vec<Event> = db
        .find_events_by_type("logout", t - 1, t + 1, ReadOptions::new())
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert!(other.is_empty());
}

#[tokio::test]
async fn test_range_edges_are_inclusive() {
    let db = database().await;
    for ts in [100, 200, 300] {
        db.publish_at("tick", &json!({ "ts": ts }), at(ts)).await.unwrap();
    }

    let got: Vec<i64> = db
        .find_events(100, 200, ReadOptions::new())
        .await
        .unwrap()
        .map_ok(|e| e.timestamp())
        .try_collect()
        .await
        .unwrap();
    assert_eq!(got, vec![100, 200]);
    assert_eq!(db.count_events(100, 200).await.unwrap(), 2);
    assert_eq!(db.count_events(201, 299).await.unwrap(), 0);
}

#[derive(Serialize)]
struct OrderPlaced {
    order_id: u64,
    total_cents: i64,
}

#[tokio::test]
async fn test_publish_typed_payload() {
    let db = database().await;
    let event = db
        .publish("order_placed", &OrderPlaced { order_id: 7, total_cents: 1299 })
        .await
        .unwrap();
    let found = db.find(event.uuid()).await.unwrap().unwrap();
    assert_eq!(found.payload()["order_id"], json!(7));
    assert_eq!(db.list_event_types().await.unwrap(), vec!["order_placed"]);
}

#[tokio::test]
async fn test_replay_with_same_uuid_is_idempotent() {
    let db = database().await;
    let event = Event::content_addressed(NAMESPACE, "signup", json!({"user": "c"}), 5_000).unwrap();
    let again = Event::content_addressed(NAMESPACE, "signup", json!({"user": "c"}), 5_000).unwrap();
    assert_eq!(event.uuid(), again.uuid());

    db.publish_event(event.clone()).await.unwrap();
    db.publish_event(again).await.unwrap();

    assert_eq!(db.count_events(0, 10_000).await.unwrap(), 1);
    assert_eq!(db.count_events_by_type("signup", 0, 10_000).await.unwrap(), 1);
}

#[tokio::test]
async fn test_invalid_input_fails_before_any_write() {
    let config = config();
    let inner = memory_store(&config, 1_000).await;
    let store = Arc::new(FlakyStore::new(Arc::new(inner)));
    let db = Database::with_store(config, store.clone()).unwrap();

    let err = db.publish("bad,type", &json!({})).await.unwrap_err();
    assert!(matches!(err, EventLogError::Validation(_)));

    let err = db.publish_at("tick", &json!({}), at(-1)).await.unwrap_err();
    assert!(err.is_validation());

    assert_eq!(store.write_calls(), 0);
}

#[tokio::test]
async fn test_publish_converges_on_unprocessed_items() {
    let config = config();
    let inner = Arc::new(memory_store(&config, 1_000).await);
    let store = Arc::new(FlakyStore::new(inner.clone()).flaky_writes(2));
    let db = Database::with_store(config.clone(), store.clone()).unwrap();

    let event = db.publish_at("login", &json!({"user": "d"}), at(1_000)).await.unwrap();

    // 6 items: 3 applied, then 1 of the remaining 3, then the last 2.
    assert_eq!(store.write_calls(), 3);
    assert_eq!(inner.item_count(&config.events_table()).await.unwrap(), 1);
    assert_eq!(inner.item_count(&config.index_table()).await.unwrap(), 5);
    assert!(db.find(event.uuid()).await.unwrap().is_some());
    assert_eq!(db.count_events_by_type("login", 0, 2_000).await.unwrap(), 1);
}

#[tokio::test]
async fn test_publish_gives_up_with_write_not_durable() {
    let config = config().write_retry(RetryPolicy::immediate(3));
    let inner = memory_store(&config, 1_000).await;
    let store = Arc::new(FlakyStore::new(Arc::new(inner)).stuck());
    let db = Database::with_store(config, store.clone()).unwrap();

    match db.publish("login", &json!({})).await {
        Err(EventLogError::WriteNotDurable { unprocessed, attempts, .. }) => {
            assert_eq!(attempts, 3);
            assert_eq!(unprocessed, 1);
        }
        other => panic!("expected WriteNotDurable, got {:?}", other),
    }
    assert_eq!(store.write_calls(), 3);
}
