use uuid::Uuid;

use super::*;
use crate::domain::{NewOutboxEvent, OutboxEventType, Saga, SagaType};

#[tokio::test]
async fn order_update_rejects_stale_version() {
    let store = MockOrderStore::new();
    let order = crate::domain::Order::new(
        "customer-1".to_string(),
        "restaurant-1".to_string(),
        vec![crate::domain::LineItem::new(
            "item-1",
            "Burger",
            1,
            crate::domain::Money::from_cents(1000),
        )],
        crate::domain::DeliveryLocation {
            lat: 1.0,
            lng: 1.0,
            address: "1 Main St".to_string(),
            city: None,
            postal_code: None,
        },
        crate::domain::OrderPriority::Normal,
    )
    .unwrap();
    store.insert(&order).await.unwrap();

    // Caller forgot to bump `version` before writing back: rejected.
    let stale = order.clone();
    assert!(store.update(&stale).await.is_err());

    let mut fresh = order.clone();
    fresh.version += 1;
    assert!(store.update(&fresh).await.is_ok());
}

#[tokio::test]
async fn saga_get_by_aggregate_returns_latest() {
    let store = MockSagaStore::new();
    let aggregate_id = Uuid::new_v4();
    let first = Saga::start(SagaType::OrderProcessing, aggregate_id, "Order", serde_json::json!({}), &["A"], 0);
    store.insert(&first).await.unwrap();

    let found = store.get_by_aggregate(aggregate_id).await.unwrap();
    assert_eq!(found.unwrap().id, first.id);
}

#[tokio::test]
async fn outbox_poll_batch_respects_limit_and_order() {
    let store = MockOutboxStore::new();
    for _ in 0..5 {
        store
            .append(NewOutboxEvent::new(
                OutboxEventType::OrderCreated,
                Uuid::new_v4(),
                "Order",
                serde_json::json!({}),
            ))
            .await;
    }
    let batch = store.poll_batch(3).await.unwrap();
    assert_eq!(batch.len(), 3);
}

#[tokio::test]
async fn outbox_mark_processed_excludes_from_poll() {
    let store = MockOutboxStore::new();
    let event = store
        .append(NewOutboxEvent::new(
            OutboxEventType::OrderCreated,
            Uuid::new_v4(),
            "Order",
            serde_json::json!({}),
        ))
        .await;
    store.mark_processed(event.id).await.unwrap();
    let batch = store.poll_batch(10).await.unwrap();
    assert!(batch.is_empty());
}
