//! In-memory `TransactionalStorage`: the three mock stores wired together.
//!
//! Nothing here is atomic — writes happen one after another — but since all
//! state lives in this process's memory there's nothing a crash between them
//! could leave inconsistent for an external reader to observe.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{NewOutboxEvent, Order, OutboxEvent, Saga};
use crate::storage::{OrderStore, OutboxStore, Result, SagaStore, TransactionalStorage};

use super::{MockOrderStore, MockOutboxStore, MockSagaStore};

#[derive(Default)]
pub struct MockStorage {
    orders: MockOrderStore,
    sagas: MockSagaStore,
    outbox: MockOutboxStore,
}

impl MockStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn orders(&self) -> &MockOrderStore {
        &self.orders
    }

    pub fn sagas(&self) -> &MockSagaStore {
        &self.sagas
    }

    pub fn outbox(&self) -> &MockOutboxStore {
        &self.outbox
    }
}

#[async_trait::async_trait]
impl TransactionalStorage for MockStorage {
    async fn get_order(&self, id: Uuid) -> Result<Order> {
        self.orders.get(id).await
    }

    async fn get_saga(&self, id: Uuid) -> Result<Saga> {
        self.sagas.get(id).await
    }

    async fn get_saga_by_aggregate(&self, aggregate_id: Uuid) -> Result<Option<Saga>> {
        self.sagas.get_by_aggregate(aggregate_id).await
    }

    async fn poll_outbox(&self, limit: u32) -> Result<Vec<OutboxEvent>> {
        self.outbox.poll_batch(limit).await
    }

    async fn mark_outbox_processed(&self, id: Uuid) -> Result<()> {
        self.outbox.mark_processed(id).await
    }

    async fn mark_outbox_retry(&self, id: Uuid, retry_count: u32, next_attempt: DateTime<Utc>, last_error: &str) -> Result<()> {
        self.outbox.mark_retry(id, retry_count, next_attempt, last_error).await
    }

    async fn cleanup_outbox(&self, older_than: DateTime<Utc>) -> Result<u64> {
        self.outbox.cleanup(older_than).await
    }

    async fn list_outbox_for_aggregate(&self, aggregate_id: Uuid) -> Result<Vec<OutboxEvent>> {
        self.outbox.list_by_aggregate(aggregate_id).await
    }

    async fn create_order_with_saga(&self, order: &Order, event: &NewOutboxEvent, saga: &Saga) -> Result<()> {
        self.orders.insert(order).await?;
        self.outbox.append(NewOutboxEvent {
            event_type: event.event_type.clone(),
            aggregate_id: event.aggregate_id,
            aggregate_type: event.aggregate_type.clone(),
            payload: event.payload.clone(),
        }).await;
        self.sagas.insert(saga).await
    }

    async fn apply_saga_step(&self, saga: &Saga, order: Option<&Order>, events: &[NewOutboxEvent]) -> Result<()> {
        self.sagas.update(saga).await?;
        if let Some(order) = order {
            self.orders.update(order).await?;
        }
        for event in events {
            self.outbox.append(NewOutboxEvent {
                event_type: event.event_type.clone(),
                aggregate_id: event.aggregate_id,
                aggregate_type: event.aggregate_type.clone(),
                payload: event.payload.clone(),
            }).await;
        }
        Ok(())
    }

    async fn update_order(&self, order: &Order) -> Result<()> {
        self.orders.update(order).await
    }

    async fn update_order_with_event(&self, order: &Order, event: &NewOutboxEvent) -> Result<()> {
        self.orders.update(order).await?;
        self.outbox.append(NewOutboxEvent {
            event_type: event.event_type.clone(),
            aggregate_id: event.aggregate_id,
            aggregate_type: event.aggregate_type.clone(),
            payload: event.payload.clone(),
        }).await;
        Ok(())
    }
}
