//! Mock `OutboxStore` for testing, plus an `append` helper the in-memory
//! equivalent of `Storage::create_order_with_saga`/`apply_saga_step` call
//! instead of a real transaction (there's nothing to roll back in memory).

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{NewOutboxEvent, OutboxEvent};
use crate::storage::{OutboxStore, Result};

#[derive(Default)]
pub struct MockOutboxStore {
    events: RwLock<HashMap<Uuid, OutboxEvent>>,
}

impl MockOutboxStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn append(&self, new: NewOutboxEvent) -> OutboxEvent {
        let event = OutboxEvent::from_new(new);
        self.events.write().await.insert(event.id, event.clone());
        event
    }
}

#[async_trait]
impl OutboxStore for MockOutboxStore {
    async fn poll_batch(&self, limit: u32) -> Result<Vec<OutboxEvent>> {
        let now = Utc::now();
        let mut due: Vec<OutboxEvent> = self
            .events
            .read()
            .await
            .values()
            .filter(|e| !e.processed && e.next_attempt.map(|at| at <= now).unwrap_or(true))
            .cloned()
            .collect();
        due.sort_by_key(|e| e.created_at);
        due.truncate(limit as usize);
        Ok(due)
    }

    async fn mark_processed(&self, id: Uuid) -> Result<()> {
        if let Some(event) = self.events.write().await.get_mut(&id) {
            event.mark_processed();
        }
        Ok(())
    }

    async fn mark_retry(&self, id: Uuid, retry_count: u32, next_attempt: DateTime<Utc>, last_error: &str) -> Result<()> {
        if let Some(event) = self.events.write().await.get_mut(&id) {
            event.retry_count = retry_count;
            event.next_attempt = Some(next_attempt);
            event.last_error = Some(last_error.to_string());
        }
        Ok(())
    }

    async fn cleanup(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let mut events = self.events.write().await;
        let before = events.len();
        events.retain(|_, e| !(e.processed && e.processed_at.map(|at| at <= older_than).unwrap_or(false)));
        Ok((before - events.len()) as u64)
    }

    async fn list_by_aggregate(&self, aggregate_id: Uuid) -> Result<Vec<OutboxEvent>> {
        let mut events: Vec<OutboxEvent> =
            self.events.read().await.values().filter(|e| e.aggregate_id == aggregate_id).cloned().collect();
        events.sort_by_key(|e| e.created_at);
        Ok(events)
    }
}
