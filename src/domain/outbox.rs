//! OutboxEvent — durable record of a domain fact (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Closed registry of event types this service can emit (spec §3 invariant:
/// "event type (string from a closed registry)"). The relay's topic mapping
/// (§4.6) switches on the family prefix of these values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboxEventType {
    OrderCreated,
    OrderConfirmed,
    OrderConfirmationReverted,
    SendOrderConfirmation,
    NotifyRestaurantOrderConfirmed,
    SagaStarted,
    SagaCompleted,
    OrderCancelled,
}

impl OutboxEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxEventType::OrderCreated => "ORDER_CREATED",
            OutboxEventType::OrderConfirmed => "ORDER_CONFIRMED",
            OutboxEventType::OrderConfirmationReverted => "ORDER_CONFIRMATION_REVERTED",
            OutboxEventType::SendOrderConfirmation => "SEND_ORDER_CONFIRMATION",
            OutboxEventType::NotifyRestaurantOrderConfirmed => "NOTIFY_RESTAURANT_ORDER_CONFIRMED",
            OutboxEventType::SagaStarted => "SAGA_STARTED",
            OutboxEventType::SagaCompleted => "SAGA_COMPLETED",
            OutboxEventType::OrderCancelled => "ORDER_CANCELLED",
        }
    }
}

impl std::fmt::Display for OutboxEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A durable record appended in the same transaction as the business write
/// that produced it (spec §3, §4.5). Immutable once `processed = true`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxEvent {
    pub id: Uuid,
    pub event_type: String,
    pub aggregate_id: Uuid,
    pub aggregate_type: String,
    pub payload: serde_json::Value,
    pub processed: bool,
    pub processed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub retry_count: u32,
    pub next_attempt: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Fields needed to append a new outbox event (spec §4.5 `appendEvent`).
pub struct NewOutboxEvent {
    pub event_type: String,
    pub aggregate_id: Uuid,
    pub aggregate_type: String,
    pub payload: serde_json::Value,
}

impl NewOutboxEvent {
    pub fn new(
        event_type: OutboxEventType,
        aggregate_id: Uuid,
        aggregate_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_type: event_type.as_str().to_string(),
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            payload,
        }
    }
}

impl OutboxEvent {
    pub fn from_new(new: NewOutboxEvent) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            event_type: new.event_type,
            aggregate_id: new.aggregate_id,
            aggregate_type: new.aggregate_type,
            payload: new.payload,
            processed: false,
            processed_at: None,
            last_error: None,
            retry_count: 0,
            next_attempt: None,
            created_at: now,
        }
    }

    /// Mark processed; a no-op if already processed (spec §8 idempotence test).
    pub fn mark_processed(&mut self) {
        if self.processed {
            return;
        }
        self.processed = true;
        self.processed_at = Some(Utc::now());
        self.last_error = None;
    }

    /// Derive the bus topic for this event type (spec §4.6 static map).
    pub fn topic(&self) -> &'static str {
        if self.event_type.starts_with("ORDER") || self.event_type.starts_with("SEND_ORDER")
            || self.event_type.starts_with("NOTIFY_RESTAURANT")
        {
            "orders"
        } else if self.event_type.starts_with("CAPACITY") {
            "capacity"
        } else if self.event_type.starts_with("OPTIMIZATION") || self.event_type.starts_with("OPTIMISATION") {
            "optimization"
        } else {
            "default-events"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_processed_twice_is_noop() {
        let mut event = OutboxEvent::from_new(NewOutboxEvent::new(
            OutboxEventType::OrderCreated,
            Uuid::new_v4(),
            "Order",
            serde_json::json!({}),
        ));
        event.mark_processed();
        let first_processed_at = event.processed_at;
        event.last_error = Some("stale".to_string());
        event.mark_processed();
        assert_eq!(event.processed_at, first_processed_at);
    }

    #[test]
    fn topic_mapping() {
        let mut event = OutboxEvent::from_new(NewOutboxEvent::new(
            OutboxEventType::OrderConfirmed,
            Uuid::new_v4(),
            "Order",
            serde_json::json!({}),
        ));
        assert_eq!(event.topic(), "orders");
        event.event_type = "SOMETHING_ELSE".to_string();
        assert_eq!(event.topic(), "default-events");
    }
}
