//! Bus client (spec §4.7): publishes outbox messages to topics.
//!
//! `EventBus::publish` is expected to exhaust its own retry schedule
//! internally before returning `Err` — the caller (the Outbox Relay) only
//! sees a final success or failure and reacts by persisting retry state or
//! diverting to the DLQ topic. That internal schedule is provided by
//! [`RetryingBus`], which wraps either backend in the exponential
//! backoff-plus-jitter policy from spec §4.7, independent of the relay's own
//! (persisted, cross-poll) retry bookkeeping.

pub mod channel;

#[cfg(feature = "amqp")]
pub mod amqp;

pub use channel::ChannelBus;

#[cfg(feature = "amqp")]
pub use amqp::AmqpBus;

use std::time::Duration;

use async_trait::async_trait;
use backon::{BackoffBuilder, ExponentialBuilder};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::domain::OutboxEvent;

pub type Result<T> = std::result::Result<T, BusError>;

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("bus connection failed: {0}")]
    Connection(String),
    #[error("publish failed: {0}")]
    Publish(String),
}

/// The on-wire payload (spec §6): `{id, type, aggregateId, aggregateType,
/// data, timestamp, version}`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BusMessage {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub event_type: String,
    pub aggregate_id: Uuid,
    pub aggregate_type: String,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub version: u32,
    #[serde(skip)]
    pub retry_count: u32,
    /// Extra headers stapled on for dead-letter routing (spec §4.6 scenario:
    /// `original-topic`, `retry-count`, `failed-at`); empty for a normal publish.
    #[serde(skip)]
    pub extra_headers: Vec<(&'static str, String)>,
}

impl BusMessage {
    pub fn from_outbox_event(event: &OutboxEvent) -> Self {
        Self {
            id: event.id,
            event_type: event.event_type.clone(),
            aggregate_id: event.aggregate_id,
            aggregate_type: event.aggregate_type.clone(),
            data: event.payload.clone(),
            timestamp: Utc::now(),
            version: 1,
            retry_count: event.retry_count,
            extra_headers: Vec::new(),
        }
    }

    /// Headers echoed alongside the message body (spec §6).
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("event-type", self.event_type.clone()),
            ("aggregate-type", self.aggregate_type.clone()),
            ("aggregate-id", self.aggregate_id.to_string()),
            ("event-id", self.id.to_string()),
            ("created-at", self.timestamp.to_rfc3339()),
            ("retry-count", self.retry_count.to_string()),
            ("timestamp", self.timestamp.to_rfc3339()),
        ];
        headers.extend(self.extra_headers.iter().cloned());
        headers
    }
}

/// A destination for bus messages. Implementations publish a single message
/// to a single attempt; retry policy lives in [`RetryingBus`].
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, topic: &str, message: &BusMessage) -> Result<()>;
}

/// Wraps an [`EventBus`] with the retry schedule from spec §4.7: up to
/// `max_retries` attempts, exponential backoff starting at 1s and capped at
/// 30s, with jitter to avoid thundering-herd reconnects.
pub struct RetryingBus<B> {
    inner: B,
    max_retries: u32,
}

impl<B: EventBus> RetryingBus<B> {
    pub fn new(inner: B, max_retries: u32) -> Self {
        Self { inner, max_retries }
    }
}

#[async_trait]
impl<B: EventBus> EventBus for RetryingBus<B> {
    async fn publish(&self, topic: &str, message: &BusMessage) -> Result<()> {
        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(30))
            .with_max_times(self.max_retries as usize)
            .with_jitter()
            .build();

        let mut last_error = None;
        for (attempt, delay) in std::iter::once(Duration::ZERO).chain(backoff).enumerate() {
            if attempt > 0 {
                tokio::time::sleep(delay).await;
            }
            match self.inner.publish(topic, message).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(topic, attempt = attempt + 1, error = %e, "bus publish attempt failed");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| BusError::Publish("no publish attempt was made".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FlakyBus {
        attempts: Arc<AtomicUsize>,
        succeed_on: usize,
    }

    #[async_trait]
    impl EventBus for FlakyBus {
        async fn publish(&self, _topic: &str, _message: &BusMessage) -> Result<()> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt >= self.succeed_on {
                Ok(())
            } else {
                Err(BusError::Publish("simulated failure".to_string()))
            }
        }
    }

    fn test_message() -> BusMessage {
        BusMessage::from_outbox_event(&OutboxEvent {
            id: Uuid::new_v4(),
            event_type: "ORDER_CREATED".to_string(),
            aggregate_id: Uuid::new_v4(),
            aggregate_type: "Order".to_string(),
            payload: serde_json::json!({}),
            processed: false,
            processed_at: None,
            last_error: None,
            retry_count: 0,
            next_attempt: None,
            created_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn retries_until_success_within_budget() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let bus = RetryingBus::new(FlakyBus { attempts: attempts.clone(), succeed_on: 3 }, 3);
        bus.publish("orders", &test_message()).await.unwrap();
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let bus = RetryingBus::new(FlakyBus { attempts: attempts.clone(), succeed_on: 100 }, 2);
        let result = bus.publish("orders", &test_message()).await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
