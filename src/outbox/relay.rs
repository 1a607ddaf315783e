//! The Outbox Relay background service (spec §4.6).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};

use crate::bus::{BusMessage, EventBus};
use crate::config::OutboxConfig;
use crate::domain::OutboxEvent;
use crate::storage::{StorageError, TransactionalStorage};
use crate::telemetry::Metrics;

pub type Result<T> = std::result::Result<T, RelayError>;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Drains unprocessed outbox events to the bus, with per-event retry and
/// dead-letter routing. `bus` is the primary destination; `dlq_bus` receives
/// events that exhaust `config.max_retries` (a distinct exchange/connection
/// for the AMQP backend, the same instance as `bus` for the in-memory
/// channel backend).
pub struct OutboxRelay<T, B> {
    storage: Arc<T>,
    bus: Arc<B>,
    dlq_bus: Arc<B>,
    config: OutboxConfig,
    metrics: Arc<Metrics>,
    polling: Arc<AtomicBool>,
}

impl<T, B> OutboxRelay<T, B>
where
    T: TransactionalStorage + 'static,
    B: EventBus + 'static,
{
    pub fn new(storage: Arc<T>, bus: Arc<B>, dlq_bus: Arc<B>, config: OutboxConfig, metrics: Arc<Metrics>) -> Self {
        Self {
            storage,
            bus,
            dlq_bus,
            config,
            metrics,
            polling: Arc::new(AtomicBool::new(false)),
        }
    }

    /// One poll-and-dispatch cycle (spec §4.6 "Poll loop"). Re-entrancy
    /// guarded: if a previous cycle is still draining its batch, this call
    /// is a no-op rather than piling up concurrent polls.
    pub async fn poll_once(self: &Arc<Self>) -> Result<usize> {
        if self.polling.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            debug!("outbox poll overrun, skipping this tick");
            return Ok(0);
        }

        let result = self.drain_once().await;
        self.polling.store(false, Ordering::SeqCst);
        result
    }

    async fn drain_once(self: &Arc<Self>) -> Result<usize> {
        let events = self.storage.poll_outbox(self.config.batch_size).await?;
        let count = events.len();
        if count > 0 {
            debug!(count, "outbox batch fetched");
            let lag = (Utc::now() - events[0].created_at).num_milliseconds().max(0) as f64 / 1000.0;
            self.metrics.record_outbox_lag(lag);
        } else {
            self.metrics.record_outbox_lag(0.0);
        }

        let concurrency = self.config.dispatch_concurrency;
        stream::iter(events)
            .for_each_concurrent(concurrency, |event| {
                let this = Arc::clone(self);
                async move { this.dispatch_one(event).await }
            })
            .await;

        Ok(count)
    }

    async fn dispatch_one(&self, event: OutboxEvent) {
        let topic = event.topic();
        let message = BusMessage::from_outbox_event(&event);

        match self.bus.publish(topic, &message).await {
            Ok(()) => {
                if let Err(e) = self.storage.mark_outbox_processed(event.id).await {
                    error!(event_id = %event.id, error = %e, "failed to mark outbox event processed");
                }
            }
            Err(publish_err) => {
                let retry_count = event.retry_count + 1;
                if retry_count >= self.config.max_retries {
                    self.route_to_dlq(&event, &message, &publish_err.to_string()).await;
                } else {
                    let next_attempt = Utc::now() + ChronoDuration::seconds(self.config.retry_delay_secs as i64);
                    if let Err(e) = self.storage.mark_outbox_retry(event.id, retry_count, next_attempt, &publish_err.to_string()).await {
                        error!(event_id = %event.id, error = %e, "failed to persist outbox retry state");
                    }
                }
            }
        }
    }

    /// Route an event that exhausted its retry budget to the dead-letter
    /// topic, then mark it processed so the poll loop never selects it
    /// again (spec §4.6: "further attempts stop").
    async fn route_to_dlq(&self, event: &OutboxEvent, message: &BusMessage, error: &str) {
        warn!(event_id = %event.id, event_type = %event.event_type, retry_count = event.retry_count + 1, "routing outbox event to DLQ");

        let envelope = BusMessage {
            retry_count: event.retry_count + 1,
            data: serde_json::json!({
                "originalPayload": message.data,
                "error": error,
            }),
            extra_headers: vec![
                ("original-topic", event.topic().to_string()),
                ("failed-at", Utc::now().to_rfc3339()),
            ],
            ..message.clone()
        };

        if let Err(e) = self.dlq_bus.publish("dlq", &envelope).await {
            error!(event_id = %event.id, error = %e, "failed to publish to DLQ, event will be retried as unprocessed");
            return;
        }
        self.metrics.record_dlq();

        if let Err(e) = self.storage.mark_outbox_processed(event.id).await {
            error!(event_id = %event.id, error = %e, "failed to mark DLQ'd outbox event processed");
        }
    }

    /// Cleanup pass (spec §4.6 "Cleanup (hourly)"): deletes processed events
    /// (including DLQ'd ones, since those are also marked processed) older
    /// than `cleanup_retention_hours`.
    pub async fn cleanup_once(&self) -> Result<u64> {
        let older_than = Utc::now() - ChronoDuration::hours(self.config.cleanup_retention_hours);
        let removed = self.storage.cleanup_outbox(older_than).await?;
        if removed > 0 {
            info!(removed, "outbox cleanup removed processed events");
        }
        Ok(removed)
    }

    /// Spawn the poll loop (every `poll_interval_secs`).
    pub fn spawn_poll_loop(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let this = Arc::clone(self);
        let period = std::time::Duration::from_secs(self.config.poll_interval_secs);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                if let Err(e) = this.poll_once().await {
                    error!(error = %e, "outbox poll cycle failed");
                }
            }
        })
    }

    /// Spawn the retry sweep loop (every `retry_sweep_interval_secs`). This
    /// runs the same dispatch path as the poll loop — `poll_outbox` already
    /// selects events whose `next_attempt` has passed, so the sweep exists
    /// only to run that selection on its own, slower cadence independent of
    /// the primary poll.
    pub fn spawn_retry_sweep_loop(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let this = Arc::clone(self);
        let period = std::time::Duration::from_secs(self.config.retry_sweep_interval_secs);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                if let Err(e) = this.poll_once().await {
                    error!(error = %e, "outbox retry sweep failed");
                }
            }
        })
    }

    /// Spawn the cleanup loop (every `cleanup_interval_secs`).
    pub fn spawn_cleanup_loop(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let this = Arc::clone(self);
        let period = std::time::Duration::from_secs(self.config.cleanup_interval_secs);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                if let Err(e) = this.cleanup_once().await {
                    error!(error = %e, "outbox cleanup cycle failed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::ChannelBus;
    use crate::domain::{NewOutboxEvent, OutboxEventType};
    use crate::storage::mock::MockStorage;
    use uuid::Uuid;

    fn test_config() -> OutboxConfig {
        OutboxConfig {
            poll_interval_secs: 5,
            batch_size: 100,
            dispatch_concurrency: 10,
            max_retries: 3,
            retry_delay_secs: 30,
            retry_sweep_interval_secs: 60,
            cleanup_interval_secs: 3600,
            cleanup_retention_hours: 24,
        }
    }

    #[tokio::test]
    async fn successful_publish_marks_event_processed() {
        let storage = Arc::new(MockStorage::new());
        let aggregate_id = Uuid::new_v4();
        storage
            .outbox()
            .append(NewOutboxEvent::new(OutboxEventType::OrderCreated, aggregate_id, "Order", serde_json::json!({})))
            .await;

        let bus = Arc::new(ChannelBus::new());
        let mut subscriber = bus.subscribe();
        let relay = Arc::new(OutboxRelay::new(storage.clone(), bus.clone(), bus.clone(), test_config(), Arc::new(Metrics::new())));

        let processed = relay.poll_once().await.unwrap();
        assert_eq!(processed, 1);

        let (topic, message) = subscriber.recv().await.unwrap();
        assert_eq!(topic, "orders");
        assert_eq!(message.aggregate_id, aggregate_id);

        let remaining = storage.outbox().poll_batch(10).await.unwrap();
        assert!(remaining.is_empty(), "processed events must not be re-polled");
    }

    #[tokio::test]
    async fn concurrent_poll_cycles_are_skipped_while_one_is_in_flight() {
        let storage = Arc::new(MockStorage::new());
        let bus = Arc::new(ChannelBus::new());
        let relay = Arc::new(OutboxRelay::new(storage, bus.clone(), bus, test_config(), Arc::new(Metrics::new())));

        relay.polling.store(true, Ordering::SeqCst);
        let processed = relay.poll_once().await.unwrap();
        assert_eq!(processed, 0, "a poll already in flight must make the next call a no-op");
    }
}
