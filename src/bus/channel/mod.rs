//! In-memory publish-only bus (spec §4.6 "channel" backend): broadcasts
//! fire-and-forget, nothing survives a restart. Used for tests and the
//! standalone profile.

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use super::{BusError, BusMessage, EventBus, Result};

const CHANNEL_CAPACITY: usize = 1024;

pub struct ChannelBus {
    sender: broadcast::Sender<(String, BusMessage)>,
}

impl ChannelBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Subscribe to published `(topic, message)` pairs — used by tests that
    /// need to observe what the relay sent.
    pub fn subscribe(&self) -> broadcast::Receiver<(String, BusMessage)> {
        self.sender.subscribe()
    }
}

impl Default for ChannelBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for ChannelBus {
    async fn publish(&self, topic: &str, message: &BusMessage) -> Result<()> {
        match self.sender.send((topic.to_string(), message.clone())) {
            Ok(receivers) => {
                debug!(topic, receivers, "published to channel bus");
            }
            Err(_) => {
                debug!(topic, "published to channel bus (no receivers)");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OutboxEvent;
    use chrono::Utc;
    use uuid::Uuid;

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
    async fn publish_without_subscribers_is_ok() {
        let bus = ChannelBus::new();
        bus.publish("orders", &test_message()).await.unwrap();
    }

    #[tokio::test]
    async fn subscriber_receives_published_message() {
        let bus = ChannelBus::new();
        let mut rx = bus.subscribe();
        let message = test_message();

        bus.publish("orders", &message).await.unwrap();

        let (topic, received) = rx.recv().await.unwrap();
        assert_eq!(topic, "orders");
        assert_eq!(received.id, message.id);
    }
}
