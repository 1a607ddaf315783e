//! RabbitMQ-backed bus (spec §4.6 "amqp" backend): publishes to a durable
//! topic exchange, routing key = destination topic.

use async_trait::async_trait;
use deadpool_lapin::{Manager, Pool, PoolError};
use lapin::options::{BasicPublishOptions, ExchangeDeclareOptions};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{BasicProperties, ExchangeKind};
use tracing::info;

use super::{BusError, BusMessage, EventBus, Result};

pub struct AmqpBus {
    pool: Pool,
    exchange: String,
}

impl AmqpBus {
    /// Connect and declare `exchange` as a durable topic exchange. Used for
    /// both the main events exchange and the DLQ exchange — callers hold one
    /// `AmqpBus` per exchange.
    pub async fn connect(uri: &str, exchange: &str) -> Result<Self> {
        let manager = Manager::new(uri.to_string(), Default::default());
        let pool = Pool::builder(manager).max_size(10).build().map_err(|e| BusError::Connection(e.to_string()))?;

        let conn = pool.get().await.map_err(|e: PoolError| BusError::Connection(e.to_string()))?;
        let channel = conn.create_channel().await.map_err(|e| BusError::Connection(e.to_string()))?;
        channel
            .exchange_declare(
                exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions { durable: true, ..Default::default() },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;

        info!(exchange, "connected to AMQP bus");
        Ok(Self { pool, exchange: exchange.to_string() })
    }
}

#[async_trait]
impl EventBus for AmqpBus {
    async fn publish(&self, topic: &str, message: &BusMessage) -> Result<()> {
        let conn = self.pool.get().await.map_err(|e: PoolError| BusError::Connection(e.to_string()))?;
        let channel = conn.create_channel().await.map_err(|e| BusError::Connection(e.to_string()))?;

        let payload = serde_json::to_vec(message).map_err(|e| BusError::Publish(e.to_string()))?;

        let mut headers = FieldTable::default();
        for (key, value) in message.headers() {
            headers.insert(key.into(), AMQPValue::LongString(value.into()));
        }
        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(2) // persistent
            .with_message_id(message.id.to_string().into())
            .with_headers(headers);

        let confirm = channel
            .basic_publish(&self.exchange, topic, BasicPublishOptions::default(), &payload, properties)
            .await
            .map_err(|e| BusError::Publish(e.to_string()))?;
        confirm.await.map_err(|e| BusError::Publish(e.to_string()))?;
        Ok(())
    }
}
