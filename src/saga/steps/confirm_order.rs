//! `ConfirmOrder` — third and final saga step (spec §4.4).

use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use rand::Rng;

use crate::domain::{NewOutboxEvent, OrderStatus, OutboxEventType};
use crate::error::Result;
use crate::saga::step::{CompensationOutput, Step, StepContext, StepOutput};

const TIMEOUT: Duration = Duration::from_secs(3);
const MAX_RETRIES: u32 = 2;
const BASE36_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

fn fallback_delivery_window() -> ChronoDuration {
    ChronoDuration::minutes(45)
}

fn base36_encode(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(BASE36_ALPHABET[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).expect("base36 alphabet is ASCII")
}

fn random_suffix() -> String {
    let mut rng = rand::rng();
    (0..3).map(|_| BASE36_ALPHABET[rng.random_range(0..BASE36_ALPHABET.len())] as char).collect()
}

/// Tracking code scheme: `TRK-<base36 time>-<last 4 of order id>-<3 random chars>`.
fn generate_tracking_code(order_id: uuid::Uuid) -> String {
    let time_part = base36_encode(Utc::now().timestamp() as u64);
    let id_str = order_id.simple().to_string();
    let id_suffix = &id_str[id_str.len() - 4..];
    format!("TRK-{time_part}-{}-{}", id_suffix.to_uppercase(), random_suffix())
}

/// Commits Order status to `Confirmed` and appends the confirmation
/// notifications, in the same write as the step's progress (the coordinator
/// persists `ctx.order` alongside the saga row — spec §4.5 atomicity).
pub struct ConfirmOrder;

impl Default for ConfirmOrder {
    fn default() -> Self {
        Self
    }
}

#[async_trait]
impl Step for ConfirmOrder {
    fn name(&self) -> &'static str {
        "ConfirmOrder"
    }

    fn timeout(&self) -> Duration {
        TIMEOUT
    }

    fn max_retries(&self) -> u32 {
        MAX_RETRIES
    }

    async fn execute(&self, ctx: &mut StepContext<'_>) -> Result<StepOutput> {
        let mut attempt = 0;
        loop {
            match self.try_confirm(ctx) {
                Ok(output) => return Ok(output),
                Err(err) if err.is_retryable() && attempt < self.max_retries() => {
                    let delay = Duration::from_secs(2u64.pow(attempt));
                    tracing::info!(step = self.name(), attempt, delay_secs = delay.as_secs(), "retrying after transient failure");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn compensate(&self, ctx: &mut StepContext<'_>, _step_data: &serde_json::Value) -> Result<CompensationOutput> {
        let failure_reason = "saga compensation: a later step failed".to_string();

        ctx.order.transition_to(OrderStatus::Pending)?;
        ctx.order.tracking_code = None;
        ctx.order.estimated_delivery_time = None;
        ctx.order.failure_reason = Some(failure_reason.clone());

        let events = vec![NewOutboxEvent::new(
            OutboxEventType::OrderConfirmationReverted,
            ctx.order.id,
            "Order",
            serde_json::json!({ "reason": failure_reason }),
        )];

        Ok(CompensationOutput {
            events,
            order_changed: true,
        })
    }
}

impl ConfirmOrder {
    fn try_confirm(&self, ctx: &mut StepContext<'_>) -> Result<StepOutput> {
        let estimated_delivery_time = ctx
            .previous_output
            .as_ref()
            .and_then(|v| v.get("estimatedDeliveryTime"))
            .and_then(|v| v.as_str())
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| Utc::now() + fallback_delivery_window());

        let tracking_code = generate_tracking_code(ctx.order.id);

        ctx.order.transition_to(OrderStatus::Confirmed)?;
        ctx.order.tracking_code = Some(tracking_code.clone());
        ctx.order.estimated_delivery_time = Some(estimated_delivery_time);

        let events = vec![
            NewOutboxEvent::new(
                OutboxEventType::OrderConfirmed,
                ctx.order.id,
                "Order",
                serde_json::json!({ "trackingCode": tracking_code, "estimatedDeliveryTime": estimated_delivery_time }),
            ),
            NewOutboxEvent::new(
                OutboxEventType::SendOrderConfirmation,
                ctx.order.id,
                "Order",
                serde_json::json!({ "customerId": ctx.order.customer_id, "trackingCode": tracking_code }),
            ),
            NewOutboxEvent::new(
                OutboxEventType::NotifyRestaurantOrderConfirmed,
                ctx.order.id,
                "Order",
                serde_json::json!({ "restaurantId": ctx.order.restaurant_id }),
            ),
        ];

        let data = serde_json::json!({
            "trackingCode": tracking_code,
            "estimatedDeliveryTime": estimated_delivery_time,
        });

        Ok(StepOutput {
            data,
            events,
            order_changed: true,
        })
    }
}
