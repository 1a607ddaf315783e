//! `BookPartner` — second saga step (spec §4.4): requests optimization,
//! selects a partner, and books them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{ControlPlaneError, Result};
use crate::router::{self, Method, ProxyRequest, RequestRouter};
use crate::saga::step::{CompensationOutput, Step, StepContext, StepOutput};

const TIMEOUT: Duration = Duration::from_secs(8);
const MAX_RETRIES: u32 = 3;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OptimizeResponse {
    partner_id: String,
    channel_id: String,
    #[serde(default)]
    optimisation_score: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BookingResponse {
    booking_id: String,
    estimated_pickup_time: chrono::DateTime<chrono::Utc>,
    estimated_delivery_time: chrono::DateTime<chrono::Utc>,
    fee_cents: i64,
    commission_cents: i64,
}

/// Compensation cancels the booking by id; a step that never completed has
/// nothing to cancel.
pub struct BookPartner {
    router: Arc<RequestRouter>,
    optimization_service: String,
    partner_service: String,
}

impl BookPartner {
    pub fn new(router: Arc<RequestRouter>) -> Self {
        Self {
            router,
            optimization_service: "optimization-service".to_string(),
            partner_service: "partner-service".to_string(),
        }
    }

    async fn try_book(&self, ctx: &StepContext<'_>) -> Result<StepOutput> {
        let optimize_body = serde_json::json!({
            "orderId": ctx.order.id,
            "restaurantId": ctx.order.restaurant_id,
            "delivery": {
                "lat": ctx.order.delivery_location.lat,
                "lng": ctx.order.delivery_location.lng,
            },
            "priority": format!("{:?}", ctx.order.priority),
        });
        let optimize_request = ProxyRequest::new(Method::Post, &self.optimization_service, "/optimize")
            .with_body(serde_json::to_vec(&optimize_body).map_err(|e| ControlPlaneError::Internal(e.to_string()))?);
        let optimize_response = self.router.proxy(optimize_request).await?;
        if let Some(err) = router::error_for_status(&self.optimization_service, &optimize_response) {
            return Err(err);
        }
        let optimized: OptimizeResponse = serde_json::from_slice(&optimize_response.body)
            .map_err(|e| ControlPlaneError::Internal(format!("malformed optimization response: {e}")))?;

        let booking_body = serde_json::json!({
            "orderId": ctx.order.id,
            "partnerId": optimized.partner_id,
            "channelId": optimized.channel_id,
        });
        let booking_request = ProxyRequest::new(Method::Post, &self.partner_service, "/bookings")
            .with_body(serde_json::to_vec(&booking_body).map_err(|e| ControlPlaneError::Internal(e.to_string()))?);
        let booking_response = self.router.proxy(booking_request).await?;
        if let Some(err) = router::error_for_status(&self.partner_service, &booking_response) {
            return Err(err);
        }
        let booking: BookingResponse = serde_json::from_slice(&booking_response.body)
            .map_err(|e| ControlPlaneError::Internal(format!("malformed partner response: {e}")))?;

        let data = serde_json::json!({
            "bookingId": booking.booking_id,
            "partnerId": optimized.partner_id,
            "channelId": optimized.channel_id,
            "estimatedPickupTime": booking.estimated_pickup_time,
            "estimatedDeliveryTime": booking.estimated_delivery_time,
            "feeCents": booking.fee_cents,
            "commissionCents": booking.commission_cents,
            "optimisationScore": optimized.optimisation_score,
        });
        Ok(StepOutput::data_only(data))
    }
}

#[async_trait]
impl Step for BookPartner {
    fn name(&self) -> &'static str {
        "BookPartner"
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
            match self.try_book(ctx).await {
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

    async fn compensate(&self, _ctx: &mut StepContext<'_>, step_data: &serde_json::Value) -> Result<CompensationOutput> {
        let Some(booking_id) = step_data.get("bookingId").and_then(|v| v.as_str()) else {
            return Ok(CompensationOutput::none());
        };

        let request = ProxyRequest::new(Method::Delete, &self.partner_service, &format!("/bookings/{booking_id}"));
        self.router.proxy(request).await?;
        Ok(CompensationOutput::none())
    }

    fn can_compensate(&self, step_data: &serde_json::Value) -> bool {
        step_data.get("bookingId").and_then(|v| v.as_str()).is_some()
    }
}
