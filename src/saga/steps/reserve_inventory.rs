//! `ReserveInventory` — first saga step (spec §4.4).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use serde::Deserialize;

use crate::error::{ControlPlaneError, Result};
use crate::router::{self, Method, ProxyRequest, RequestRouter};
use crate::saga::step::{CompensationOutput, Step, StepContext, StepOutput};

const TIMEOUT: Duration = Duration::from_secs(5);
const MAX_RETRIES: u32 = 3;

fn reservation_ttl() -> ChronoDuration {
    ChronoDuration::minutes(15)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReserveResponse {
    reservation_id: String,
    #[serde(default)]
    reserved_quantities: std::collections::HashMap<String, u32>,
}

/// Reserves the line items against `inventory-service`. Compensation
/// releases the reservation by id; a step that never completed (no
/// `reservation_id` recorded) has nothing to release.
pub struct ReserveInventory {
    router: Arc<RequestRouter>,
    service: String,
}

impl ReserveInventory {
    pub fn new(router: Arc<RequestRouter>) -> Self {
        Self {
            router,
            service: "inventory-service".to_string(),
        }
    }

    async fn try_reserve(&self, ctx: &StepContext<'_>) -> Result<StepOutput> {
        let body = serde_json::json!({
            "orderId": ctx.order.id,
            "items": ctx.order.items.iter().map(|item| serde_json::json!({
                "itemId": item.item_id,
                "quantity": item.quantity,
            })).collect::<Vec<_>>(),
        });
        let request = ProxyRequest::new(Method::Post, &self.service, "/reservations")
            .with_body(serde_json::to_vec(&body).map_err(|e| ControlPlaneError::Internal(e.to_string()))?);

        let response = self.router.proxy(request).await?;
        if let Some(err) = router::error_for_status(&self.service, &response) {
            return Err(err);
        }
        let parsed: ReserveResponse =
            serde_json::from_slice(&response.body).map_err(|e| ControlPlaneError::Internal(format!("malformed inventory response: {e}")))?;

        let expiry = Utc::now() + reservation_ttl();
        let data = serde_json::json!({
            "reservationId": parsed.reservation_id,
            "reservedQuantities": parsed.reserved_quantities,
            "expiry": expiry,
        });
        Ok(StepOutput::data_only(data))
    }
}

#[async_trait]
impl Step for ReserveInventory {
    fn name(&self) -> &'static str {
        "ReserveInventory"
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
            match self.try_reserve(ctx).await {
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
        let Some(reservation_id) = step_data.get("reservationId").and_then(|v| v.as_str()) else {
            return Ok(CompensationOutput::none());
        };

        let request = ProxyRequest::new(Method::Delete, &self.service, &format!("/reservations/{reservation_id}"));
        self.router.proxy(request).await?;
        Ok(CompensationOutput::none())
    }

    fn can_compensate(&self, step_data: &serde_json::Value) -> bool {
        step_data.get("reservationId").and_then(|v| v.as_str()).is_some()
    }
}
