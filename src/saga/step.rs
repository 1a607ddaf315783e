//! The `Step` contract (spec §4.4): "execute(context) → result" and
//! "compensate(context) → result", plus static metadata.

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{NewOutboxEvent, Order};
use crate::error::Result;

/// Everything a step needs to do its work: saga identity, the order it acts
/// on (mutable, since `ConfirmOrder` writes to it directly), and whatever
/// the previous step produced.
pub struct StepContext<'a> {
    pub saga_id: Uuid,
    pub aggregate_id: Uuid,
    pub aggregate_type: String,
    pub saga_data: serde_json::Value,
    pub step_index: usize,
    pub total_steps: usize,
    pub previous_output: Option<serde_json::Value>,
    pub order: &'a mut Order,
}

/// What a successful `execute` produced.
pub struct StepOutput {
    /// Persisted as the step's `data` payload, and handed to the next step
    /// as `previous_output`.
    pub data: serde_json::Value,
    /// Outbox events to append in the same write as the step's progress.
    pub events: Vec<NewOutboxEvent>,
    /// Whether `ctx.order` was mutated and needs to be persisted too.
    pub order_changed: bool,
}

impl StepOutput {
    pub fn data_only(data: serde_json::Value) -> Self {
        Self {
            data,
            events: Vec::new(),
            order_changed: false,
        }
    }
}

/// What a `compensate` call produced.
pub struct CompensationOutput {
    pub events: Vec<NewOutboxEvent>,
    pub order_changed: bool,
}

impl CompensationOutput {
    pub fn none() -> Self {
        Self {
            events: Vec::new(),
            order_changed: false,
        }
    }
}

/// A single saga step: reserve inventory, book a delivery partner, confirm
/// an order. Implementations own their own retries (the coordinator only
/// enforces the per-step timeout — spec §4.4 "Retry policy").
#[async_trait]
pub trait Step: Send + Sync {
    fn name(&self) -> &'static str;
    fn timeout(&self) -> Duration;
    fn max_retries(&self) -> u32;

    async fn execute(&self, ctx: &mut StepContext<'_>) -> Result<StepOutput>;

    /// Undo a previously-completed execution. `step_data` is what that
    /// execution's `StepOutput::data` was.
    async fn compensate(&self, ctx: &mut StepContext<'_>, step_data: &serde_json::Value) -> Result<CompensationOutput>;

    /// Whether compensation is meaningful for this step given its recorded
    /// output — e.g. a reservation step whose data is empty never reserved
    /// anything, so compensating is a no-op (spec §4.4 ReserveInventory).
    fn can_compensate(&self, _step_data: &serde_json::Value) -> bool {
        true
    }
}
