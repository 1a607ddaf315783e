//! Saga definitions: (saga type, ordered step list, max retries) (spec §4.4).

use std::sync::Arc;

use crate::domain::SagaType;
use crate::router::RequestRouter;

use super::step::Step;
use super::steps::{BookPartner, ConfirmOrder, ReserveInventory};

pub struct SagaDefinition {
    pub saga_type: SagaType,
    pub steps: Vec<Arc<dyn Step>>,
    /// Coordinator-level max retries for whole-saga reruns triggered from
    /// outside (spec §4.4) — distinct from each step's own retry count.
    pub max_retries: u32,
}

impl SagaDefinition {
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }
}

/// The order-processing saga: reserve inventory, book a delivery partner,
/// confirm the order (spec §4.4).
pub fn order_processing_definition(router: Arc<RequestRouter>) -> SagaDefinition {
    SagaDefinition {
        saga_type: SagaType::OrderProcessing,
        steps: vec![
            Arc::new(ReserveInventory::new(router.clone())),
            Arc::new(BookPartner::new(router)),
            Arc::new(ConfirmOrder::default()),
        ],
        max_retries: 0,
    }
}
