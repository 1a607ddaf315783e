use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{
    DeliveryLocation, LineItem, Money, NewOutboxEvent, Order, OrderPriority, OrderStatus, OutboxEventType, SagaStatus, SagaType,
    StepStatus,
};
use crate::storage::mock::MockStorage;

use super::*;

fn test_order() -> Order {
    Order::new(
        "customer-1",
        "restaurant-1",
        vec![LineItem::new("item-1", "Burger", 2, Money::from_dollars(15.00))],
        DeliveryLocation {
            lat: 40.7128,
            lng: -74.0060,
            address: "1 Main St".to_string(),
            city: None,
            postal_code: None,
        },
        OrderPriority::Normal,
    )
    .unwrap()
}

/// Always succeeds, recording a fixed reservation/booking-style id so tests
/// can assert on compensation input.
struct StubStep {
    name: &'static str,
    output: serde_json::Value,
    fails: bool,
}

#[async_trait]
impl Step for StubStep {
    fn name(&self) -> &'static str {
        self.name
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(1)
    }

    fn max_retries(&self) -> u32 {
        0
    }

    async fn execute(&self, _ctx: &mut StepContext<'_>) -> crate::error::Result<StepOutput> {
        if self.fails {
            return Err(crate::error::ControlPlaneError::Upstream5xx {
                service: self.name.to_string(),
                status: 500,
                message: "deterministic failure".to_string(),
            });
        }
        Ok(StepOutput::data_only(self.output.clone()))
    }

    async fn compensate(&self, _ctx: &mut StepContext<'_>, _step_data: &serde_json::Value) -> crate::error::Result<CompensationOutput> {
        Ok(CompensationOutput::none())
    }
}

/// Stands in for `ConfirmOrder`: transitions the order and appends the
/// confirmation events, without calling out to any service.
struct StubConfirm;

#[async_trait]
impl Step for StubConfirm {
    fn name(&self) -> &'static str {
        "ConfirmOrder"
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(1)
    }

    fn max_retries(&self) -> u32 {
        0
    }

    async fn execute(&self, ctx: &mut StepContext<'_>) -> crate::error::Result<StepOutput> {
        ctx.order.transition_to(OrderStatus::Confirmed)?;
        ctx.order.tracking_code = Some("TRK-TEST-0001-ABC".to_string());
        let events = vec![NewOutboxEvent::new(
            OutboxEventType::OrderConfirmed,
            ctx.order.id,
            "Order",
            serde_json::json!({}),
        )];
        Ok(StepOutput {
            data: serde_json::json!({ "trackingCode": "TRK-TEST-0001-ABC" }),
            events,
            order_changed: true,
        })
    }

    async fn compensate(&self, ctx: &mut StepContext<'_>, _step_data: &serde_json::Value) -> crate::error::Result<CompensationOutput> {
        ctx.order.transition_to(OrderStatus::Pending)?;
        ctx.order.tracking_code = None;
        ctx.order.failure_reason = Some("compensated".to_string());
        Ok(CompensationOutput {
            events: vec![NewOutboxEvent::new(
                OutboxEventType::OrderConfirmationReverted,
                ctx.order.id,
                "Order",
                serde_json::json!({}),
            )],
            order_changed: true,
        })
    }
}

fn definition_with(steps: Vec<Arc<dyn Step>>) -> SagaDefinition {
    SagaDefinition {
        saga_type: SagaType::OrderProcessing,
        steps,
        max_retries: 0,
    }
}

#[tokio::test]
async fn saga_runs_to_completion_and_confirms_order() {
    let storage = Arc::new(MockStorage::new());
    let definition = definition_with(vec![
        Arc::new(StubStep {
            name: "ReserveInventory",
            output: serde_json::json!({ "reservationId": "R1" }),
            fails: false,
        }),
        Arc::new(StubStep {
            name: "BookPartner",
            output: serde_json::json!({ "bookingId": "B1" }),
            fails: false,
        }),
        Arc::new(StubConfirm),
    ]);
    let coordinator = SagaCoordinator::new(storage.clone(), definition);

    let order = test_order();
    let saga = coordinator.start_saga(&order).await.unwrap();
    coordinator.execute(saga.id).await.unwrap();

    let final_saga = storage.sagas().get(saga.id).await.unwrap();
    assert_eq!(final_saga.status, SagaStatus::Completed);
    assert!(final_saga.steps.iter().all(|s| s.status == StepStatus::Completed));

    let final_order = storage.orders().get(order.id).await.unwrap();
    assert_eq!(final_order.status, OrderStatus::Confirmed);
    assert_eq!(final_order.tracking_code.as_deref(), Some("TRK-TEST-0001-ABC"));
}

#[tokio::test]
async fn saga_compensates_in_reverse_order_on_step_failure() {
    let storage = Arc::new(MockStorage::new());
    let definition = definition_with(vec![
        Arc::new(StubStep {
            name: "ReserveInventory",
            output: serde_json::json!({ "reservationId": "R1" }),
            fails: false,
        }),
        Arc::new(StubStep {
            name: "BookPartner",
            output: serde_json::json!(null),
            fails: true,
        }),
        Arc::new(StubConfirm),
    ]);
    let coordinator = SagaCoordinator::new(storage.clone(), definition);

    let order = test_order();
    let saga = coordinator.start_saga(&order).await.unwrap();
    coordinator.execute(saga.id).await.unwrap();

    let final_saga = storage.sagas().get(saga.id).await.unwrap();
    assert_eq!(final_saga.status, SagaStatus::Compensated);
    assert_eq!(final_saga.steps[0].status, StepStatus::Compensated);
    assert_eq!(final_saga.steps[1].status, StepStatus::Failed);
    assert_eq!(final_saga.steps[2].status, StepStatus::Pending);

    let final_order = storage.orders().get(order.id).await.unwrap();
    assert_eq!(final_order.status, OrderStatus::Pending);
    assert!(final_order.failure_reason.is_none(), "ConfirmOrder never ran, so it never set a failure reason");
}

#[tokio::test]
async fn executing_a_terminal_saga_is_a_noop() {
    let storage = Arc::new(MockStorage::new());
    let definition = definition_with(vec![Arc::new(StubStep {
        name: "ReserveInventory",
        output: serde_json::json!({ "reservationId": "R1" }),
        fails: false,
    })]);
    let coordinator = SagaCoordinator::new(storage.clone(), definition);

    let order = test_order();
    let saga = coordinator.start_saga(&order).await.unwrap();
    coordinator.execute(saga.id).await.unwrap();
    assert_eq!(storage.sagas().get(saga.id).await.unwrap().status, SagaStatus::Completed);

    // Re-running a completed saga must not re-execute steps or re-append events.
    coordinator.execute(saga.id).await.unwrap();
    assert_eq!(storage.sagas().get(saga.id).await.unwrap().status, SagaStatus::Completed);
}

#[tokio::test]
async fn concurrent_execute_calls_for_the_same_saga_run_once() {
    let storage = Arc::new(MockStorage::new());
    let definition = definition_with(vec![Arc::new(StubConfirm)]);
    let coordinator = Arc::new(SagaCoordinator::new(storage.clone(), definition));

    let order = test_order();
    let saga = coordinator.start_saga(&order).await.unwrap();

    let (a, b) = tokio::join!(coordinator.execute(saga.id), coordinator.execute(saga.id));
    a.unwrap();
    b.unwrap();

    let final_saga = storage.sagas().get(saga.id).await.unwrap();
    assert_eq!(final_saga.status, SagaStatus::Completed);
}
