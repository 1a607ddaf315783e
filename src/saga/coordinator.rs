//! Saga Coordinator: durable execution, one step at a time, with reverse-order
//! compensation on failure (spec §4.4).

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::{NewOutboxEvent, Order, OutboxEventType, Saga, SagaStatus, StepStatus};
use crate::error::Result;
use crate::storage::TransactionalStorage;

use super::definition::SagaDefinition;
use super::step::StepContext;

/// Runs one `SagaDefinition` against a `TransactionalStorage`. Enforces
/// "at most one executor per saga id at a time" with an in-process guard —
/// sufficient because execution is always triggered from this process's own
/// queue (spec §4.4 Concurrency).
pub struct SagaCoordinator<T: TransactionalStorage> {
    storage: Arc<T>,
    definition: SagaDefinition,
    running: Mutex<HashSet<Uuid>>,
}

impl<T: TransactionalStorage> SagaCoordinator<T> {
    pub fn new(storage: Arc<T>, definition: SagaDefinition) -> Self {
        Self {
            storage,
            definition,
            running: Mutex::new(HashSet::new()),
        }
    }

    /// `startSaga` (spec §4.4 steps 1-2): create the Saga record, in the same
    /// transaction as the order insert and its `ORDER_CREATED` event.
    /// Returns the saga so the caller can enqueue `execute`.
    pub async fn start_saga(&self, order: &Order) -> Result<Saga> {
        let step_names = self.definition.step_names();
        let saga = Saga::start(
            self.definition.saga_type,
            order.id,
            "Order",
            serde_json::json!({}),
            &step_names,
            self.definition.max_retries,
        );
        let order_created = NewOutboxEvent::new(
            OutboxEventType::OrderCreated,
            order.id,
            "Order",
            serde_json::json!({
                "customerId": order.customer_id,
                "restaurantId": order.restaurant_id,
                "total": order.total.as_dollars(),
            }),
        );
        self.storage.create_order_with_saga(order, &order_created, &saga).await?;
        Ok(saga)
    }

    /// `executeSaga(sagaId)` (spec §4.4). A no-op if the saga is already
    /// terminal, or if another call for the same id is already running.
    pub async fn execute(&self, saga_id: Uuid) -> Result<()> {
        {
            let mut running = self.running.lock().await;
            if !running.insert(saga_id) {
                return Ok(());
            }
        }
        let result = self.execute_inner(saga_id).await;
        self.running.lock().await.remove(&saga_id);
        result
    }

    async fn execute_inner(&self, saga_id: Uuid) -> Result<()> {
        let mut saga = self.storage.get_saga(saga_id).await?;
        if saga.status.is_terminal() {
            return Ok(());
        }
        let mut order = self.storage.get_order(saga.aggregate_id).await?;

        if saga.status == SagaStatus::Started {
            saga.transition_to(SagaStatus::InProgress)?;
        }

        // Resuming a saga that already made progress: the previous step's
        // output becomes this run's `previous_output`. `wrapping_sub` makes
        // `current_step == 0` land out of bounds (`Vec::get` -> `None`)
        // rather than aliasing index 0.
        let mut previous_output = saga
            .steps
            .get(saga.current_step.wrapping_sub(1))
            .filter(|s| s.status == StepStatus::Completed)
            .map(|s| s.data.clone());

        let mut failure: Option<String> = None;

        while saga.current_step < saga.total_steps {
            let step_index = saga.current_step;
            let step = self.definition.steps[step_index].clone();

            let mut ctx = StepContext {
                saga_id: saga.id,
                aggregate_id: saga.aggregate_id,
                aggregate_type: saga.aggregate_type.clone(),
                saga_data: saga.data.clone(),
                step_index,
                total_steps: saga.total_steps,
                previous_output: previous_output.clone(),
                order: &mut order,
            };

            let outcome = match tokio::time::timeout(step.timeout(), step.execute(&mut ctx)).await {
                Ok(Ok(output)) => Ok(output),
                Ok(Err(err)) => Err(err.to_string()),
                Err(_) => Err(format!("{} timed out after {:?}", step.name(), step.timeout())),
            };
            drop(ctx);

            match outcome {
                Ok(output) => {
                    saga.steps[step_index].status = StepStatus::Completed;
                    saga.steps[step_index].data = output.data.clone();
                    saga.steps[step_index].executed_at = Some(Utc::now());
                    saga.current_step = step_index + 1;
                    previous_output = Some(output.data);

                    let order_ref = if output.order_changed { Some(&order) } else { None };
                    self.storage.apply_saga_step(&saga, order_ref, &output.events).await?;
                }
                Err(reason) => {
                    saga.steps[step_index].status = StepStatus::Failed;
                    saga.steps[step_index].last_error = Some(reason.clone());
                    self.storage.apply_saga_step(&saga, None, &[]).await?;
                    failure = Some(reason);
                    break;
                }
            }
        }

        if let Some(reason) = failure {
            return self.compensate(saga, order, reason).await;
        }

        saga.transition_to(SagaStatus::Completed)?;
        let completed_event = NewOutboxEvent::new(
            OutboxEventType::SagaCompleted,
            saga.aggregate_id,
            saga.aggregate_type.clone(),
            serde_json::json!({ "sagaId": saga.id }),
        );
        self.storage.apply_saga_step(&saga, None, std::slice::from_ref(&completed_event)).await?;
        Ok(())
    }

    /// Compensation (spec §4.4): completed steps, in reverse execution order.
    /// Any compensation failure quarantines the saga as Failed.
    async fn compensate(&self, mut saga: Saga, mut order: Order, reason: String) -> Result<()> {
        saga.failure_reason = Some(reason);
        saga.transition_to(SagaStatus::Compensating)?;
        self.storage.apply_saga_step(&saga, None, &[]).await?;

        let completed_indices: Vec<usize> = saga
            .steps
            .iter()
            .enumerate()
            .filter(|(_, s)| s.status == StepStatus::Completed)
            .map(|(i, _)| i)
            .collect();

        for index in completed_indices.into_iter().rev() {
            let step = self.definition.steps[index].clone();
            let step_data = saga.steps[index].data.clone();
            if !step.can_compensate(&step_data) {
                continue;
            }

            let mut ctx = StepContext {
                saga_id: saga.id,
                aggregate_id: saga.aggregate_id,
                aggregate_type: saga.aggregate_type.clone(),
                saga_data: saga.data.clone(),
                step_index: index,
                total_steps: saga.total_steps,
                previous_output: None,
                order: &mut order,
            };

            let compensation = step.compensate(&mut ctx, &step_data).await;
            drop(ctx);

            match compensation {
                Ok(output) => {
                    saga.steps[index].mark_compensated()?;
                    let order_ref = if output.order_changed { Some(&order) } else { None };
                    self.storage.apply_saga_step(&saga, order_ref, &output.events).await?;
                }
                Err(err) => {
                    saga.failure_reason = Some(format!("compensation of {} failed: {err}", step.name()));
                    saga.transition_to(SagaStatus::Failed)?;
                    self.storage.apply_saga_step(&saga, None, &[]).await?;
                    return Err(err);
                }
            }
        }

        saga.transition_to(SagaStatus::Compensated)?;
        self.storage.apply_saga_step(&saga, None, &[]).await?;
        Ok(())
    }
}
