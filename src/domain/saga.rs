//! Saga persistent execution record (spec §3, §4.4).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SagaType {
    OrderProcessing,
}

impl SagaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaType::OrderProcessing => "ORDER_PROCESSING",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum SagaStatus {
    Started,
    InProgress,
    Completed,
    Failed,
    Compensating,
    Compensated,
    Cancelled,
}

impl SagaStatus {
    /// Saga status graph from spec §4.4:
    /// `Started -> InProgress -> {Completed, Compensating}`;
    /// `Compensating -> {Compensated, Failed}`; any state -> `Cancelled`.
    pub fn can_transition_to(self, next: SagaStatus) -> bool {
        use SagaStatus::*;
        if next == Cancelled {
            return !matches!(self, Completed | Compensated | Cancelled | Failed);
        }
        matches!(
            (self, next),
            (Started, InProgress)
                | (InProgress, Completed)
                | (InProgress, Compensating)
                | (InProgress, Failed)
                | (Compensating, Compensated)
                | (Compensating, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SagaStatus::Completed | SagaStatus::Failed | SagaStatus::Compensated | SagaStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum StepStatus {
    Pending,
    Completed,
    Failed,
    Compensated,
}

/// A single step's persisted progress within a saga.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SagaStepRecord {
    pub step_name: String,
    pub status: StepStatus,
    pub data: serde_json::Value,
    pub last_error: Option<String>,
    pub retry_count: u32,
    pub executed_at: Option<DateTime<Utc>>,
    pub compensated_at: Option<DateTime<Utc>>,
}

impl SagaStepRecord {
    pub fn pending(step_name: impl Into<String>) -> Self {
        Self {
            step_name: step_name.into(),
            status: StepStatus::Pending,
            data: serde_json::Value::Null,
            last_error: None,
            retry_count: 0,
            executed_at: None,
            compensated_at: None,
        }
    }

    /// Set this step's status to `Compensated`; only valid if it was
    /// previously `Completed` (spec §3 invariant).
    pub fn mark_compensated(&mut self) -> crate::error::Result<()> {
        if self.status != StepStatus::Completed {
            return Err(crate::error::ControlPlaneError::Internal(format!(
                "step {} cannot be compensated from status {:?}",
                self.step_name, self.status
            )));
        }
        self.status = StepStatus::Compensated;
        self.compensated_at = Some(Utc::now());
        Ok(())
    }
}

/// Persistent saga execution record (spec §3, §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Saga {
    pub id: Uuid,
    pub saga_type: String,
    pub aggregate_id: Uuid,
    pub aggregate_type: String,
    pub data: serde_json::Value,
    pub steps: Vec<SagaStepRecord>,
    pub current_step: usize,
    pub total_steps: usize,
    pub status: SagaStatus,
    pub failure_reason: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub compensated_at: Option<DateTime<Utc>>,
}

impl Saga {
    pub fn start(
        saga_type: SagaType,
        aggregate_id: Uuid,
        aggregate_type: impl Into<String>,
        data: serde_json::Value,
        step_names: &[&str],
        max_retries: u32,
    ) -> Self {
        let steps: Vec<SagaStepRecord> = step_names.iter().map(|n| SagaStepRecord::pending(*n)).collect();
        Self {
            id: Uuid::new_v4(),
            saga_type: saga_type.as_str().to_string(),
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            data,
            total_steps: steps.len(),
            steps,
            current_step: 0,
            status: SagaStatus::Started,
            failure_reason: None,
            retry_count: 0,
            max_retries,
            started_at: Utc::now(),
            completed_at: None,
            failed_at: None,
            compensated_at: None,
        }
    }

    pub fn transition_to(&mut self, next: SagaStatus) -> crate::error::Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(crate::error::ControlPlaneError::Internal(format!(
                "saga {} cannot transition from {:?} to {:?}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        match next {
            SagaStatus::Completed => self.completed_at = Some(Utc::now()),
            SagaStatus::Failed => self.failed_at = Some(Utc::now()),
            SagaStatus::Compensated => self.compensated_at = Some(Utc::now()),
            _ => {}
        }
        Ok(())
    }

    /// Steps completed so far, in execution order (a prefix of the step list
    /// except during/after compensation — spec §8 invariant).
    pub fn completed_steps(&self) -> impl Iterator<Item = &SagaStepRecord> {
        self.steps.iter().filter(|s| s.status == StepStatus::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_step_never_exceeds_total() {
        let saga = Saga::start(
            SagaType::OrderProcessing,
            Uuid::new_v4(),
            "Order",
            serde_json::json!({}),
            &["ReserveInventory", "BookPartner", "ConfirmOrder"],
            0,
        );
        assert!(saga.current_step <= saga.total_steps);
        assert_eq!(saga.total_steps, 3);
    }

    #[test]
    fn status_graph_rejects_skip() {
        let mut saga = Saga::start(
            SagaType::OrderProcessing,
            Uuid::new_v4(),
            "Order",
            serde_json::json!({}),
            &["A"],
            0,
        );
        assert!(saga.transition_to(SagaStatus::Completed).is_err());
        saga.transition_to(SagaStatus::InProgress).unwrap();
        saga.transition_to(SagaStatus::Completed).unwrap();
        assert!(saga.status.is_terminal());
    }

    #[test]
    fn compensate_requires_prior_completion() {
        let mut step = SagaStepRecord::pending("ReserveInventory");
        assert!(step.mark_compensated().is_err());
        step.status = StepStatus::Completed;
        step.mark_compensated().unwrap();
        assert_eq!(step.status, StepStatus::Compensated);
    }
}
