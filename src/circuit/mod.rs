//! Circuit Breaker Registry (spec §4.1).
//!
//! One independent circuit per service name, created lazily on first call and
//! never destroyed. State transitions are decided at call time and are
//! linearisable per service name: a caller that observes `Open` never invokes
//! the guarded operation (spec §5).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::ControlPlaneError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            cooldown: Duration::from_secs(60),
        }
    }
}

/// Per-service circuit state, serialised behind an internal mutex so that the
/// closed -> open (and half-open -> closed/open) transitions are atomic with
/// respect to concurrent callers on the same service.
struct Circuit {
    state: CircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    last_failure: Option<DateTime<Utc>>,
    last_success: Option<DateTime<Utc>>,
}

impl Circuit {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            half_open_successes: 0,
            last_failure: None,
            last_success: None,
        }
    }
}

/// Snapshot of a circuit's state, for observability endpoints.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitSnapshot {
    pub service: String,
    pub state: String,
    pub consecutive_failures: u32,
}

/// Registry of independent circuits, keyed by service name.
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    circuits: Mutex<HashMap<String, Arc<Mutex<Circuit>>>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            circuits: Mutex::new(HashMap::new()),
        }
    }

    async fn circuit_for(&self, service: &str) -> Arc<Mutex<Circuit>> {
        let mut circuits = self.circuits.lock().await;
        circuits
            .entry(service.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Circuit::new())))
            .clone()
    }

    /// Run `operation` through the circuit for `service`. Returns
    /// `ControlPlaneError::CircuitOpen` without invoking `operation` if the
    /// circuit is open (spec §4.1, §8 boundary behaviour).
    pub async fn execute<F, Fut, T>(&self, service: &str, operation: F) -> Result<T, ControlPlaneError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, ControlPlaneError>>,
    {
        let circuit = self.circuit_for(service).await;

        // Decide whether to allow the call, transitioning Open -> HalfOpen if
        // the cooldown has elapsed. This check-and-maybe-transition happens
        // while holding the per-circuit lock, so it is atomic per service.
        {
            let mut guard = circuit.lock().await;
            match guard.state {
                CircuitState::Open => {
                    let elapsed = guard
                        .last_failure
                        .map(|t| Utc::now().signed_duration_since(t))
                        .unwrap_or_default();
                    if elapsed.to_std().unwrap_or_default() >= self.config.cooldown {
                        info!(service, "circuit cooldown elapsed, transitioning to half-open");
                        guard.state = CircuitState::HalfOpen;
                        guard.half_open_successes = 0;
                    } else {
                        return Err(ControlPlaneError::CircuitOpen {
                            service: service.to_string(),
                            retry_after_secs: self.config.cooldown.as_secs(),
                        });
                    }
                }
                CircuitState::Closed | CircuitState::HalfOpen => {}
            }
        }

        let result = operation().await;

        let mut guard = circuit.lock().await;
        match &result {
            Ok(_) => match guard.state {
                CircuitState::Closed => {
                    guard.consecutive_failures = 0;
                    guard.last_success = Some(Utc::now());
                }
                CircuitState::HalfOpen => {
                    guard.half_open_successes += 1;
                    guard.last_success = Some(Utc::now());
                    if guard.half_open_successes >= self.config.success_threshold {
                        info!(service, "circuit closing after successful half-open probes");
                        guard.state = CircuitState::Closed;
                        guard.consecutive_failures = 0;
                        guard.half_open_successes = 0;
                    }
                }
                CircuitState::Open => {}
            },
            Err(_) => {
                guard.last_failure = Some(Utc::now());
                match guard.state {
                    CircuitState::Closed => {
                        guard.consecutive_failures += 1;
                        if guard.consecutive_failures >= self.config.failure_threshold {
                            warn!(service, failures = guard.consecutive_failures, "circuit opening");
                            guard.state = CircuitState::Open;
                        }
                    }
                    CircuitState::HalfOpen => {
                        warn!(service, "half-open probe failed, reopening circuit");
                        guard.state = CircuitState::Open;
                        guard.half_open_successes = 0;
                    }
                    CircuitState::Open => {}
                }
            }
        }
        debug!(service, state = ?guard.state, "circuit breaker call complete");

        result
    }

    pub async fn snapshot(&self) -> Vec<CircuitSnapshot> {
        let circuits = self.circuits.lock().await;
        let mut out = Vec::with_capacity(circuits.len());
        for (name, circuit) in circuits.iter() {
            let guard = circuit.lock().await;
            out.push(CircuitSnapshot {
                service: name.clone(),
                state: format!("{:?}", guard.state),
                consecutive_failures: guard.consecutive_failures,
            });
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> CircuitBreakerRegistry {
        CircuitBreakerRegistry::new(CircuitBreakerConfig {
            failure_threshold: 5,
            success_threshold: 3,
            cooldown: Duration::from_millis(50),
        })
    }

    async fn fail() -> Result<(), ControlPlaneError> {
        Err(ControlPlaneError::Upstream5xx {
            service: "optimization-service".to_string(),
            status: 500,
            message: "boom".to_string(),
        })
    }

    async fn succeed() -> Result<(), ControlPlaneError> {
        Ok(())
    }

    #[tokio::test]
    async fn threshold_minus_one_failures_leave_circuit_closed() {
        let reg = registry();
        for _ in 0..4 {
            let _ = reg.execute("svc", fail).await;
        }
        let snap = reg.snapshot().await;
        assert_eq!(snap[0].state, "Closed");
    }

    #[tokio::test]
    async fn fifth_consecutive_failure_opens_circuit() {
        let reg = registry();
        for _ in 0..5 {
            let _ = reg.execute("optimization-service", fail).await;
        }
        let snap = reg.snapshot().await;
        assert_eq!(snap[0].state, "Open");

        // Sixth call fails fast without invoking the operation.
        let invoked = std::sync::atomic::AtomicBool::new(false);
        let result = reg
            .execute("optimization-service", || async {
                invoked.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok::<(), ControlPlaneError>(())
            })
            .await;
        assert!(matches!(result, Err(ControlPlaneError::CircuitOpen { .. })));
        assert!(!invoked.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn cooldown_then_three_successes_closes_circuit() {
        let reg = registry();
        for _ in 0..5 {
            let _ = reg.execute("svc", fail).await;
        }
        tokio::time::sleep(Duration::from_millis(60)).await;

        for i in 0..3 {
            let result = reg.execute("svc", succeed).await;
            assert!(result.is_ok(), "call {i} should succeed in half-open");
        }
        let snap = reg.snapshot().await;
        assert_eq!(snap[0].state, "Closed");
    }

    #[tokio::test]
    async fn half_open_failure_reopens_circuit() {
        let reg = registry();
        for _ in 0..5 {
            let _ = reg.execute("svc", fail).await;
        }
        tokio::time::sleep(Duration::from_millis(60)).await;

        let _ = reg.execute("svc", fail).await;
        let snap = reg.snapshot().await;
        assert_eq!(snap[0].state, "Open");
    }
}
