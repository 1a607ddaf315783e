//! Error taxonomy shared across the gateway, saga coordinator, and relay.
//!
//! Every fallible operation in this crate returns a `Result<T, ControlPlaneError>`
//! (or a narrower module error that converts into it via `#[from]`). Each variant
//! carries the HTTP status and retry semantics from spec §7 so the gateway layer
//! never has to re-derive them.

use std::fmt;

use serde::Serialize;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, ControlPlaneError>;

/// The error taxonomy from spec §7.
#[derive(Debug, thiserror::Error)]
pub enum ControlPlaneError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("unauthorized: {0}")]
    Auth(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("timeout talking to {service}: {message}")]
    Timeout { service: String, message: String },

    #[error("upstream {status} from {service}: {message}")]
    Upstream5xx {
        service: String,
        status: u16,
        message: String,
    },

    #[error("upstream {status} from {service}: {message}")]
    Upstream4xx {
        service: String,
        status: u16,
        message: String,
    },

    #[error("circuit open for {service}, retry after {retry_after_secs}s")]
    CircuitOpen {
        service: String,
        retry_after_secs: u64,
    },

    #[error("network error talking to {service}: {message}")]
    Network { service: String, message: String },

    #[error("internal invariant violated: {0}")]
    Internal(String),
}

/// Coarse classification used for metrics and retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorClass {
    Upstream4xx,
    Upstream5xx,
    Timeout,
    Network,
    CircuitOpen,
    Validation,
    Auth,
    NotFound,
    Conflict,
    Internal,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Retry advice surfaced to callers of the gateway.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryAdvice {
    pub retryable: bool,
    pub retry_after_seconds: Option<u64>,
    pub reason: String,
}

impl ControlPlaneError {
    /// HTTP status code this error should be rendered as (§7).
    pub fn status_code(&self) -> u16 {
        match self {
            ControlPlaneError::Validation(_) => 400,
            ControlPlaneError::Auth(_) => 401,
            ControlPlaneError::NotFound(_) => 404,
            ControlPlaneError::Conflict(_) => 409,
            ControlPlaneError::Timeout { .. } => 504,
            ControlPlaneError::Upstream5xx { status, .. } => {
                if *status == 501 {
                    502
                } else {
                    *status
                }
            }
            ControlPlaneError::Upstream4xx { status, .. } => *status,
            ControlPlaneError::CircuitOpen { .. } => 503,
            ControlPlaneError::Network { .. } => 503,
            ControlPlaneError::Internal(_) => 500,
        }
    }

    /// Coarse error class, used for metrics and for the RRR's own retry loop.
    pub fn class(&self) -> ErrorClass {
        match self {
            ControlPlaneError::Validation(_) => ErrorClass::Validation,
            ControlPlaneError::Auth(_) => ErrorClass::Auth,
            ControlPlaneError::NotFound(_) => ErrorClass::NotFound,
            ControlPlaneError::Conflict(_) => ErrorClass::Conflict,
            ControlPlaneError::Timeout { .. } => ErrorClass::Timeout,
            ControlPlaneError::Upstream5xx { .. } => ErrorClass::Upstream5xx,
            ControlPlaneError::Upstream4xx { .. } => ErrorClass::Upstream4xx,
            ControlPlaneError::CircuitOpen { .. } => ErrorClass::CircuitOpen,
            ControlPlaneError::Network { .. } => ErrorClass::Network,
            ControlPlaneError::Internal(_) => ErrorClass::Internal,
        }
    }

    /// Whether a caller could reasonably retry this exact error (§7 propagation policy).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ControlPlaneError::Timeout { .. }
                | ControlPlaneError::Upstream5xx { .. }
                | ControlPlaneError::CircuitOpen { .. }
                | ControlPlaneError::Network { .. }
        )
    }

    pub fn retry_advice(&self) -> RetryAdvice {
        match self {
            ControlPlaneError::CircuitOpen {
                retry_after_secs, ..
            } => RetryAdvice {
                retryable: true,
                retry_after_seconds: Some(*retry_after_secs),
                reason: "circuit_open".to_string(),
            },
            ControlPlaneError::Timeout { .. } => RetryAdvice {
                retryable: true,
                retry_after_seconds: Some(1),
                reason: "timeout".to_string(),
            },
            ControlPlaneError::Upstream5xx { .. } => RetryAdvice {
                retryable: true,
                retry_after_seconds: Some(1),
                reason: "upstream_error".to_string(),
            },
            ControlPlaneError::Network { .. } => RetryAdvice {
                retryable: true,
                retry_after_seconds: Some(1),
                reason: "network_error".to_string(),
            },
            other => RetryAdvice {
                retryable: false,
                retry_after_seconds: None,
                reason: other.class().to_string(),
            },
        }
    }
}

/// Outbound error envelope shape from spec §6.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    pub status_code: u16,
    pub error: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub path: String,
    pub method: String,
    pub correlation_id: String,
    pub gateway: &'static str,
    pub retry: RetryAdvice,
}

impl ErrorEnvelope {
    pub fn new(
        err: &ControlPlaneError,
        path: impl Into<String>,
        method: impl Into<String>,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self {
            status_code: err.status_code(),
            error: err.class().to_string(),
            message: err.to_string(),
            details: None,
            timestamp: chrono::Utc::now(),
            path: path.into(),
            method: method.into(),
            correlation_id: correlation_id.into(),
            gateway: "order-control-plane",
            retry: err.retry_advice(),
        }
    }
}
