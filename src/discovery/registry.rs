//! Endpoint bookkeeping shared by all `ServiceDiscovery` implementations.

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("service not registered: {0}")]
    ServiceNotFound(String),
}

/// A single discovered endpoint (spec §3 "Service endpoint").
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEndpoint {
    pub service_name: String,
    pub url: String,
    pub healthy: bool,
    pub last_check: Option<DateTime<Utc>>,
}

impl ServiceEndpoint {
    pub fn new(service_name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            url: url.into(),
            // Endpoints start healthy; the prober corrects this within one
            // interval if that turns out to be wrong.
            healthy: true,
            last_check: None,
        }
    }
}

/// Result of a successful resolution, tagged when discovery is in degraded
/// mode (no healthy endpoint was available and the first configured one was
/// used instead) so the router can surface that to callers (spec §4.2).
#[derive(Debug, Clone)]
pub struct ResolvedEndpoint {
    pub url: String,
    pub degraded: bool,
}
