//! Service Discovery (spec §4.2).
//!
//! Maps a logical service name to a healthy endpoint URL. Endpoints are
//! preloaded from configuration; a background prober flips `healthy` on
//! status transitions. Selection is uniformly random among healthy
//! endpoints, falling back to the first configured endpoint (tagged
//! degraded) when none are healthy.

mod registry;
mod static_discovery;

pub use registry::{DiscoveryError, ResolvedEndpoint, ServiceEndpoint};
pub use static_discovery::StaticServiceDiscovery;

use async_trait::async_trait;

/// Service discovery contract (spec §4.2: `resolve`, `addEndpoint`/`removeEndpoint`).
#[async_trait]
pub trait ServiceDiscovery: Send + Sync {
    /// Resolve a logical service name to an endpoint URL.
    async fn resolve(&self, service_name: &str) -> Result<ResolvedEndpoint, DiscoveryError>;

    /// Register a new endpoint URL for a service. Duplicate URLs are a no-op.
    async fn add_endpoint(&self, service_name: &str, url: &str);

    /// Remove an endpoint URL for a service.
    async fn remove_endpoint(&self, service_name: &str, url: &str);

    /// List all currently known endpoints, for admin/observability routes.
    async fn list_endpoints(&self) -> Vec<ServiceEndpoint>;
}
