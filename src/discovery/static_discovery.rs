//! Configuration-seeded service discovery with a background health prober
//! (spec §4.2).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::{DiscoveryError, ResolvedEndpoint, ServiceDiscovery, ServiceEndpoint};

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);
const PROBE_INTERVAL: Duration = Duration::from_secs(30);

/// Service discovery backed by endpoints preloaded from configuration, kept
/// fresh by a background prober task that hits `<url>/health` every 30s.
pub struct StaticServiceDiscovery {
    endpoints: Arc<RwLock<HashMap<String, Vec<ServiceEndpoint>>>>,
    http: reqwest::Client,
}

impl StaticServiceDiscovery {
    pub fn new(seed: HashMap<String, Vec<String>>) -> Self {
        let mut endpoints = HashMap::new();
        for (service, urls) in seed {
            endpoints.insert(
                service.clone(),
                urls.into_iter().map(|u| ServiceEndpoint::new(&service, u)).collect(),
            );
        }
        Self {
            endpoints: Arc::new(RwLock::new(endpoints)),
            http: reqwest::Client::builder()
                .timeout(HEALTH_CHECK_TIMEOUT)
                .build()
                .expect("reqwest client builds with static config"),
        }
    }

    /// Spawn the background prober loop. Returns a handle the caller may
    /// abort on shutdown.
    pub fn spawn_prober(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(PROBE_INTERVAL);
            loop {
                interval.tick().await;
                this.probe_all().await;
            }
        })
    }

    async fn probe_all(&self) {
        let targets: Vec<(String, String)> = {
            let endpoints = self.endpoints.read().await;
            endpoints
                .values()
                .flatten()
                .map(|e| (e.service_name.clone(), e.url.clone()))
                .collect()
        };

        for (service_name, url) in targets {
            let healthy = self.probe_one(&url).await;
            self.update_health(&service_name, &url, healthy).await;
        }
    }

    async fn probe_one(&self, url: &str) -> bool {
        match self.http.get(format!("{url}/health")).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    async fn update_health(&self, service_name: &str, url: &str, healthy: bool) {
        let mut endpoints = self.endpoints.write().await;
        if let Some(list) = endpoints.get_mut(service_name) {
            if let Some(endpoint) = list.iter_mut().find(|e| e.url == url) {
                if endpoint.healthy != healthy {
                    info!(service = service_name, url, healthy, "endpoint health transition");
                }
                endpoint.healthy = healthy;
                endpoint.last_check = Some(chrono::Utc::now());
            }
        }
    }
}

#[async_trait]
impl ServiceDiscovery for StaticServiceDiscovery {
    async fn resolve(&self, service_name: &str) -> Result<ResolvedEndpoint, DiscoveryError> {
        let endpoints = self.endpoints.read().await;
        let list = endpoints
            .get(service_name)
            .ok_or_else(|| DiscoveryError::ServiceNotFound(service_name.to_string()))?;

        if list.is_empty() {
            return Err(DiscoveryError::ServiceNotFound(service_name.to_string()));
        }

        let healthy: Vec<&ServiceEndpoint> = list.iter().filter(|e| e.healthy).collect();
        if let Some(chosen) = healthy.choose(&mut rand::thread_rng()) {
            return Ok(ResolvedEndpoint {
                url: chosen.url.clone(),
                degraded: false,
            });
        }

        warn!(service = service_name, "no healthy endpoints, falling back to first configured");
        Ok(ResolvedEndpoint {
            url: list[0].url.clone(),
            degraded: true,
        })
    }

    async fn add_endpoint(&self, service_name: &str, url: &str) {
        let mut endpoints = self.endpoints.write().await;
        let list = endpoints.entry(service_name.to_string()).or_default();
        if list.iter().any(|e| e.url == url) {
            return; // duplicate URL is a no-op
        }
        list.push(ServiceEndpoint::new(service_name, url));
    }

    async fn remove_endpoint(&self, service_name: &str, url: &str) {
        let mut endpoints = self.endpoints.write().await;
        if let Some(list) = endpoints.get_mut(service_name) {
            list.retain(|e| e.url != url);
        }
    }

    async fn list_endpoints(&self) -> Vec<ServiceEndpoint> {
        let endpoints = self.endpoints.read().await;
        endpoints.values().flatten().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed() -> HashMap<String, Vec<String>> {
        let mut m = HashMap::new();
        m.insert(
            "inventory-service".to_string(),
            vec!["http://inventory-1:8080".to_string(), "http://inventory-2:8080".to_string()],
        );
        m
    }

    #[tokio::test]
    async fn resolves_among_healthy() {
        let discovery = StaticServiceDiscovery::new(seed());
        let resolved = discovery.resolve("inventory-service").await.unwrap();
        assert!(!resolved.degraded);
        assert!(resolved.url.starts_with("http://inventory-"));
    }

    #[tokio::test]
    async fn unknown_service_errors() {
        let discovery = StaticServiceDiscovery::new(seed());
        let err = discovery.resolve("unknown").await.unwrap_err();
        assert!(matches!(err, DiscoveryError::ServiceNotFound(_)));
    }

    #[tokio::test]
    async fn degraded_fallback_when_none_healthy() {
        let discovery = StaticServiceDiscovery::new(seed());
        discovery.update_health("inventory-service", "http://inventory-1:8080", false).await;
        discovery.update_health("inventory-service", "http://inventory-2:8080", false).await;

        let resolved = discovery.resolve("inventory-service").await.unwrap();
        assert!(resolved.degraded);
        assert_eq!(resolved.url, "http://inventory-1:8080");
    }

    #[tokio::test]
    async fn add_duplicate_url_is_noop() {
        let discovery = StaticServiceDiscovery::new(seed());
        discovery.add_endpoint("inventory-service", "http://inventory-1:8080").await;
        let endpoints = discovery.list_endpoints().await;
        let count = endpoints.iter().filter(|e| e.url == "http://inventory-1:8080").count();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn remove_endpoint_drops_it() {
        let discovery = StaticServiceDiscovery::new(seed());
        discovery.remove_endpoint("inventory-service", "http://inventory-1:8080").await;
        let endpoints = discovery.list_endpoints().await;
        assert!(!endpoints.iter().any(|e| e.url == "http://inventory-1:8080"));
    }
}
