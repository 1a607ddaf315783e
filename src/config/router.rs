//! Resilient Request Router configuration (spec §4.3, §4.1).

use std::collections::HashMap;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Per-request timeout to a backend service, in seconds.
    pub default_timeout_secs: u64,
    /// Retries after a retryable failure, before giving up (spec §4.3 step 5).
    pub max_retries: u32,
    /// Logged as an SLA violation when a proxied call exceeds this, in ms.
    pub sla_threshold_ms: u64,
    /// Max entries kept in the response cache (LRU eviction beyond this).
    pub cache_max_entries: usize,
    /// Default cache TTL for cacheable GETs, in seconds; 0 disables caching.
    pub cache_default_ttl_secs: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: 10,
            max_retries: 2,
            sla_threshold_ms: 2000,
            cache_max_entries: 1000,
            cache_default_ttl_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub cooldown_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            cooldown_secs: 60,
        }
    }
}

/// Seed endpoints for service discovery: service name -> base URLs.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub services: HashMap<String, Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circuit_breaker_defaults_match_spec() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.success_threshold, 3);
        assert_eq!(config.cooldown_secs, 60);
    }
}
