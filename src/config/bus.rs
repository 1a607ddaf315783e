//! Event bus backend selection (spec §4.6).

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusBackend {
    /// In-process channel bus; events don't survive a restart. Used for
    /// tests and the standalone profile.
    Channel,
    Amqp,
}

impl Default for BusBackend {
    fn default() -> Self {
        BusBackend::Channel
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub backend: BusBackend,
    /// AMQP connection URI; required when `backend` is `amqp`.
    pub amqp_uri: Option<String>,
    /// Exchange events are published to.
    pub exchange: String,
    /// Dead-letter exchange for events that exhaust `OutboxConfig::max_retries`.
    pub dlq_exchange: String,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            backend: BusBackend::default(),
            amqp_uri: None,
            exchange: "order-control-plane.events".to_string(),
            dlq_exchange: "order-control-plane.dlq".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_channel_backend() {
        let config = BusConfig::default();
        assert_eq!(config.backend, BusBackend::Channel);
    }
}
