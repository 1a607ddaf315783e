//! Application configuration.
//!
//! Aggregates every module's configuration into one `Config` struct, loaded
//! from a YAML file and overlaid with `ORDERCP_`-prefixed environment
//! variables (spec §B).

mod bus;
mod outbox;
mod router;
mod server;
mod storage;

pub use bus::{BusBackend, BusConfig};
pub use outbox::OutboxConfig;
pub use router::{CircuitBreakerConfig, DiscoveryConfig, RouterConfig};
pub use server::ServerConfig;
pub use storage::{StorageBackend, StorageConfig};

use serde::Deserialize;

/// Default configuration file name, read from the current directory if present.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable naming an additional, required config file.
pub const CONFIG_ENV_VAR: &str = "ORDERCP_CONFIG";
/// Prefix for configuration environment variables (e.g. `ORDERCP__SERVER__PORT`).
pub const CONFIG_ENV_PREFIX: &str = "ORDERCP";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub router: RouterConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub discovery: DiscoveryConfig,
    pub outbox: OutboxConfig,
    pub bus: BusConfig,
}

impl Config {
    /// Load configuration from `config.yaml` in the current directory (if
    /// present), an optional explicit path, and environment variables —
    /// later sources win.
    pub fn load(path: Option<&str>) -> Result<Self, Box<dyn std::error::Error>> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new("config", FileFormat::Yaml).required(false))
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        Ok(config)
    }

    /// Configuration for tests and the zero-setup standalone profile.
    pub fn for_test() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_in_memory_standalone_profile() {
        let config = Config::for_test();
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.bus.backend, BusBackend::Channel);
        assert!(!config.server.auth_enabled);
    }
}
