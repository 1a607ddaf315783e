//! HTTP server and auth configuration.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind the gateway's HTTP listener to.
    pub host: String,
    /// Port the gateway listens on.
    pub port: u16,
    /// Require a bearer token on every route except `/health*`. Off by
    /// default so the standalone/dev profile needs no setup.
    pub auth_enabled: bool,
    /// Opaque bearer token accepted when `auth_enabled` is set.
    pub auth_token: Option<String>,
    /// Origins allowed by the CORS layer; empty means same-origin only.
    pub cors_allowed_origins: Vec<String>,
    /// Emit JSON-formatted logs (production) instead of human-readable ones.
    pub json_logs: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            auth_enabled: false,
            auth_token: None,
            cors_allowed_origins: Vec::new(),
            json_logs: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_disable_auth() {
        let config = ServerConfig::default();
        assert!(!config.auth_enabled);
        assert_eq!(config.port, 8080);
    }
}
