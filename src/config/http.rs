//! HTTP API server configuration

use serde::{Deserialize, Serialize};

/// Public API surface tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Enable the HTTP API server
    pub enabled: bool,
    /// Listen address, e.g. "127.0.0.1:8080"
    pub listen_addr: String,
    /// Enable permissive CORS for browser clients
    pub cors_enabled: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: "127.0.0.1:8080".to_string(),
            cors_enabled: false,
        }
    }
}
