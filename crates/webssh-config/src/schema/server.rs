use serde::{Deserialize, Serialize};

/// Listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind.
    pub bind: String,
    /// TCP port to listen on.
    pub port: u16,
    /// The only path that accepts the WebSocket upgrade.
    pub ws_path: String,
    /// Seconds to wait for open bridges after shutdown is requested (valid range: 0-300).
    pub shutdown_grace_secs: u32,
}

impl ServerConfig {
    /// `bind:port`, bracketing IPv6 literals.
    pub fn listen_addr(&self) -> String {
        if self.bind.contains(':') && !self.bind.starts_with('[') {
            format!("[{}]:{}", self.bind, self.port)
        } else {
            format!("{}:{}", self.bind, self.port)
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 8080,
            ws_path: "/ws".into(),
            shutdown_grace_secs: 5,
        }
    }
}
