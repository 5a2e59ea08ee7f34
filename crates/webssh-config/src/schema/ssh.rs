use serde::{Deserialize, Serialize};

/// Outbound SSH connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    /// Upper bound on dial + handshake + authentication, in seconds (valid range: 1-120).
    pub connect_timeout_secs: u32,
    /// Port used when a connect request carries port 0.
    pub default_port: u16,
    /// Keep-alive interval in seconds; 0 disables keep-alives (valid range: 0-3600).
    pub keepalive_interval_secs: u32,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            default_port: 22,
            keepalive_interval_secs: 30,
        }
    }
}
