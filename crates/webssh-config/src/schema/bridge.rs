use serde::{Deserialize, Serialize};

/// Per-connection bridge tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Responses buffered towards the browser before producers wait (valid range: 1-65536).
    pub outbound_queue: u32,
    /// Bytes read from shell output per chunk (valid range: 512-1048576).
    pub read_buffer_size: u32,
    /// Milliseconds teardown waits for output forwarders to drain (valid range: 0-60000).
    pub drain_timeout_ms: u32,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            outbound_queue: 256,
            read_buffer_size: 8192,
            drain_timeout_ms: 2000,
        }
    }
}
