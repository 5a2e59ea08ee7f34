//! Configuration schema types for the gateway.
//!
//! All structs use `serde(default)` so partial configs work correctly.

mod bridge;
mod logging;
mod server;
mod ssh;
mod terminal;

pub use bridge::*;
pub use logging::*;
pub use server::*;
pub use ssh::*;
pub use terminal::*;

use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Root configuration for the gateway.
///
/// Only override what you want to change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub ssh: SshConfig,
    pub terminal: TerminalConfig,
    pub bridge: BridgeConfig,
    pub logging: LoggingConfig,
}
