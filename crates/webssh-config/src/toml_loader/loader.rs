//! Core TOML config loading: read from path or platform default.

use crate::schema::GatewayConfig;
use crate::validation;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{info, warn};
use webssh_common::ConfigError;

use super::paths::{create_default_config, default_config_path};

/// Load config from a specific TOML file path.
///
/// Missing fields take their serde defaults. Validation failures are logged
/// as a warning and the parsed config is returned as-is; callers that must
/// not run with invalid values validate again themselves.
pub fn load_from_path(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => ConfigError::FileNotFound(path.to_path_buf()),
        _ => ConfigError::ParseError(format!("failed to read {}: {e}", path.display())),
    })?;

    let config: GatewayConfig = toml::from_str(&content)
        .map_err(|e| ConfigError::ParseError(format!("failed to parse TOML: {e}")))?;

    if let Err(e) = validation::validate(&config) {
        warn!("config validation warning: {e}");
    }

    info!("loaded config from {}", path.display());
    Ok(config)
}

/// Load config from [`default_config_path`], writing the commented default
/// file first if nothing is there yet.
pub fn load_default() -> Result<GatewayConfig, ConfigError> {
    let path = default_config_path()?;

    match load_from_path(&path) {
        Ok(config) => Ok(config),
        Err(ConfigError::FileNotFound(_)) => {
            info!("no config found at {}, creating default", path.display());
            create_default_config(&path)?;
            Ok(GatewayConfig::default())
        }
        Err(e) => Err(e),
    }
}
