//! Full configuration validation.
//!
//! Each section has its own check; all errors are collected into a single
//! `ConfigError` so one run reports every problem.

mod helpers;


use crate::schema::GatewayConfig;
use helpers::validate_range;
use webssh_common::ConfigError;

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &GatewayConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    validate_server(&mut errors, config);
    validate_ssh(&mut errors, config);
    validate_terminal(&mut errors, config);
    validate_bridge(&mut errors, config);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}

fn validate_server(errors: &mut Vec<String>, config: &GatewayConfig) {
    if config.server.bind.trim().is_empty() {
        errors.push("server.bind must not be empty".into());
    }
    if !config.server.ws_path.starts_with('/') {
        errors.push(format!(
            "server.ws_path = {:?} must start with '/'",
            config.server.ws_path
        ));
    }
    validate_range(
        errors,
        "server.shutdown_grace_secs",
        config.server.shutdown_grace_secs,
        0,
        300,
    );
}

fn validate_ssh(errors: &mut Vec<String>, config: &GatewayConfig) {
    validate_range(
        errors,
        "ssh.connect_timeout_secs",
        config.ssh.connect_timeout_secs,
        1,
        120,
    );
    validate_range(
        errors,
        "ssh.default_port",
        u32::from(config.ssh.default_port),
        1,
        65535,
    );
    validate_range(
        errors,
        "ssh.keepalive_interval_secs",
        config.ssh.keepalive_interval_secs,
        0,
        3600,
    );
}

fn validate_terminal(errors: &mut Vec<String>, config: &GatewayConfig) {
    if config.terminal.term.trim().is_empty() {
        errors.push("terminal.term must not be empty".into());
    }
    validate_range(errors, "terminal.rows", config.terminal.rows, 1, 1000);
    validate_range(errors, "terminal.cols", config.terminal.cols, 1, 1000);
}

fn validate_bridge(errors: &mut Vec<String>, config: &GatewayConfig) {
    validate_range(
        errors,
        "bridge.outbound_queue",
        config.bridge.outbound_queue,
        1,
        65536,
    );
    validate_range(
        errors,
        "bridge.read_buffer_size",
        config.bridge.read_buffer_size,
        512,
        1_048_576,
    );
    validate_range(
        errors,
        "bridge.drain_timeout_ms",
        config.bridge.drain_timeout_ms,
        0,
        60_000,
    );
}
