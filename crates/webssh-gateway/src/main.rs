//! webssh: browser terminal gateway.
//!
//! Accepts WebSocket channels from a browser terminal, opens an SSH shell
//! on the host each channel asks for, and bridges keystrokes, output and
//! window resizes between the two until either side goes away.

mod bridge;
mod error;
mod listener;
mod protocol;
mod shell;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use webssh_common::GatewayError;
use webssh_config::{GatewayConfig, LogLevel};

use crate::bridge::{BridgeContext, BridgeSettings};
use crate::listener::Gateway;
use crate::shell::ssh::RusshConnector;

#[derive(Parser, Debug)]
#[command(name = "webssh", about = "WebSocket to SSH gateway for browser terminals")]
struct Args {
    /// Config file (defaults to the platform config dir).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Interface to bind, overriding the config file.
    #[arg(long)]
    bind: Option<String>,

    /// Port to listen on, overriding the config file.
    #[arg(short, long)]
    port: Option<u16>,

    /// trace, debug, info, warn or error.
    #[arg(long)]
    log_level: Option<LogLevel>,
}

impl Args {
    fn apply(&self, config: &mut GatewayConfig) {
        if let Some(bind) = &self.bind {
            config.server.bind = bind.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(e) = run(args).await {
        tracing::error!(error = %e, "webssh exited with an error");
        eprintln!("webssh: {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), GatewayError> {
    let mut config = match &args.config {
        Some(path) => webssh_config::load_config_from(path)?,
        None => webssh_config::load_config()?,
    };
    args.apply(&mut config);
    webssh_config::validation::validate(&config)?;

    init_logging(&config)?;

    let keepalive = match config.ssh.keepalive_interval_secs {
        0 => None,
        secs => Some(Duration::from_secs(u64::from(secs))),
    };
    let connector = RusshConnector::new(keepalive);
    let ctx = BridgeContext::new(Arc::new(connector), BridgeSettings::from_config(&config));

    let gateway = Gateway::bind(&config.server, ctx).await?;
    tracing::info!(
        addr = %gateway.local_addr()?,
        path = %config.server.ws_path,
        "webssh listening"
    );

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received");
        signal_token.cancel();
    });

    gateway.serve(shutdown).await;
    Ok(())
}

fn init_logging(config: &GatewayConfig) -> Result<(), GatewayError> {
    let level = config.logging.level.as_str();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("webssh={level},webssh_config={level}").into()),
        )
        .with_ansi(config.logging.ansi)
        .try_init()
        .map_err(|e| GatewayError::Logging(e.to_string()))
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Ctrl-C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
