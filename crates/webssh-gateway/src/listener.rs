//! TCP listener: upgrades requests on the configured path and runs one
//! bridge per channel.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use webssh_common::GatewayError;
use webssh_config::ServerConfig;

use crate::bridge::{handle_connection, BridgeContext};

pub struct Gateway {
    listener: TcpListener,
    ws_path: String,
    ctx: BridgeContext,
    shutdown_grace: Duration,
}

impl Gateway {
    pub async fn bind(config: &ServerConfig, ctx: BridgeContext) -> Result<Self, GatewayError> {
        let addr = config.listen_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| GatewayError::Bind {
                addr: addr.clone(),
                source,
            })?;

        Ok(Self {
            listener,
            ws_path: config.ws_path.clone(),
            ctx,
            shutdown_grace: Duration::from_secs(u64::from(config.shutdown_grace_secs)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, GatewayError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept channels until `shutdown` fires, then give open bridges the
    /// grace period to release their shells before aborting them.
    pub async fn serve(self, shutdown: CancellationToken) {
        let mut bridges = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let ctx = self.ctx.clone();
                        let ws_path = self.ws_path.clone();
                        let token = shutdown.child_token();
                        bridges.spawn(async move {
                            let check = move |req: &Request, resp: Response| check_path(&ws_path, req, resp);
                            match accept_hdr_async(stream, check).await {
                                Ok(ws) => handle_connection(ws, peer, ctx, token).await,
                                Err(e) => debug!(peer = %peer, error = %e, "WS handshake failed"),
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "TCP accept error"),
                },
                Some(done) = bridges.join_next(), if !bridges.is_empty() => {
                    if let Err(e) = done {
                        warn!(error = %e, "Bridge task failed");
                    }
                }
            }
        }

        info!(open = bridges.len(), "Shutdown requested, waiting for open bridges");
        let drained = tokio::time::timeout(self.shutdown_grace, async {
            while bridges.join_next().await.is_some() {}
        })
        .await
        .is_ok();
        if !drained {
            warn!(open = bridges.len(), "Bridges still open after grace period, aborting");
            bridges.abort_all();
        }
        info!("Gateway stopped");
    }
}

fn check_path(ws_path: &str, request: &Request, response: Response) -> Result<Response, ErrorResponse> {
    if request.uri().path() == ws_path {
        return Ok(response);
    }
    debug!(path = %request.uri().path(), "Rejecting upgrade on unknown path");
    let mut rejection = ErrorResponse::new(Some("not found".into()));
    *rejection.status_mut() = StatusCode::NOT_FOUND;
    Err(rejection)
}
