//! Per-connection session bridge: browser channel on one side, one remote
//! shell on the other.

mod forward;
mod outbound;
mod session;


use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use webssh_common::SessionId;
use webssh_config::GatewayConfig;

use crate::error::BridgeError;
use crate::shell::{PtyRequest, ShellConnector, TerminalMode};

use self::session::Session;

/// Tunables applied to every bridge.
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    pub connect_timeout: Duration,
    pub default_port: u16,
    pub term: String,
    pub default_rows: u32,
    pub default_cols: u32,
    pub modes: Vec<(TerminalMode, u32)>,
    pub outbound_queue: usize,
    pub read_buffer_size: usize,
    pub drain_timeout: Duration,
}

impl BridgeSettings {
    pub fn from_config(config: &GatewayConfig) -> Self {
        let baud = config.terminal.baud;
        Self {
            connect_timeout: Duration::from_secs(u64::from(config.ssh.connect_timeout_secs)),
            default_port: config.ssh.default_port,
            term: config.terminal.term.clone(),
            default_rows: config.terminal.rows,
            default_cols: config.terminal.cols,
            modes: vec![
                (TerminalMode::Echo, u32::from(config.terminal.echo)),
                (TerminalMode::InputSpeed, baud),
                (TerminalMode::OutputSpeed, baud),
            ],
            outbound_queue: config.bridge.outbound_queue as usize,
            read_buffer_size: config.bridge.read_buffer_size as usize,
            drain_timeout: Duration::from_millis(u64::from(config.bridge.drain_timeout_ms)),
        }
    }

    /// PTY request for a client-supplied geometry, falling back to the default size.
    ///
    /// This departs from always requesting 40x120: a geometry carried by the
    /// `connect` message wins when both dimensions are non-zero.
    pub fn pty_request(&self, geometry: Option<(u32, u32)>) -> PtyRequest {
        let (rows, cols) = geometry.unwrap_or((self.default_rows, self.default_cols));
        PtyRequest {
            term: self.term.clone(),
            rows,
            cols,
            modes: self.modes.clone(),
        }
    }
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self::from_config(&GatewayConfig::default())
    }
}

/// Everything a bridge needs besides its channel. Cheap to clone.
#[derive(Clone)]
pub struct BridgeContext {
    pub connector: Arc<dyn ShellConnector>,
    pub settings: Arc<BridgeSettings>,
}

impl BridgeContext {
    pub fn new(connector: Arc<dyn ShellConnector>, settings: BridgeSettings) -> Self {
        Self {
            connector,
            settings: Arc::new(settings),
        }
    }
}

/// Run one bridge until the channel ends or `shutdown` fires.
///
/// Malformed frames and remote-shell failures are reported to the browser
/// and the loop continues; only a channel read failure ends it. A shell whose
/// output streams have both ended is released, and the channel may `connect`
/// again. All shell resources are released before this returns.
pub async fn handle_connection<S>(
    ws: WebSocketStream<S>,
    peer: SocketAddr,
    ctx: BridgeContext,
    shutdown: CancellationToken,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let id = SessionId::new();
    let drain_timeout = ctx.settings.drain_timeout;
    let (sink, mut stream) = ws.split();
    let (outbound, writer) = outbound::spawn_writer(sink, ctx.settings.outbound_queue, peer);
    let mut session = Session::new(id, peer, ctx, outbound);

    info!(peer = %peer, session = %id.short(), "Channel connected");

    loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => {
                session.report(BridgeError::ShuttingDown).await;
                break;
            }
            _ = session.shell_exited() => {
                session.on_shell_exit().await;
                continue;
            }
            frame = stream.next() => frame,
        };

        let result = match frame {
            Some(Ok(Message::Text(text))) => session.on_frame(text.as_bytes()).await,
            Some(Ok(Message::Binary(data))) => session.on_frame(&data).await,
            Some(Ok(Message::Close(_))) | None => break,
            // Ping/pong are answered by tungstenite.
            Some(Ok(_)) => Ok(()),
            Some(Err(e)) => Err(BridgeError::from(e)),
        };

        if let Err(err) = result {
            if err.is_fatal() {
                debug!(peer = %peer, session = %id.short(), error = %err, "Channel read failed");
                break;
            }
            session.report(err).await;
        }
    }

    session.close().await;
    drop(session);

    // The writer ends once every outbound handle is gone.
    let abort = writer.abort_handle();
    if tokio::time::timeout(drain_timeout, writer).await.is_err() {
        warn!(peer = %peer, session = %id.short(), "Outbound writer did not drain, aborting");
        abort.abort();
    }

    info!(peer = %peer, session = %id.short(), "Channel closed, resources released");
}
