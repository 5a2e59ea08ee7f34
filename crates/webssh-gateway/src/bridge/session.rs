//! Session state machine: at most one remote shell per channel.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use webssh_common::{SessionId, ShortId};

use super::forward::{spawn_forwarder, OutputStream};
use super::outbound::Outbound;
use super::BridgeContext;
use crate::error::BridgeError;
use crate::protocol::{self, ConnectRequest, ControlMessage, Response};
use crate::shell::{PtyRequest, ShellConnection, ShellSession, ShellTarget, ShellWriter};

/// Everything owned on behalf of one remote shell.
///
/// Fields fill in as `connect` progresses, so a failed attempt can be
/// released the same way as a live session.
#[derive(Default)]
struct ShellResources {
    stdin: Option<ShellWriter>,
    session: Option<Box<dyn ShellSession>>,
    connection: Option<Box<dyn ShellConnection>>,
    forwarders: Vec<JoinHandle<u64>>,
    /// Yields `None` once every forwarder has exited.
    output_done: Option<mpsc::Receiver<()>>,
}

impl ShellResources {
    /// Best-effort release: stdin, then session, then connection.
    ///
    /// Close errors are logged and swallowed. Safe to call more than once.
    async fn release(&mut self, session_id: ShortId, drain_timeout: Duration) {
        if let Some(mut stdin) = self.stdin.take() {
            if let Err(e) = stdin.shutdown().await {
                debug!(session = %session_id, error = %e, "Closing stdin failed");
            }
        }
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.close().await {
                debug!(session = %session_id, error = %e, "Closing shell session failed");
            }
        }
        if let Some(mut connection) = self.connection.take() {
            if let Err(e) = connection.close().await {
                debug!(session = %session_id, error = %e, "Closing shell connection failed");
            }
        }
        self.output_done = None;
        for forwarder in self.forwarders.drain(..) {
            let abort = forwarder.abort_handle();
            if tokio::time::timeout(drain_timeout, forwarder).await.is_err() {
                debug!(session = %session_id, "Output forwarder did not drain, aborting");
                abort.abort();
            }
        }
    }
}

enum SessionState {
    AwaitingConnect,
    Connected(ShellResources),
    Closed,
}

impl SessionState {
    fn name(&self) -> &'static str {
        match self {
            SessionState::AwaitingConnect => "awaiting_connect",
            SessionState::Connected(_) => "connected",
            SessionState::Closed => "closed",
        }
    }
}

pub(super) struct Session {
    id: SessionId,
    peer: SocketAddr,
    ctx: BridgeContext,
    outbound: Outbound,
    state: SessionState,
}

impl Session {
    pub(super) fn new(id: SessionId, peer: SocketAddr, ctx: BridgeContext, outbound: Outbound) -> Self {
        Self {
            id,
            peer,
            ctx,
            outbound,
            state: SessionState::AwaitingConnect,
        }
    }

    /// Decode and apply one inbound frame.
    pub(super) async fn on_frame(&mut self, frame: &[u8]) -> Result<(), BridgeError> {
        match protocol::decode(frame)? {
            ControlMessage::Connect(request) => self.connect(request).await,
            ControlMessage::Data { data } => self.write_input(data.as_bytes()).await,
            ControlMessage::Resize { rows, cols } => self.resize(rows, cols).await,
        }
    }

    /// Log a recoverable error and send it to the browser as an ERROR response.
    pub(super) async fn report(&mut self, err: BridgeError) {
        warn!(peer = %self.peer, session = %self.id.short(), error = %err, "Bridge error");
        self.outbound
            .send(Response::error(format!("{err}\r\n")))
            .await;
    }

    async fn connect(&mut self, request: ConnectRequest) -> Result<(), BridgeError> {
        match &self.state {
            SessionState::AwaitingConnect => {}
            SessionState::Connected(_) => return Err(BridgeError::AlreadyConnected),
            SessionState::Closed => return Ok(()),
        }

        let settings = &self.ctx.settings;
        let pty = settings.pty_request(request.geometry());
        let target = ShellTarget {
            port: request.port_or(settings.default_port),
            host: request.host,
            username: request.username,
            password: request.password,
        };
        info!(
            session = %self.id.short(),
            addr = %target.address(),
            user = %target.username,
            "Opening remote shell"
        );

        let mut resources = ShellResources::default();
        if let Err(err) = self.open_shell(&mut resources, &target, &pty).await {
            resources
                .release(self.id.short(), self.ctx.settings.drain_timeout)
                .await;
            return Err(err);
        }

        self.state = SessionState::Connected(resources);
        info!(session = %self.id.short(), addr = %target.address(), "Remote shell started");
        self.outbound
            .send(Response::connected("SSH connection established\r\n"))
            .await;
        Ok(())
    }

    /// Acquire, in order: connection, session, PTY, pipes, forwarders, shell.
    async fn open_shell(
        &mut self,
        resources: &mut ShellResources,
        target: &ShellTarget,
        pty: &PtyRequest,
    ) -> Result<(), BridgeError> {
        let settings = &self.ctx.settings;

        let connection = self
            .ctx
            .connector
            .dial(target, settings.connect_timeout)
            .await
            .map_err(BridgeError::Dial)?;
        let connection = resources.connection.insert(connection);

        let session = connection
            .open_session()
            .await
            .map_err(BridgeError::Session)?;
        let session = resources.session.insert(session);

        if let Err(e) = session.request_pty(pty).await {
            warn!(session = %self.id.short(), error = %e, "PTY request failed, continuing without one");
        }

        resources.stdin = Some(session.stdin().map_err(BridgeError::Session)?);
        let stdout = session.stdout().map_err(BridgeError::Session)?;
        let stderr = session.stderr().map_err(BridgeError::Session)?;

        let (done_tx, done_rx) = mpsc::channel(1);
        for (stream, reader) in [(OutputStream::Stdout, stdout), (OutputStream::Stderr, stderr)] {
            resources.forwarders.push(spawn_forwarder(
                stream,
                reader,
                self.outbound.clone(),
                settings.read_buffer_size,
                self.id.short(),
                done_tx.clone(),
            ));
        }
        resources.output_done = Some(done_rx);

        session.start_shell().await.map_err(BridgeError::ShellStart)
    }

    async fn write_input(&mut self, bytes: &[u8]) -> Result<(), BridgeError> {
        let resources = match &mut self.state {
            SessionState::Connected(resources) => resources,
            other => {
                debug!(session = %self.id.short(), state = other.name(), "Ignoring data without a shell");
                return Ok(());
            }
        };
        let Some(stdin) = resources.stdin.as_mut() else {
            return Ok(());
        };

        debug!(session = %self.id.short(), bytes = bytes.len(), "Forwarding input");
        stdin.write_all(bytes).await.map_err(BridgeError::Write)?;
        stdin.flush().await.map_err(BridgeError::Write)
    }

    async fn resize(&mut self, rows: u32, cols: u32) -> Result<(), BridgeError> {
        let resources = match &mut self.state {
            SessionState::Connected(resources) => resources,
            other => {
                debug!(session = %self.id.short(), state = other.name(), "Ignoring resize without a shell");
                return Ok(());
            }
        };
        let Some(session) = resources.session.as_mut() else {
            return Ok(());
        };

        debug!(session = %self.id.short(), rows, cols, "Resizing remote terminal");
        session.resize(rows, cols).await.map_err(BridgeError::Resize)
    }

    /// Resolves once both output streams of the live shell have ended.
    ///
    /// Never resolves without a live shell. Cancel-safe.
    pub(super) async fn shell_exited(&mut self) {
        let done = match &mut self.state {
            SessionState::Connected(ShellResources {
                output_done: Some(done),
                ..
            }) => done,
            _ => return std::future::pending().await,
        };
        while done.recv().await.is_some() {}
    }

    /// Tear down a shell whose output has ended and wait for a new `connect`.
    pub(super) async fn on_shell_exit(&mut self) {
        if let SessionState::Connected(mut resources) =
            std::mem::replace(&mut self.state, SessionState::AwaitingConnect)
        {
            info!(session = %self.id.short(), "Remote shell exited, releasing it");
            resources
                .release(self.id.short(), self.ctx.settings.drain_timeout)
                .await;
            self.report(BridgeError::ShellExited).await;
        }
    }

    /// Release everything and stop accepting frames. Idempotent.
    pub(super) async fn close(&mut self) {
        if let SessionState::Connected(mut resources) =
            std::mem::replace(&mut self.state, SessionState::Closed)
        {
            resources
                .release(self.id.short(), self.ctx.settings.drain_timeout)
                .await;
        }
    }
}
