//! SSH implementation of the shell capability.
//!
//! Dial, handshake and password authentication run under one timeout.
//! Until the shell starts, the session drives its channel directly; after
//! that a pump task owns the channel and moves bytes between it and the
//! in-memory pipes handed to the bridge.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Msg};
use russh::{Channel, ChannelMsg, Disconnect, Pty};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

use super::{
    PtyRequest, ShellConnection, ShellConnector, ShellError, ShellReader, ShellSession,
    ShellTarget, ShellWriter, TerminalMode,
};

/// Capacity of each in-memory pipe between the bridge and the pump.
const PIPE_CAPACITY: usize = 64 * 1024;

/// Bytes read from the stdin pipe per channel data packet.
const STDIN_CHUNK: usize = 8 * 1024;

impl From<russh::Error> for ShellError {
    fn from(e: russh::Error) -> Self {
        ShellError::Ssh(e.to_string())
    }
}

/// Opens SSH connections with password authentication.
pub struct RusshConnector {
    config: Arc<client::Config>,
}

impl RusshConnector {
    pub fn new(keepalive: Option<Duration>) -> Self {
        let config = client::Config {
            keepalive_interval: keepalive,
            keepalive_max: 3,
            ..Default::default()
        };
        Self {
            config: Arc::new(config),
        }
    }
}

/// russh client callbacks.
struct ClientHandler {
    addr: String,
}

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh_keys::key::PublicKey,
    ) -> Result<bool, Self::Error> {
        // Keys are not pinned.
        debug!(
            addr = %self.addr,
            fingerprint = %server_public_key.fingerprint(),
            "Accepting SSH host key"
        );
        Ok(true)
    }
}

#[async_trait]
impl ShellConnector for RusshConnector {
    async fn dial(
        &self,
        target: &ShellTarget,
        timeout: Duration,
    ) -> Result<Box<dyn ShellConnection>, ShellError> {
        let addr = target.address();
        let handler = ClientHandler { addr: addr.clone() };
        let config = self.config.clone();
        let username = target.username.clone();
        let password = target.password.clone();

        let (handle, accepted) = tokio::time::timeout(timeout, async move {
            let mut handle = client::connect(config, addr.as_str(), handler).await?;
            let accepted = handle.authenticate_password(username, password).await?;
            Ok::<_, ShellError>((handle, accepted))
        })
        .await
        .map_err(|_| ShellError::Timeout(timeout))??;

        if !accepted {
            let _ = handle
                .disconnect(Disconnect::ByApplication, "authentication failed", "en")
                .await;
            return Err(ShellError::AuthRejected(target.username.clone()));
        }

        info!(addr = %target.address(), user = %target.username, "SSH authenticated");
        Ok(Box::new(RusshConnection {
            handle: Some(handle),
        }))
    }
}

/// An authenticated SSH connection.
pub struct RusshConnection {
    handle: Option<client::Handle<ClientHandler>>,
}

#[async_trait]
impl ShellConnection for RusshConnection {
    async fn open_session(&mut self) -> Result<Box<dyn ShellSession>, ShellError> {
        let handle = self.handle.as_ref().ok_or(ShellError::ChannelClosed)?;
        let channel = handle.channel_open_session().await?;
        Ok(Box::new(RusshSession::new(channel)))
    }

    async fn close(&mut self) -> Result<(), ShellError> {
        if let Some(handle) = self.handle.take() {
            handle
                .disconnect(Disconnect::ByApplication, "", "en")
                .await?;
        }
        Ok(())
    }
}

/// Pump-side ends of the session pipes.
struct RemoteEnds {
    stdin: DuplexStream,
    stdout: DuplexStream,
    stderr: DuplexStream,
}

enum ChannelCommand {
    Resize {
        rows: u32,
        cols: u32,
        reply: oneshot::Sender<Result<(), ShellError>>,
    },
}

/// A session channel plus the pipes exposed to the bridge.
pub struct RusshSession {
    /// Present until the shell starts; the pump owns it afterwards.
    channel: Option<Channel<Msg>>,
    remote: Option<RemoteEnds>,
    stdin: Option<DuplexStream>,
    stdout: Option<DuplexStream>,
    stderr: Option<DuplexStream>,
    control: Option<mpsc::Sender<ChannelCommand>>,
}

impl RusshSession {
    fn new(channel: Channel<Msg>) -> Self {
        let (stdin, remote_stdin) = tokio::io::duplex(PIPE_CAPACITY);
        let (stdout, remote_stdout) = tokio::io::duplex(PIPE_CAPACITY);
        let (stderr, remote_stderr) = tokio::io::duplex(PIPE_CAPACITY);
        Self {
            channel: Some(channel),
            remote: Some(RemoteEnds {
                stdin: remote_stdin,
                stdout: remote_stdout,
                stderr: remote_stderr,
            }),
            stdin: Some(stdin),
            stdout: Some(stdout),
            stderr: Some(stderr),
            control: None,
        }
    }
}

fn pty_mode(mode: TerminalMode) -> Pty {
    match mode {
        TerminalMode::Echo => Pty::ECHO,
        TerminalMode::InputSpeed => Pty::TTY_OP_ISPEED,
        TerminalMode::OutputSpeed => Pty::TTY_OP_OSPEED,
    }
}

/// Wait for the reply to a `want_reply` channel request.
///
/// Output that arrives first is passed through to the session pipes.
async fn await_reply(
    channel: &mut Channel<Msg>,
    mut remote: Option<&mut RemoteEnds>,
    request: &'static str,
) -> Result<(), ShellError> {
    loop {
        match channel.wait().await {
            Some(ChannelMsg::Success) => return Ok(()),
            Some(ChannelMsg::Failure) => return Err(ShellError::Rejected(request)),
            Some(ChannelMsg::Data { data }) => {
                if let Some(remote) = remote.as_deref_mut() {
                    let _ = remote.stdout.write_all(&data).await;
                }
            }
            Some(ChannelMsg::ExtendedData { data, ext: 1 }) => {
                if let Some(remote) = remote.as_deref_mut() {
                    let _ = remote.stderr.write_all(&data).await;
                }
            }
            Some(ChannelMsg::Close) | None => return Err(ShellError::ChannelClosed),
            Some(other) => trace!(?other, request, "Ignoring channel message"),
        }
    }
}

#[async_trait]
impl ShellSession for RusshSession {
    async fn request_pty(&mut self, request: &PtyRequest) -> Result<(), ShellError> {
        let channel = self.channel.as_mut().ok_or(ShellError::ChannelClosed)?;
        let modes: Vec<(Pty, u32)> = request
            .modes
            .iter()
            .map(|&(mode, value)| (pty_mode(mode), value))
            .collect();
        channel
            .request_pty(true, &request.term, request.cols, request.rows, 0, 0, &modes)
            .await?;
        await_reply(channel, self.remote.as_mut(), "pty").await
    }

    fn stdin(&mut self) -> Result<ShellWriter, ShellError> {
        let pipe = self.stdin.take().ok_or(ShellError::StreamTaken("stdin"))?;
        Ok(Box::new(pipe))
    }

    fn stdout(&mut self) -> Result<ShellReader, ShellError> {
        let pipe = self.stdout.take().ok_or(ShellError::StreamTaken("stdout"))?;
        Ok(Box::new(pipe))
    }

    fn stderr(&mut self) -> Result<ShellReader, ShellError> {
        let pipe = self.stderr.take().ok_or(ShellError::StreamTaken("stderr"))?;
        Ok(Box::new(pipe))
    }

    async fn start_shell(&mut self) -> Result<(), ShellError> {
        let mut channel = self.channel.take().ok_or(ShellError::ChannelClosed)?;
        let started = match channel.request_shell(true).await {
            Ok(()) => await_reply(&mut channel, self.remote.as_mut(), "shell").await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = started {
            self.channel = Some(channel);
            return Err(e);
        }

        let Some(remote) = self.remote.take() else {
            self.channel = Some(channel);
            return Err(ShellError::ChannelClosed);
        };
        let (tx, rx) = mpsc::channel(8);
        self.control = Some(tx);
        tokio::spawn(pump(channel, remote, rx));
        Ok(())
    }

    async fn resize(&mut self, rows: u32, cols: u32) -> Result<(), ShellError> {
        if let Some(channel) = self.channel.as_ref() {
            channel.window_change(cols, rows, 0, 0).await?;
            return Ok(());
        }
        let control = self.control.as_ref().ok_or(ShellError::ChannelClosed)?;
        let (reply, result) = oneshot::channel();
        control
            .send(ChannelCommand::Resize { rows, cols, reply })
            .await
            .map_err(|_| ShellError::ChannelClosed)?;
        result.await.map_err(|_| ShellError::ChannelClosed)?
    }

    async fn close(&mut self) -> Result<(), ShellError> {
        // Dropping the sender tells the pump to close the channel.
        self.control = None;
        self.remote = None;
        if let Some(channel) = self.channel.take() {
            channel.close().await?;
        }
        Ok(())
    }
}

/// Owns a started shell channel until it or the session closes.
async fn pump(
    mut channel: Channel<Msg>,
    mut remote: RemoteEnds,
    mut control: mpsc::Receiver<ChannelCommand>,
) {
    let mut buf = vec![0u8; STDIN_CHUNK];
    let mut stdin_open = true;

    loop {
        tokio::select! {
            read = remote.stdin.read(&mut buf), if stdin_open => match read {
                Ok(0) | Err(_) => {
                    stdin_open = false;
                    if let Err(e) = channel.eof().await {
                        debug!(error = %e, "Failed to send EOF");
                    }
                }
                Ok(n) => {
                    if let Err(e) = channel.data(&buf[..n]).await {
                        warn!(error = %e, "Failed to write to SSH channel");
                        break;
                    }
                }
            },

            command = control.recv() => match command {
                Some(ChannelCommand::Resize { rows, cols, reply }) => {
                    let result = channel
                        .window_change(cols, rows, 0, 0)
                        .await
                        .map_err(ShellError::from);
                    let _ = reply.send(result);
                }
                None => {
                    let _ = channel.close().await;
                    break;
                }
            },

            msg = channel.wait() => match msg {
                Some(ChannelMsg::Data { data }) => {
                    if remote.stdout.write_all(&data).await.is_err() {
                        trace!("stdout reader gone, dropping output");
                    }
                }
                Some(ChannelMsg::ExtendedData { data, ext: 1 }) => {
                    if remote.stderr.write_all(&data).await.is_err() {
                        trace!("stderr reader gone, dropping output");
                    }
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    debug!(exit_status, "Remote shell exited");
                }
                Some(ChannelMsg::Eof) => debug!("Remote sent EOF"),
                Some(ChannelMsg::Close) | None => break,
                Some(_) => {}
            },
        }
    }

    debug!("SSH channel pump finished");
}
