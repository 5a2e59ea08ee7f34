//! Remote shell capability consumed by the bridge.
//!
//! The bridge only sees these traits; [`ssh`] implements them on top of
//! russh. Tests substitute an in-memory fake.

pub mod ssh;

#[cfg(test)]
pub mod fake;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

/// Shell output handle (stdout or stderr).
pub type ShellReader = Box<dyn AsyncRead + Send + Unpin>;

/// Shell input handle. Shutting it down sends EOF to the remote shell.
pub type ShellWriter = Box<dyn AsyncWrite + Send + Unpin>;

#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("authentication rejected for user '{0}'")]
    AuthRejected(String),

    #[error("{0} request rejected by remote host")]
    Rejected(&'static str),

    #[error("{0} stream already taken")]
    StreamTaken(&'static str),

    #[error("channel closed")]
    ChannelClosed,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("ssh error: {0}")]
    Ssh(String),
}

/// Where and as whom to open the shell.
#[derive(Clone, PartialEq, Eq)]
pub struct ShellTarget {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl ShellTarget {
    /// `host:port`, bracketing IPv6 literals.
    pub fn address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Debug for ShellTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShellTarget")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Terminal modes the bridge sets on the remote tty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalMode {
    Echo,
    InputSpeed,
    OutputSpeed,
}

/// Pseudo-terminal allocation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtyRequest {
    pub term: String,
    pub rows: u32,
    pub cols: u32,
    pub modes: Vec<(TerminalMode, u32)>,
}

/// Dials authenticated shell connections.
#[async_trait]
pub trait ShellConnector: Send + Sync {
    async fn dial(
        &self,
        target: &ShellTarget,
        timeout: Duration,
    ) -> Result<Box<dyn ShellConnection>, ShellError>;
}

/// An authenticated transport connection to a remote host.
#[async_trait]
pub trait ShellConnection: Send {
    async fn open_session(&mut self) -> Result<Box<dyn ShellSession>, ShellError>;

    /// Idempotent.
    async fn close(&mut self) -> Result<(), ShellError>;
}

/// One interactive command session on a connection.
#[async_trait]
pub trait ShellSession: Send {
    async fn request_pty(&mut self, request: &PtyRequest) -> Result<(), ShellError>;

    fn stdin(&mut self) -> Result<ShellWriter, ShellError>;

    fn stdout(&mut self) -> Result<ShellReader, ShellError>;

    fn stderr(&mut self) -> Result<ShellReader, ShellError>;

    async fn start_shell(&mut self) -> Result<(), ShellError>;

    async fn resize(&mut self, rows: u32, cols: u32) -> Result<(), ShellError>;

    /// Idempotent. Ends both output streams.
    async fn close(&mut self) -> Result<(), ShellError>;
}
