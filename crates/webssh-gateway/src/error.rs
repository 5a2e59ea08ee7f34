//! Bridge error taxonomy. `Display` is the diagnostic shown in the browser
//! terminal, so messages are phrased for the end user.

use crate::protocol::DecodeError;
use crate::shell::ShellError;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("invalid message: {0}")]
    Decode(#[from] DecodeError),

    #[error("a shell session is already active on this connection")]
    AlreadyConnected,

    #[error("SSH connection failed: {0}")]
    Dial(#[source] ShellError),

    #[error("failed to create session: {0}")]
    Session(#[source] ShellError),

    #[error("failed to start shell: {0}")]
    ShellStart(#[source] ShellError),

    #[error("failed to send input: {0}")]
    Write(#[source] std::io::Error),

    #[error("resize failed: {0}")]
    Resize(#[source] ShellError),

    #[error("gateway is shutting down")]
    ShuttingDown,

    #[error("remote shell exited")]
    ShellExited,

    #[error("channel error: {0}")]
    Channel(#[from] tokio_tungstenite::tungstenite::Error),
}

impl BridgeError {
    /// Whether this error ends the session. Only channel transport errors do.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BridgeError::Channel(_))
    }
}
