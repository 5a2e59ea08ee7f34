use serde::{Deserialize, Serialize};

/// Pseudo-terminal requested on the remote host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    /// Value sent as `TERM`.
    pub term: String,
    /// Default height when the client does not send one (valid range: 1-1000).
    pub rows: u32,
    /// Default width when the client does not send one (valid range: 1-1000).
    pub cols: u32,
    /// Remote echo.
    pub echo: bool,
    /// Input and output baud rate reported to the remote tty.
    pub baud: u32,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            term: "xterm-256color".into(),
            rows: 40,
            cols: 120,
            echo: true,
            baud: 14400,
        }
    }
}
