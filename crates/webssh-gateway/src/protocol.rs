//! Browser-facing wire protocol: one JSON envelope per WebSocket frame.
//!
//! Inbound frames are decoded once into a [`ControlMessage`]; outbound
//! frames carry a [`Response`] with an integer result code.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Control message sent by the browser terminal.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlMessage {
    /// Open the remote shell.
    Connect(ConnectRequest),

    /// Raw keystrokes for the shell's stdin.
    Data {
        #[serde(default)]
        data: String,
    },

    /// Terminal window geometry changed.
    Resize {
        #[serde(default)]
        rows: u32,
        #[serde(default)]
        cols: u32,
    },
}

/// Parameters of a `connect` message.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConnectRequest {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub rows: u32,
    pub cols: u32,
}

impl ConnectRequest {
    /// Requested port, or `default` when the client sent 0.
    pub fn port_or(&self, default: u16) -> u16 {
        if self.port == 0 {
            default
        } else {
            self.port
        }
    }

    /// Client-supplied geometry, if both dimensions are set.
    pub fn geometry(&self) -> Option<(u32, u32)> {
        (self.rows > 0 && self.cols > 0).then_some((self.rows, self.cols))
    }
}

impl fmt::Debug for ConnectRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectRequest")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .finish()
    }
}

/// Result code of an outbound envelope. Serialized as its integer value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ResponseCode {
    /// A chunk of shell output.
    Output = 0,
    /// The remote shell is up.
    ConnectOk = 1,
    /// Human-readable diagnostic; never ends the session by itself.
    Error = 2,
}

impl From<ResponseCode> for u8 {
    fn from(code: ResponseCode) -> Self {
        code as u8
    }
}

impl TryFrom<u8> for ResponseCode {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, String> {
        match value {
            0 => Ok(ResponseCode::Output),
            1 => Ok(ResponseCode::ConnectOk),
            2 => Ok(ResponseCode::Error),
            other => Err(format!("unknown response code {other}")),
        }
    }
}

/// Envelope sent back to the browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub code: ResponseCode,
    pub message: String,
}

impl Response {
    pub fn output(text: impl Into<String>) -> Self {
        Self {
            code: ResponseCode::Output,
            message: text.into(),
        }
    }

    pub fn connected(message: impl Into<String>) -> Self {
        Self {
            code: ResponseCode::ConnectOk,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            code: ResponseCode::Error,
            message: message.into(),
        }
    }
}

/// An inbound frame that is not a valid control message.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct DecodeError(#[from] serde_json::Error);

/// Decode one control message from a text or binary frame payload.
pub fn decode(frame: &[u8]) -> Result<ControlMessage, DecodeError> {
    Ok(serde_json::from_slice(frame)?)
}

/// Encode a response as a JSON text frame payload.
pub fn encode(response: &Response) -> Result<String, serde_json::Error> {
    serde_json::to_string(response)
}
