//! Shell output forwarding: one task per output stream.

use std::fmt;

use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use webssh_common::ShortId;

use super::outbound::Outbound;
use crate::protocol::Response;
use crate::shell::ShellReader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum OutputStream {
    Stdout,
    Stderr,
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputStream::Stdout => f.write_str("stdout"),
            OutputStream::Stderr => f.write_str("stderr"),
        }
    }
}

/// Incremental UTF-8 decoder for chunked shell output.
///
/// A multi-byte character split across reads is held back until its
/// remaining bytes arrive; invalid bytes become U+FFFD.
#[derive(Debug, Default)]
pub(super) struct OutputDecoder {
    pending: Vec<u8>,
}

impl OutputDecoder {
    pub(super) fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);

        let mut out = String::with_capacity(self.pending.len());
        let mut start = 0;
        while start < self.pending.len() {
            let rest = &self.pending[start..];
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    out.push_str(text);
                    start = self.pending.len();
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(std::str::from_utf8(&rest[..valid]).unwrap_or_default());
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            start += valid + len;
                        }
                        // Incomplete sequence at the end: wait for more bytes.
                        None => {
                            start += valid;
                            break;
                        }
                    }
                }
            }
        }

        self.pending.drain(..start);
        out
    }

    /// Flush whatever is still held back at end of stream.
    pub(super) fn finish(&mut self) -> String {
        let tail = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        tail
    }
}

/// Spawn a task copying `reader` into OUTPUT responses until EOF or error.
///
/// The task's exit never closes the session by itself; it drops `done`
/// when it returns, after its last OUTPUT is queued. It returns the bytes read.
pub(super) fn spawn_forwarder(
    stream: OutputStream,
    reader: ShellReader,
    outbound: Outbound,
    chunk_size: usize,
    session: ShortId,
    done: mpsc::Sender<()>,
) -> JoinHandle<u64> {
    tokio::spawn(async move {
        let total = forward_output(stream, reader, outbound, chunk_size, session).await;
        drop(done);
        total
    })
}

async fn forward_output(
    stream: OutputStream,
    mut reader: ShellReader,
    outbound: Outbound,
    chunk_size: usize,
    session: ShortId,
) -> u64 {
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut decoder = OutputDecoder::default();
    let mut total: u64 = 0;

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                total += n as u64;
                let text = decoder.push(&buf[..n]);
                if !text.is_empty() && !outbound.send(Response::output(text)).await {
                    debug!(session = %session, %stream, "Channel gone, stopping output forwarder");
                    return total;
                }
            }
            Err(e) => {
                warn!(session = %session, %stream, error = %e, "Shell output read failed");
                break;
            }
        }
    }

    let tail = decoder.finish();
    if !tail.is_empty() {
        outbound.send(Response::output(tail)).await;
    }
    info!(session = %session, %stream, bytes = total, "Shell output stream finished");
    total
}
