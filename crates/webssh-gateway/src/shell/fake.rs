//! In-memory shell used by bridge tests.
//!
//! Every capability call is recorded in order. Each opened session hands
//! its remote ends to the test through [`FakeHandle::next_remote`].

use std::pin::Pin;
use std::sync::{Arc, Mutex as StdMutex};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt, DuplexStream};
use tokio::sync::{mpsc, Mutex};

use super::{
    PtyRequest, ShellConnection, ShellConnector, ShellError, ShellReader, ShellSession,
    ShellTarget, ShellWriter,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Dial(String),
    OpenSession,
    RequestPty { term: String, rows: u32, cols: u32 },
    StartShell,
    CloseStdin,
    Resize { rows: u32, cols: u32 },
    CloseSession,
    CloseConnection,
}

/// Which steps should fail.
#[derive(Debug, Clone, Default)]
pub struct FakeBehavior {
    pub fail_dial: bool,
    pub fail_open: bool,
    pub fail_pty: bool,
    pub fail_start: bool,
    pub fail_resize: bool,
    pub fail_write: bool,
}

type CallLog = Arc<StdMutex<Vec<Call>>>;
type SharedPipe = Arc<Mutex<Option<DuplexStream>>>;

fn record(log: &CallLog, call: Call) {
    if let Ok(mut calls) = log.lock() {
        calls.push(call);
    }
}

/// The "remote host" side of one fake session.
pub struct FakeRemote {
    pub stdin: DuplexStream,
    stdout: SharedPipe,
    stderr: SharedPipe,
}

impl FakeRemote {
    pub async fn write_stdout(&self, bytes: &[u8]) -> std::io::Result<()> {
        write_pipe(&self.stdout, bytes).await
    }

    pub async fn write_stderr(&self, bytes: &[u8]) -> std::io::Result<()> {
        write_pipe(&self.stderr, bytes).await
    }

    /// End the stdout stream as if the remote shell closed it.
    pub async fn close_stdout(&self) {
        self.stdout.lock().await.take();
    }

    /// End both output streams, as when the remote shell exits.
    pub async fn hang_up(&self) {
        self.stdout.lock().await.take();
        self.stderr.lock().await.take();
    }
}

/// Session stdin that records its shutdown and can be told to fail writes.
struct RecordingWriter {
    inner: DuplexStream,
    calls: CallLog,
    fail_write: bool,
    closed: bool,
}

impl AsyncWrite for RecordingWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        if self.fail_write {
            return Poll::Ready(Err(std::io::ErrorKind::BrokenPipe.into()));
        }
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<std::io::Result<()>> {
        let ready = Pin::new(&mut self.inner).poll_shutdown(cx);
        if ready.is_ready() && !self.closed {
            self.closed = true;
            record(&self.calls, Call::CloseStdin);
        }
        ready
    }
}

async fn write_pipe(pipe: &SharedPipe, bytes: &[u8]) -> std::io::Result<()> {
    match pipe.lock().await.as_mut() {
        Some(pipe) => pipe.write_all(bytes).await,
        None => Err(std::io::ErrorKind::BrokenPipe.into()),
    }
}

/// Test-side view of a [`FakeConnector`].
pub struct FakeHandle {
    calls: CallLog,
    remotes: mpsc::UnboundedReceiver<FakeRemote>,
}

impl FakeHandle {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    pub async fn next_remote(&mut self) -> FakeRemote {
        tokio::time::timeout(Duration::from_secs(5), self.remotes.recv())
            .await
            .expect("timed out waiting for a fake session")
            .expect("fake connector dropped")
    }
}

pub struct FakeConnector {
    calls: CallLog,
    behavior: FakeBehavior,
    remotes: mpsc::UnboundedSender<FakeRemote>,
}

impl FakeConnector {
    pub fn new(behavior: FakeBehavior) -> (Self, FakeHandle) {
        let calls = CallLog::default();
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                calls: calls.clone(),
                behavior,
                remotes: tx,
            },
            FakeHandle {
                calls,
                remotes: rx,
            },
        )
    }
}

#[async_trait]
impl ShellConnector for FakeConnector {
    async fn dial(
        &self,
        target: &ShellTarget,
        _timeout: Duration,
    ) -> Result<Box<dyn ShellConnection>, ShellError> {
        record(&self.calls, Call::Dial(target.address()));
        if self.behavior.fail_dial {
            return Err(std::io::Error::from(std::io::ErrorKind::ConnectionRefused).into());
        }
        Ok(Box::new(FakeConnection {
            calls: self.calls.clone(),
            behavior: self.behavior.clone(),
            remotes: self.remotes.clone(),
        }))
    }
}

struct FakeConnection {
    calls: CallLog,
    behavior: FakeBehavior,
    remotes: mpsc::UnboundedSender<FakeRemote>,
}

#[async_trait]
impl ShellConnection for FakeConnection {
    async fn open_session(&mut self) -> Result<Box<dyn ShellSession>, ShellError> {
        record(&self.calls, Call::OpenSession);
        if self.behavior.fail_open {
            return Err(ShellError::Rejected("session"));
        }

        let (stdin, remote_stdin) = tokio::io::duplex(64 * 1024);
        let (stdout, remote_stdout) = tokio::io::duplex(64 * 1024);
        let (stderr, remote_stderr) = tokio::io::duplex(64 * 1024);
        let remote_stdout: SharedPipe = Arc::new(Mutex::new(Some(remote_stdout)));
        let remote_stderr: SharedPipe = Arc::new(Mutex::new(Some(remote_stderr)));

        let _ = self.remotes.send(FakeRemote {
            stdin: remote_stdin,
            stdout: remote_stdout.clone(),
            stderr: remote_stderr.clone(),
        });

        Ok(Box::new(FakeSession {
            calls: self.calls.clone(),
            behavior: self.behavior.clone(),
            stdin: Some(stdin),
            stdout: Some(stdout),
            stderr: Some(stderr),
            remote_stdout,
            remote_stderr,
        }))
    }

    async fn close(&mut self) -> Result<(), ShellError> {
        record(&self.calls, Call::CloseConnection);
        Ok(())
    }
}

struct FakeSession {
    calls: CallLog,
    behavior: FakeBehavior,
    stdin: Option<DuplexStream>,
    stdout: Option<DuplexStream>,
    stderr: Option<DuplexStream>,
    remote_stdout: SharedPipe,
    remote_stderr: SharedPipe,
}

#[async_trait]
impl ShellSession for FakeSession {
    async fn request_pty(&mut self, request: &PtyRequest) -> Result<(), ShellError> {
        record(
            &self.calls,
            Call::RequestPty {
                term: request.term.clone(),
                rows: request.rows,
                cols: request.cols,
            },
        );
        if self.behavior.fail_pty {
            return Err(ShellError::Rejected("pty"));
        }
        Ok(())
    }

    fn stdin(&mut self) -> Result<ShellWriter, ShellError> {
        let pipe = self.stdin.take().ok_or(ShellError::StreamTaken("stdin"))?;
        Ok(Box::new(RecordingWriter {
            inner: pipe,
            calls: self.calls.clone(),
            fail_write: self.behavior.fail_write,
            closed: false,
        }))
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
        record(&self.calls, Call::StartShell);
        if self.behavior.fail_start {
            return Err(ShellError::Rejected("shell"));
        }
        Ok(())
    }

    async fn resize(&mut self, rows: u32, cols: u32) -> Result<(), ShellError> {
        record(&self.calls, Call::Resize { rows, cols });
        if self.behavior.fail_resize {
            return Err(ShellError::Rejected("window-change"));
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ShellError> {
        record(&self.calls, Call::CloseSession);
        self.remote_stdout.lock().await.take();
        self.remote_stderr.lock().await.take();
        Ok(())
    }
}
