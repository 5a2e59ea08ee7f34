//! Single writer for the browser channel.
//!
//! The receive loop and both output forwarders push responses into one
//! bounded queue; only the writer task touches the WebSocket sink.

use std::net::SocketAddr;

use futures_util::{Sink, SinkExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, warn};

use crate::protocol::{self, Response};

/// Producer handle for outbound responses.
#[derive(Clone)]
pub(super) struct Outbound {
    tx: mpsc::Sender<Response>,
}

impl Outbound {
    /// Queue a response. Returns `false` once the channel is gone.
    pub(super) async fn send(&self, response: Response) -> bool {
        self.tx.send(response).await.is_ok()
    }
}

/// Start the writer task that drains the queue into `sink`.
///
/// The task stops at the first write failure, which closes the queue so
/// producers stop too. It exits normally once every [`Outbound`] is dropped.
pub(super) fn spawn_writer<S>(
    mut sink: S,
    capacity: usize,
    peer: SocketAddr,
) -> (Outbound, JoinHandle<()>)
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<Response>(capacity.max(1));

    let task = tokio::spawn(async move {
        while let Some(response) = rx.recv().await {
            let json = match protocol::encode(&response) {
                Ok(json) => json,
                Err(e) => {
                    warn!(peer = %peer, error = %e, "Failed to encode response");
                    continue;
                }
            };
            if let Err(e) = sink.send(Message::Text(json.into())).await {
                debug!(peer = %peer, error = %e, "Channel write failed");
                return;
            }
        }
        let _ = sink.close().await;
    });

    (Outbound { tx }, task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ResponseCode;
    use std::pin::Pin;

    type TestSink = Pin<Box<dyn Sink<Message, Error = tungstenite::Error> + Send>>;

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    /// A sink that forwards every frame into an unbounded channel.
    fn collecting_sink(tx: mpsc::UnboundedSender<Message>) -> TestSink {
        Box::pin(futures_util::sink::unfold(tx, |tx, msg: Message| async move {
            tx.send(msg)
                .map_err(|_| tungstenite::Error::ConnectionClosed)?;
            Ok::<_, tungstenite::Error>(tx)
        }))
    }

    fn decode_frames(frames: &mut mpsc::UnboundedReceiver<Message>) -> Vec<Response> {
        let mut out = Vec::new();
        while let Ok(frame) = frames.try_recv() {
            if let Message::Text(text) = frame {
                out.push(serde_json::from_str::<Response>(&text).unwrap());
            }
        }
        out
    }

    #[tokio::test]
    async fn writes_responses_in_order_as_text_frames() {
        let (tx, mut frames) = mpsc::unbounded_channel();
        let (outbound, task) = spawn_writer(collecting_sink(tx), 4, peer());

        assert!(outbound.send(Response::output("a")).await);
        assert!(outbound.send(Response::error("b")).await);
        drop(outbound);
        task.await.unwrap();

        let responses = decode_frames(&mut frames);
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].code, ResponseCode::Output);
        assert_eq!(responses[0].message, "a");
        assert_eq!(responses[1].code, ResponseCode::Error);
    }

    #[tokio::test]
    async fn concurrent_producers_are_serialized() {
        let (tx, mut frames) = mpsc::unbounded_channel();
        let (outbound, task) = spawn_writer(collecting_sink(tx), 2, peer());

        let mut producers = Vec::new();
        for n in 0..3 {
            let outbound = outbound.clone();
            producers.push(tokio::spawn(async move {
                for i in 0..50 {
                    outbound.send(Response::output(format!("{n}:{i}"))).await;
                }
            }));
        }
        for p in producers {
            p.await.unwrap();
        }
        drop(outbound);
        task.await.unwrap();

        let responses = decode_frames(&mut frames);
        assert_eq!(responses.len(), 150);
        // Per-producer order is preserved.
        for n in 0..3 {
            let prefix = format!("{n}:");
            let seq: Vec<u32> = responses
                .iter()
                .filter_map(|r| r.message.strip_prefix(&prefix))
                .map(|s| s.parse().unwrap())
                .collect();
            assert_eq!(seq, (0..50).collect::<Vec<u32>>());
        }
    }

    #[tokio::test]
    async fn write_failure_closes_the_queue() {
        let (tx, frames) = mpsc::unbounded_channel();
        drop(frames);
        let (outbound, task) = spawn_writer(collecting_sink(tx), 1, peer());

        outbound.send(Response::output("lost")).await;
        task.await.unwrap();
        assert!(!outbound.send(Response::output("after")).await);
    }
}
