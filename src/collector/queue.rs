//! Per-protocol completion queue.
//!
//! Every asynchronous operation a component issues reports its outcome
//! here, and the protocol's dispatch loop is the single consumer. The
//! queue shuts down when every posting handle is gone: the acceptor
//! exited, every connection driver posted its terminal event, and the
//! dispatcher released its own handle.

use bytes::Bytes;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use super::registry::SessionToken;

/// One event drained from the completion queue.
#[derive(Debug)]
pub enum Completion {
    /// A new stream finished acceptance and awaits a session.
    Accepted { stream: TcpStream, peer: SocketAddr },

    /// An operation a session issued completed.
    Stream {
        token: SessionToken,
        event: StreamEvent,
    },
}

/// Outcome of one asynchronous stream operation.
#[derive(Debug)]
pub enum StreamEvent {
    /// Read completed with one inbound frame.
    Frame(Bytes),

    /// Write completed.
    Sent,

    /// Peer closed or half-closed the stream.
    Closed,

    /// The operation completed not-ok.
    Failed(StreamError),
}

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("stream cancelled by shutdown")]
    Aborted,
}

/// Create a completion queue of the given depth.
pub fn completion_queue(depth: usize) -> (QueueHandle, CompletionQueue) {
    let (tx, rx) = mpsc::channel(depth);
    (QueueHandle { tx }, CompletionQueue { rx })
}

/// Posting side of the queue. Cloned by the acceptor and every
/// connection driver.
#[derive(Clone)]
pub struct QueueHandle {
    tx: mpsc::Sender<Completion>,
}

impl QueueHandle {
    /// Post a completion. Returns `false` once the queue has shut
    /// down, at which point the poster should stop.
    pub async fn post(&self, completion: Completion) -> bool {
        self.tx.send(completion).await.is_ok()
    }
}

/// Draining side of the queue, owned by the dispatch loop.
pub struct CompletionQueue {
    rx: mpsc::Receiver<Completion>,
}

impl CompletionQueue {
    /// Wait for the next completion. `None` means the queue has shut
    /// down and no further event will ever be delivered.
    pub async fn next(&mut self) -> Option<Completion> {
        self.rx.recv().await
    }
}
