//! Listener and connection driver for one protocol.
//!
//! The accept loop posts an acceptance completion per connection and
//! immediately loops, so acceptance is always primed. Each accepted
//! connection gets a driver task that performs the session's single
//! outstanding operation on demand and posts its outcome to the
//! completion queue; the session itself holds no task while an
//! operation is in flight.

use futures::{SinkExt, StreamExt};
use prost::Message;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{error, info};

use super::queue::{Completion, QueueHandle, StreamError, StreamEvent};
use super::registry::SessionToken;
use super::session::IoRequest;
use super::socket::SocketMutator;
use crate::proto::{frame_codec, Dialout};
use crate::telemetry::counters;

/// A bound, accepting listener for one protocol.
pub struct Listener {
    protocol: &'static str,
    local_addr: SocketAddr,
    task: JoinHandle<()>,
}

impl Listener {
    /// Bind `address` and start accepting. Returns once the socket is
    /// bound; a bind failure is fatal for this protocol and surfaces
    /// here.
    pub async fn bind<P: Dialout>(
        address: SocketAddr,
        mutator: Arc<SocketMutator>,
        queue: QueueHandle,
        shutdown: watch::Receiver<bool>,
    ) -> io::Result<Listener> {
        let listener = TcpListener::bind(address).await?;
        let local_addr = listener.local_addr()?;

        info!(protocol = P::NAME, address = %local_addr, "listener started");
        counters::listener_started(P::NAME);

        let task = tokio::spawn(accept_loop::<P>(listener, mutator, queue, shutdown));

        Ok(Self {
            protocol: P::NAME,
            local_addr,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait for the accept loop to stop.
    pub async fn join(self) {
        if let Err(error) = self.task.await {
            error!(protocol = self.protocol, %error, "accept loop failed");
        }
        info!(protocol = self.protocol, "listener stopped");
    }
}

async fn accept_loop<P: Dialout>(
    listener: TcpListener,
    mutator: Arc<SocketMutator>,
    queue: QueueHandle,
    mut shutdown: watch::Receiver<bool>,
) {
    if *shutdown.borrow() {
        return;
    }

    loop {
        tokio::select! {
            biased;

            _ = shutdown.changed() => {
                info!(protocol = P::NAME, "listener shutting down");
                break;
            }

            result = listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        // The socket hook runs before any protocol
                        // bytes are read; a failure never rejects the
                        // connection.
                        if !mutator.apply(&stream) {
                            counters::socket_hook_failed(P::NAME);
                        }
                        mutator.inspect(&stream);

                        if !queue.post(Completion::Accepted { stream, peer }).await {
                            break;
                        }
                    }
                    Err(error) => {
                        error!(protocol = P::NAME, %error, "accept error");
                        counters::listener_accept_error(P::NAME);
                    }
                }
            }
        }
    }
}

/// Perform one session's operations, one at a time, posting each
/// outcome to the completion queue. Exits after posting a terminal
/// event, or when the session (and with it the operation channel) is
/// destroyed.
pub(super) async fn drive<P: Dialout>(
    token: SessionToken,
    stream: TcpStream,
    mut ops: mpsc::Receiver<IoRequest<P::Response>>,
    queue: QueueHandle,
    mut shutdown: watch::Receiver<bool>,
    max_frame_bytes: usize,
) {
    let (read_half, write_half) = stream.into_split();
    let mut reader = FramedRead::new(read_half, frame_codec(max_frame_bytes));
    let mut writer = FramedWrite::new(write_half, frame_codec(max_frame_bytes));

    loop {
        let request = tokio::select! {
            biased;

            _ = shutdown.changed() => {
                let event = StreamEvent::Failed(StreamError::Aborted);
                queue.post(Completion::Stream { token, event }).await;
                return;
            }

            request = ops.recv() => match request {
                // Session destroyed; nothing left to complete.
                None => return,
                Some(request) => request,
            },
        };

        let event = match request {
            IoRequest::Read => tokio::select! {
                biased;

                _ = shutdown.changed() => StreamEvent::Failed(StreamError::Aborted),

                frame = reader.next() => match frame {
                    Some(Ok(frame)) => StreamEvent::Frame(frame.freeze()),
                    Some(Err(error)) => StreamEvent::Failed(StreamError::Io(error)),
                    None => StreamEvent::Closed,
                },
            },

            IoRequest::Write(message) => {
                match writer.send(message.encode_to_vec().into()).await {
                    Ok(()) => StreamEvent::Sent,
                    Err(error) => StreamEvent::Failed(StreamError::Io(error)),
                }
            }
        };

        let terminal = matches!(event, StreamEvent::Closed | StreamEvent::Failed(_));
        if !queue.post(Completion::Stream { token, event }).await || terminal {
            return;
        }
    }
}
