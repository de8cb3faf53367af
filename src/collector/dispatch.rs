//! Per-protocol dispatch loop.
//!
//! The single consumer of one protocol's completion queue. Creates a
//! session when an acceptance completes, routes stream completions to
//! the owning session through the token registry, and destroys a
//! session once it reaches its terminal state. Session logic runs to
//! completion on this task; the queue wait is the only suspension
//! point.

use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::acceptor::drive;
use super::queue::{Completion, CompletionQueue, QueueHandle, StreamEvent};
use super::registry::{SessionRegistry, SessionToken};
use super::session::{AckPolicy, Disposition, IoHandle, StreamSession};
use crate::labels::LabelMap;
use crate::pipeline::Pipeline;
use crate::proto::Dialout;
use crate::telemetry::counters;

pub struct Dispatcher<P: Dialout> {
    queue: CompletionQueue,
    /// Keeps the queue open for new drivers; released when shutdown
    /// begins so the queue can drain to closure.
    handle: Option<QueueHandle>,
    sessions: SessionRegistry<P>,
    pipeline: Arc<Pipeline>,
    labels: LabelMap,
    policy: AckPolicy,
    max_frame_bytes: usize,
    shutdown: watch::Receiver<bool>,
}

impl<P: Dialout> Dispatcher<P> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: CompletionQueue,
        handle: QueueHandle,
        pipeline: Arc<Pipeline>,
        labels: LabelMap,
        policy: AckPolicy,
        max_frame_bytes: usize,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            queue,
            handle: Some(handle),
            sessions: SessionRegistry::new(),
            pipeline,
            labels,
            policy,
            max_frame_bytes,
            shutdown,
        }
    }

    /// Drain the queue until it shuts down. Every session receives its
    /// terminal event before the queue can close, so none leak.
    pub async fn run(mut self) {
        if *self.shutdown.borrow() {
            self.handle = None;
        }

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.changed(), if self.handle.is_some() => {
                    self.handle = None;
                }

                completion = self.queue.next() => {
                    let Some(completion) = completion else { break };
                    match completion {
                        Completion::Accepted { stream, peer } => self.accept(stream, peer),
                        Completion::Stream { token, event } => self.dispatch(token, event),
                    }
                }
            }
        }

        if !self.sessions.is_empty() {
            warn!(
                protocol = P::NAME,
                sessions = self.sessions.len(),
                "queue shut down with live sessions"
            );
        }
        info!(protocol = P::NAME, "dispatch loop stopped");
    }

    /// Acceptance completion: create the session, hand the connection
    /// to its driver, and issue the first read.
    fn accept(&mut self, stream: TcpStream, peer: std::net::SocketAddr) {
        let Some(handle) = &self.handle else {
            // Shutting down: refuse the stream.
            drop(stream);
            return;
        };

        let (ops_tx, ops_rx) = mpsc::channel(1);
        let policy = self.policy;
        let token = self
            .sessions
            .insert(|token| StreamSession::new(token, peer, policy, IoHandle::new(ops_tx)));

        counters::stream_accepted(P::NAME);
        counters::sessions_active(P::NAME, self.sessions.len());
        debug!(protocol = P::NAME, %peer, ?token, "stream session created");

        tokio::spawn(drive::<P>(
            token,
            stream,
            ops_rx,
            handle.clone(),
            self.shutdown.clone(),
            self.max_frame_bytes,
        ));

        if let Some(session) = self.sessions.get_mut(token) {
            if session.start() == Disposition::Finished {
                self.destroy(token);
            }
        }
    }

    /// Stream completion: advance the owning session.
    fn dispatch(&mut self, token: SessionToken, event: StreamEvent) {
        let Some(session) = self.sessions.get_mut(token) else {
            // The session was already destroyed; drop the late event.
            debug!(protocol = P::NAME, ?token, "stale completion dropped");
            counters::stale_completion(P::NAME);
            return;
        };

        if session.handle(event, &self.pipeline, &self.labels) == Disposition::Finished {
            self.destroy(token);
        }
    }

    fn destroy(&mut self, token: SessionToken) {
        self.sessions.remove(token);
        counters::sessions_active(P::NAME, self.sessions.len());
    }
}
