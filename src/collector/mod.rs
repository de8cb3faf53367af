//! The asynchronous dial-out server core.
//!
//! One protocol gets one (listener, dispatch loop) pair sharing a
//! completion queue. The listener accepts streams and posts acceptance
//! completions; per-connection drivers post operation outcomes; the
//! dispatch loop is the single consumer and advances each stream's
//! session state machine (Start → Flow ⇄ Processing → End) with strict
//! per-session event ordering.

mod acceptor;
mod dispatch;
mod queue;
mod registry;
mod session;
mod socket;

pub use acceptor::Listener;
pub use dispatch::Dispatcher;
pub use queue::{
    completion_queue, Completion, CompletionQueue, QueueHandle, StreamError, StreamEvent,
};
pub use registry::{SessionRegistry, SessionToken};
pub use session::{AckPolicy, Disposition, IoHandle, IoRequest, Status, StreamSession};
pub use socket::SocketMutator;

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::error;

use crate::bootstrap::Shutdown;
use crate::config::CollectorConfig;
use crate::labels::LabelMap;
use crate::pipeline::Pipeline;
use crate::proto::Dialout;

/// Startup parameters for one protocol collector.
pub struct CollectorOptions {
    pub address: SocketAddr,
    pub policy: AckPolicy,
    pub max_frame_bytes: usize,
    pub queue_depth: usize,
    pub mutator: Arc<SocketMutator>,
}

impl CollectorOptions {
    pub fn from_config<P: Dialout>(config: &CollectorConfig, mutator: Arc<SocketMutator>) -> Self {
        Self {
            address: config.address,
            policy: AckPolicy::bounded(config.replies.unwrap_or(P::DEFAULT_MAX_REPLIES)),
            max_frame_bytes: config.max_frame_bytes,
            queue_depth: config.queue_depth,
            mutator,
        }
    }
}

/// A running (listener, dispatch loop) pair for one protocol.
pub struct Collector {
    protocol: &'static str,
    listener: Listener,
    dispatch: JoinHandle<()>,
}

impl Collector {
    /// Bind the listener and start the dispatch loop.
    pub async fn spawn<P: Dialout>(
        options: CollectorOptions,
        pipeline: Arc<Pipeline>,
        labels: LabelMap,
        shutdown: &Shutdown,
    ) -> io::Result<Collector> {
        let (handle, queue) = completion_queue(options.queue_depth);

        let listener = Listener::bind::<P>(
            options.address,
            options.mutator,
            handle.clone(),
            shutdown.subscribe(),
        )
        .await?;

        let dispatcher = Dispatcher::<P>::new(
            queue,
            handle,
            pipeline,
            labels,
            options.policy,
            options.max_frame_bytes,
            shutdown.subscribe(),
        );
        let dispatch = tokio::spawn(dispatcher.run());

        Ok(Collector {
            protocol: P::NAME,
            listener,
            dispatch,
        })
    }

    pub fn protocol(&self) -> &'static str {
        self.protocol
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    /// Orderly teardown: the listener stops first (no new streams,
    /// in-flight operations cancelled), then the dispatch loop drains
    /// its queue to closure.
    pub async fn join(self) {
        self.listener.join().await;
        if let Err(error) = self.dispatch.await {
            error!(protocol = self.protocol, %error, "dispatch task failed");
        }
    }
}
