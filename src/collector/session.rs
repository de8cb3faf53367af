//! Dial-out stream session state machine.
//!
//! One session per accepted stream, generic over the protocol dialect.
//! A session keeps exactly one asynchronous operation in flight at a
//! time (the capacity-1 operation channel enforces this), which makes
//! completion ordering per session trivial: events arrive in the order
//! the operations were issued.

use std::net::SocketAddr;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::queue::{StreamError, StreamEvent};
use super::registry::SessionToken;
use crate::labels::LabelMap;
use crate::pipeline::Pipeline;
use crate::proto::Dialout;
use crate::telemetry::counters;

/// Session lifecycle status. Only ever moves forward:
/// Start → Flow ⇄ Processing → End.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Start,
    Flow,
    Processing,
    End,
}

/// What the dispatch loop should do with the session after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Disposition {
    Continue,
    Finished,
}

/// Acknowledgement policy for one listener. A cap of 0 makes the
/// protocol fire-and-forget.
#[derive(Debug, Clone, Copy)]
pub struct AckPolicy {
    max_replies: u32,
}

impl AckPolicy {
    pub fn bounded(max_replies: u32) -> Self {
        Self { max_replies }
    }

    pub fn fire_and_forget() -> Self {
        Self { max_replies: 0 }
    }

    pub fn max_replies(&self) -> u32 {
        self.max_replies
    }
}

/// One asynchronous operation request, performed by the session's
/// connection driver.
#[derive(Debug)]
pub enum IoRequest<R> {
    Read,
    Write(R),
}

/// Sender half of a session's operation channel. The channel has
/// capacity 1: issuing a second operation while one is outstanding is
/// a discipline violation and is refused.
pub struct IoHandle<R> {
    tx: mpsc::Sender<IoRequest<R>>,
}

impl<R> IoHandle<R> {
    pub fn new(tx: mpsc::Sender<IoRequest<R>>) -> Self {
        Self { tx }
    }

    fn issue(&self, request: IoRequest<R>) -> bool {
        match self.tx.try_send(request) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("operation issued while another is outstanding; refused");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

/// One dial-out stream from acceptance to teardown.
pub struct StreamSession<P: Dialout> {
    token: SessionToken,
    peer: SocketAddr,
    status: Status,
    replies_sent: u32,
    policy: AckPolicy,
    io: IoHandle<P::Response>,
}

impl<P: Dialout> StreamSession<P> {
    pub fn new(
        token: SessionToken,
        peer: SocketAddr,
        policy: AckPolicy,
        io: IoHandle<P::Response>,
    ) -> Self {
        Self {
            token,
            peer,
            status: Status::Start,
            replies_sent: 0,
            policy,
            io,
        }
    }

    pub fn token(&self) -> SessionToken {
        self.token
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn replies_sent(&self) -> u32 {
        self.replies_sent
    }

    /// Acceptance completed: issue the first read. Acceptance itself
    /// was already re-armed by the accept loop.
    pub fn start(&mut self) -> Disposition {
        if self.status != Status::Start {
            warn!(protocol = P::NAME, peer = %self.peer, status = ?self.status, "start on a running session");
        }
        self.issue_read()
    }

    /// Advance the state machine with one completion event.
    pub fn handle(
        &mut self,
        event: StreamEvent,
        pipeline: &Pipeline,
        labels: &LabelMap,
    ) -> Disposition {
        match event {
            StreamEvent::Frame(frame) => self.on_frame(&frame, pipeline, labels),
            StreamEvent::Sent => self.issue_read(),
            StreamEvent::Closed => self.finish("closed"),
            StreamEvent::Failed(StreamError::Aborted) => self.finish("aborted"),
            StreamEvent::Failed(StreamError::Io(error)) => {
                debug!(protocol = P::NAME, peer = %self.peer, %error, "transport failure");
                self.finish("transport")
            }
        }
    }

    fn on_frame(&mut self, frame: &[u8], pipeline: &Pipeline, labels: &LabelMap) -> Disposition {
        self.status = Status::Processing;
        counters::frame_received(P::NAME);

        let request = match P::decode(frame) {
            Ok(request) => request,
            Err(error) => {
                // Per-message failure: the stream lives on.
                warn!(protocol = P::NAME, peer = %self.peer, %error, "failed to decode inbound frame");
                counters::decode_error(P::NAME);
                return self.issue_read();
            }
        };

        let inbound = P::telemetry(&request, self.peer);
        if let Err(error) = pipeline.process(&inbound, labels) {
            // The message is lost, the stream is not.
            warn!(protocol = P::NAME, peer = %self.peer, %error, "pipeline rejected message");
            counters::pipeline_error(P::NAME, error.stage());
        }

        // Acknowledgements are flow control, bounded per stream and
        // independent of pipeline success.
        if self.replies_sent < self.policy.max_replies() {
            if let Some(reply) = P::reply(&request) {
                if !self.io.issue(IoRequest::Write(reply)) {
                    return self.finish("io closed");
                }
                self.replies_sent += 1;
                counters::reply_sent(P::NAME);
                self.status = Status::Flow;
                return Disposition::Continue;
            }
        }

        self.issue_read()
    }

    fn issue_read(&mut self) -> Disposition {
        if !self.io.issue(IoRequest::Read) {
            return self.finish("io closed");
        }
        self.status = Status::Flow;
        Disposition::Continue
    }

    fn finish(&mut self, reason: &'static str) -> Disposition {
        debug!(
            protocol = P::NAME,
            peer = %self.peer,
            reason,
            replies = self.replies_sent,
            "stream session ended"
        );
        counters::stream_closed(P::NAME, reason);
        self.status = Status::End;
        Disposition::Finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::registry::SessionRegistry;
    use crate::pipeline::{QueueConsumer, QueueProducer};
    use crate::proto::cisco::{Cisco, MdtDialoutArgs};
    use bytes::Bytes;
    use prost::Message;

    struct Fixture {
        registry: SessionRegistry<Cisco>,
        token: SessionToken,
        ops: mpsc::Receiver<IoRequest<MdtDialoutArgs>>,
        pipeline: Pipeline,
        delivered: QueueConsumer,
        labels: LabelMap,
    }

    impl Fixture {
        fn new(policy: AckPolicy) -> Self {
            let (tx, ops) = mpsc::channel(1);
            let mut registry = SessionRegistry::new();
            let token = registry.insert(|token| {
                StreamSession::new(
                    token,
                    "192.0.2.7:49152".parse().unwrap(),
                    policy,
                    IoHandle::new(tx),
                )
            });

            let (producer, delivered) = QueueProducer::new(16);
            let mut pipeline = Pipeline::new();
            pipeline.add_sink(Box::new(producer));

            Self {
                registry,
                token,
                ops,
                pipeline,
                delivered,
                labels: LabelMap::empty(),
            }
        }

        fn session(&mut self) -> &mut StreamSession<Cisco> {
            self.registry.get_mut(self.token).unwrap()
        }

        fn handle(&mut self, event: StreamEvent) -> Disposition {
            let pipeline = &self.pipeline;
            let labels = &self.labels;
            self.registry
                .get_mut(self.token)
                .unwrap()
                .handle(event, pipeline, labels)
        }

        fn next_op(&mut self) -> IoRequest<MdtDialoutArgs> {
            self.ops.try_recv().expect("expected an issued operation")
        }
    }

    fn frame(req_id: i64, data: &[u8]) -> StreamEvent {
        let message = MdtDialoutArgs {
            req_id,
            data: data.to_vec(),
            errors: String::new(),
        };
        StreamEvent::Frame(Bytes::from(message.encode_to_vec()))
    }

    #[test]
    fn start_issues_the_first_read() {
        let mut fixture = Fixture::new(AckPolicy::bounded(1));

        assert_eq!(fixture.session().status(), Status::Start);
        assert_eq!(fixture.session().start(), Disposition::Continue);
        assert_eq!(fixture.session().status(), Status::Flow);
        assert!(matches!(fixture.next_op(), IoRequest::Read));
    }

    #[test]
    fn frame_is_processed_and_acknowledged() {
        let mut fixture = Fixture::new(AckPolicy::bounded(10));
        let _ = fixture.session().start();
        let _ = fixture.next_op();

        let disposition = fixture.handle(frame(42, br#"{"iface":"ge-0/0/1"}"#));
        assert_eq!(disposition, Disposition::Continue);
        assert_eq!(fixture.session().status(), Status::Flow);
        assert_eq!(fixture.session().replies_sent(), 1);

        match fixture.next_op() {
            IoRequest::Write(reply) => assert_eq!(reply.req_id, 42),
            IoRequest::Read => panic!("expected a write"),
        }
        assert!(fixture.delivered.try_recv().is_some());

        // Write completion re-arms the read
        assert_eq!(fixture.handle(StreamEvent::Sent), Disposition::Continue);
        assert!(matches!(fixture.next_op(), IoRequest::Read));
    }

    #[test]
    fn decode_failure_continues_with_the_next_read() {
        let mut fixture = Fixture::new(AckPolicy::bounded(10));
        let _ = fixture.session().start();
        let _ = fixture.next_op();

        // 0xff is not a valid field tag
        let disposition = fixture.handle(StreamEvent::Frame(Bytes::from_static(&[0xff, 0xff])));
        assert_eq!(disposition, Disposition::Continue);
        assert_eq!(fixture.session().status(), Status::Flow);
        assert_eq!(fixture.session().replies_sent(), 0);
        assert!(matches!(fixture.next_op(), IoRequest::Read));
        assert!(fixture.delivered.try_recv().is_none());

        // The next well-formed frame still flows through
        let _ = fixture.handle(frame(1, b"{}"));
        assert!(fixture.delivered.try_recv().is_some());
    }

    #[test]
    fn pipeline_failure_does_not_end_the_session() {
        let mut fixture = Fixture::new(AckPolicy::bounded(10));
        let _ = fixture.session().start();
        let _ = fixture.next_op();

        // Invalid UTF-8 payload fails the transform stage
        let disposition = fixture.handle(frame(5, &[0xff, 0xfe, 0x00]));
        assert_eq!(disposition, Disposition::Continue);
        assert!(fixture.delivered.try_recv().is_none());

        // The message is lost but the ack still goes out
        assert_eq!(fixture.session().replies_sent(), 1);
        assert!(matches!(fixture.next_op(), IoRequest::Write(_)));
    }

    #[test]
    fn replies_stop_at_the_cap() {
        let mut fixture = Fixture::new(AckPolicy::bounded(1));
        let _ = fixture.session().start();
        let _ = fixture.next_op();

        let _ = fixture.handle(frame(1, b"{}"));
        assert!(matches!(fixture.next_op(), IoRequest::Write(_)));
        let _ = fixture.handle(StreamEvent::Sent);
        let _ = fixture.next_op();

        // Cap reached: further frames are read straight through
        let _ = fixture.handle(frame(2, b"{}"));
        assert_eq!(fixture.session().replies_sent(), 1);
        assert!(matches!(fixture.next_op(), IoRequest::Read));
    }

    #[test]
    fn transport_failure_forces_end_from_any_state() {
        let mut fixture = Fixture::new(AckPolicy::fire_and_forget());
        let _ = fixture.session().start();
        let _ = fixture.next_op();

        let error = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let disposition = fixture.handle(StreamEvent::Failed(StreamError::Io(error)));
        assert_eq!(disposition, Disposition::Finished);
        assert_eq!(fixture.session().status(), Status::End);
    }

    #[test]
    fn half_close_forces_end() {
        let mut fixture = Fixture::new(AckPolicy::fire_and_forget());
        let _ = fixture.session().start();
        let _ = fixture.next_op();

        let _ = fixture.handle(frame(9, b"{}"));
        let _ = fixture.next_op();

        assert_eq!(fixture.handle(StreamEvent::Closed), Disposition::Finished);
        assert_eq!(fixture.session().status(), Status::End);
    }
}
