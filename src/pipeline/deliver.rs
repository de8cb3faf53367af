//! Delivery sinks.
//!
//! Sinks are invoked synchronously on the dispatch task, so each hands
//! the payload to a bounded channel instead of blocking. Sinks do not
//! retry: a payload that cannot be handed over or written is dropped
//! and the failure reported once.

use bytes::Bytes;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

/// A payload ready for delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryPayload {
    pub key: String,
    pub body: Bytes,
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("sink buffer is full")]
    Full,

    #[error("sink is closed")]
    Closed,
}

pub trait DeliverySink: Send + Sync {
    fn name(&self) -> &'static str;

    fn deliver(&self, payload: &DeliveryPayload) -> Result<(), DeliveryError>;
}

fn hand_over(
    tx: &mpsc::Sender<DeliveryPayload>,
    payload: &DeliveryPayload,
) -> Result<(), DeliveryError> {
    tx.try_send(payload.clone()).map_err(|error| match error {
        mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
        mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
    })
}

/// Producer handle of the in-process delivery queue, the message-queue
/// boundary of the collector.
pub struct QueueProducer {
    tx: mpsc::Sender<DeliveryPayload>,
}

impl QueueProducer {
    pub fn new(capacity: usize) -> (Self, QueueConsumer) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, QueueConsumer { rx })
    }
}

impl DeliverySink for QueueProducer {
    fn name(&self) -> &'static str {
        "queue"
    }

    fn deliver(&self, payload: &DeliveryPayload) -> Result<(), DeliveryError> {
        hand_over(&self.tx, payload)
    }
}

/// Consumer half of the delivery queue; the attachment point for
/// whatever drains it.
pub struct QueueConsumer {
    rx: mpsc::Receiver<DeliveryPayload>,
}

impl QueueConsumer {
    pub async fn recv(&mut self) -> Option<DeliveryPayload> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<DeliveryPayload> {
        self.rx.try_recv().ok()
    }
}

/// Push sink: a background task writes length-delimited payload bodies
/// to a TCP endpoint. The connection is established lazily and dropped
/// on the first write failure; the next payload reconnects.
pub struct PushSocket {
    tx: mpsc::Sender<DeliveryPayload>,
}

impl PushSocket {
    pub fn spawn(endpoint: String, buffer: usize, shutdown: watch::Receiver<bool>) -> Self {
        let (tx, rx) = mpsc::channel(buffer);
        tokio::spawn(push_loop(endpoint, rx, shutdown));
        Self { tx }
    }
}

impl DeliverySink for PushSocket {
    fn name(&self) -> &'static str {
        "push"
    }

    fn deliver(&self, payload: &DeliveryPayload) -> Result<(), DeliveryError> {
        hand_over(&self.tx, payload)
    }
}

async fn push_loop(
    endpoint: String,
    mut rx: mpsc::Receiver<DeliveryPayload>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut connection: Option<TcpStream> = None;

    loop {
        let payload = tokio::select! {
            biased;

            _ = shutdown.changed() => break,

            payload = rx.recv() => match payload {
                None => break,
                Some(payload) => payload,
            },
        };

        if connection.is_none() {
            match TcpStream::connect(&endpoint).await {
                Ok(stream) => {
                    debug!(%endpoint, "push sink connected");
                    connection = Some(stream);
                }
                Err(error) => {
                    warn!(%endpoint, %error, "push sink connect failed; payload dropped");
                    continue;
                }
            }
        }

        if let Some(stream) = connection.as_mut() {
            if let Err(error) = write_frame(stream, &payload.body).await {
                warn!(%endpoint, %error, "push sink write failed; payload dropped");
                connection = None;
            }
        }
    }

    debug!(%endpoint, "push sink stopped");
}

async fn write_frame(stream: &mut TcpStream, body: &[u8]) -> std::io::Result<()> {
    stream.write_u32(body.len() as u32).await?;
    stream.write_all(body).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(key: &str) -> DeliveryPayload {
        DeliveryPayload {
            key: key.to_string(),
            body: Bytes::from_static(b"{}"),
        }
    }

    #[test]
    fn full_queue_reports_and_drops() {
        let (producer, mut consumer) = QueueProducer::new(1);

        producer.deliver(&payload("a")).unwrap();
        assert!(matches!(
            producer.deliver(&payload("b")),
            Err(DeliveryError::Full)
        ));

        assert_eq!(consumer.try_recv().unwrap().key, "a");
        assert!(consumer.try_recv().is_none());
    }

    #[test]
    fn closed_queue_reports_closed() {
        let (producer, consumer) = QueueProducer::new(1);
        drop(consumer);
        assert!(matches!(
            producer.deliver(&payload("a")),
            Err(DeliveryError::Closed)
        ));
    }

    #[tokio::test]
    async fn push_sink_writes_length_delimited_frames() {
        use tokio::io::AsyncReadExt;
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = listener.local_addr().unwrap().to_string();

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let sink = PushSocket::spawn(endpoint, 8, shutdown_rx);

        sink.deliver(&payload("a")).unwrap();

        let (mut accepted, _) = listener.accept().await.unwrap();
        let length = accepted.read_u32().await.unwrap();
        assert_eq!(length, 2);
        let mut body = vec![0u8; length as usize];
        accepted.read_exact(&mut body).await.unwrap();
        assert_eq!(&body, b"{}");
    }
}
