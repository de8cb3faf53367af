//! The transform → wrap → deliver pipeline.
//!
//! The boundary between the collector core and everything downstream:
//! a decoded message is normalized against the shared label mapping,
//! wrapped into a delivery payload, and handed to each configured
//! sink. Invoked synchronously from the dispatch loop; a failure costs
//! the affected message, never the stream.

mod deliver;
mod transform;
mod wrap;

pub use deliver::{
    DeliveryError, DeliveryPayload, DeliverySink, PushSocket, QueueConsumer, QueueProducer,
};
pub use transform::{NormalizedRecord, Transform, VendorTransform};
pub use wrap::{EnvelopeWrap, Wrap};

use thiserror::Error;

use crate::labels::LabelMap;
use crate::proto::InboundTelemetry;
use crate::telemetry::counters;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("transform failed: {0}")]
    Transform(String),

    #[error("wrap failed: {0}")]
    Wrap(#[from] serde_json::Error),

    #[error("delivery failed on sink {sink}: {source}")]
    Delivery {
        sink: &'static str,
        source: DeliveryError,
    },
}

impl PipelineError {
    /// Stage label for metrics.
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::Transform(_) => "transform",
            PipelineError::Wrap(_) => "wrap",
            PipelineError::Delivery { .. } => "deliver",
        }
    }
}

pub struct Pipeline {
    transform: Box<dyn Transform>,
    wrap: Box<dyn Wrap>,
    sinks: Vec<Box<dyn DeliverySink>>,
}

impl Pipeline {
    /// Pipeline with the default transform and wrapper and no sinks.
    pub fn new() -> Self {
        Self {
            transform: Box::new(VendorTransform),
            wrap: Box::new(EnvelopeWrap),
            sinks: Vec::new(),
        }
    }

    pub fn with_transform(mut self, transform: Box<dyn Transform>) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_wrap(mut self, wrap: Box<dyn Wrap>) -> Self {
        self.wrap = wrap;
        self
    }

    pub fn add_sink(&mut self, sink: Box<dyn DeliverySink>) {
        self.sinks.push(sink);
    }

    /// Run one decoded message through transform → wrap → deliver.
    /// Sinks are independent: one failing does not stop the others;
    /// the first failure is reported.
    pub fn process(
        &self,
        inbound: &InboundTelemetry,
        labels: &LabelMap,
    ) -> Result<(), PipelineError> {
        let snapshot = labels.snapshot();
        let record = self.transform.transform(inbound, &snapshot)?;
        let payload = self.wrap.wrap(&record)?;

        let mut failure = None;
        for sink in &self.sinks {
            match sink.deliver(&payload) {
                Ok(()) => counters::delivered(sink.name()),
                Err(source) => {
                    counters::delivery_error(sink.name());
                    failure.get_or_insert(PipelineError::Delivery {
                        sink: sink.name(),
                        source,
                    });
                }
            }
        }

        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use serde_json::json;
    use std::collections::HashMap;

    fn inbound(payload: &[u8]) -> InboundTelemetry {
        InboundTelemetry {
            vendor: "cisco",
            peer: "10.1.1.1:50000".parse().unwrap(),
            collection_id: 3,
            payload: Bytes::copy_from_slice(payload),
        }
    }

    #[test]
    fn delivers_an_enriched_envelope() {
        let labels = LabelMap::empty();
        labels.replace(HashMap::from([(
            "10.1.1.1".to_string(),
            vec!["edge".to_string(), "zrh".to_string()],
        )]));

        let (producer, mut consumer) = QueueProducer::new(4);
        let mut pipeline = Pipeline::new();
        pipeline.add_sink(Box::new(producer));

        pipeline
            .process(&inbound(br#"{"bytes_in":42}"#), &labels)
            .unwrap();

        let payload = consumer.try_recv().unwrap();
        assert_eq!(payload.key, "10.1.1.1");

        let envelope: serde_json::Value = serde_json::from_slice(&payload.body).unwrap();
        assert_eq!(envelope["vendor"], json!("cisco"));
        assert_eq!(envelope["collection_id"], json!(3));
        assert_eq!(envelope["labels"], json!(["edge", "zrh"]));
        assert_eq!(envelope["telemetry"]["bytes_in"], json!(42));
    }

    #[test]
    fn one_full_sink_does_not_starve_the_other() {
        let labels = LabelMap::empty();

        let (full, _full_rx) = QueueProducer::new(1);
        let (open, mut open_rx) = QueueProducer::new(4);

        let mut pipeline = Pipeline::new();
        pipeline.add_sink(Box::new(full));
        pipeline.add_sink(Box::new(open));

        // First message fills the capacity-1 sink; the second overflows it
        pipeline.process(&inbound(b"{}"), &labels).unwrap();
        let error = pipeline.process(&inbound(b"{}"), &labels).unwrap_err();
        assert_eq!(error.stage(), "deliver");

        // The open sink still received both deliveries
        assert!(open_rx.try_recv().is_some());
        assert!(open_rx.try_recv().is_some());
    }

    #[test]
    fn transform_failure_is_reported() {
        let labels = LabelMap::empty();
        let pipeline = Pipeline::new();

        let error = pipeline
            .process(&inbound(&[0xff, 0xfe, 0x00]), &labels)
            .unwrap_err();
        assert_eq!(error.stage(), "transform");
    }
}
