//! Transform stage: decoded message → normalized record.

use serde::Serialize;
use serde_json::Value;

use super::PipelineError;
use crate::labels::LabelSnapshot;
use crate::proto::InboundTelemetry;

/// A decoded message normalized for delivery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedRecord {
    pub vendor: String,
    pub source: String,
    pub collection_id: i64,
    pub labels: Vec<String>,
    pub telemetry: Value,
}

pub trait Transform: Send + Sync {
    fn transform(
        &self,
        inbound: &InboundTelemetry,
        labels: &LabelSnapshot,
    ) -> Result<NormalizedRecord, PipelineError>;
}

/// Default transform: enrich with the labels recorded for the peer
/// address and interpret the payload as JSON, falling back to a plain
/// string for non-JSON text.
pub struct VendorTransform;

impl Transform for VendorTransform {
    fn transform(
        &self,
        inbound: &InboundTelemetry,
        labels: &LabelSnapshot,
    ) -> Result<NormalizedRecord, PipelineError> {
        let source = inbound.peer.ip().to_string();

        let text = std::str::from_utf8(&inbound.payload)
            .map_err(|_| PipelineError::Transform("payload is not valid UTF-8".to_string()))?;

        let telemetry = match serde_json::from_str::<Value>(text) {
            Ok(value) => value,
            Err(_) => Value::String(text.to_string()),
        };

        let labels = labels.get(&source).cloned().unwrap_or_default();

        Ok(NormalizedRecord {
            vendor: inbound.vendor.to_string(),
            source,
            collection_id: inbound.collection_id,
            labels,
            telemetry,
        })
    }
}
