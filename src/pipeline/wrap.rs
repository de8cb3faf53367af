//! Wrap stage: normalized record → delivery payload.

use bytes::Bytes;
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

use super::deliver::DeliveryPayload;
use super::transform::NormalizedRecord;
use super::PipelineError;

pub trait Wrap: Send + Sync {
    fn wrap(&self, record: &NormalizedRecord) -> Result<DeliveryPayload, PipelineError>;
}

/// Default wrapper: a JSON envelope keyed by the source address, with
/// the collection time stamped in.
pub struct EnvelopeWrap;

#[derive(Serialize)]
struct Envelope<'a> {
    #[serde(flatten)]
    record: &'a NormalizedRecord,
    collected_at: u64,
}

impl Wrap for EnvelopeWrap {
    fn wrap(&self, record: &NormalizedRecord) -> Result<DeliveryPayload, PipelineError> {
        let collected_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0);

        let body = serde_json::to_vec(&Envelope {
            record,
            collected_at,
        })?;

        Ok(DeliveryPayload {
            key: record.source.clone(),
            body: Bytes::from(body),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_carries_record_and_timestamp() {
        let record = NormalizedRecord {
            vendor: "huawei".to_string(),
            source: "10.9.9.9".to_string(),
            collection_id: 8,
            labels: vec!["lab".to_string()],
            telemetry: json!({"cpu": 17}),
        };

        let payload = EnvelopeWrap.wrap(&record).unwrap();
        assert_eq!(payload.key, "10.9.9.9");

        let envelope: serde_json::Value = serde_json::from_slice(&payload.body).unwrap();
        assert_eq!(envelope["vendor"], json!("huawei"));
        assert_eq!(envelope["telemetry"]["cpu"], json!(17));
        assert!(envelope["collected_at"].as_u64().unwrap() > 0);
    }
}
