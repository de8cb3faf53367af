//! Vendor dial-out protocol dialects.
//!
//! Each dialect is a bidirectional stream of length-delimited,
//! protobuf-encoded messages whose schemas are fixed externally. The
//! [`Dialout`] trait is the seam the generic collector core is
//! parameterized over: message types, decoding, the telemetry view
//! handed to the pipeline, and the acknowledgement policy.

pub mod cisco;
mod codec;
pub mod huawei;
pub mod nokia;

pub use cisco::Cisco;
pub use codec::frame_codec;
pub use huawei::Huawei;
pub use nokia::Nokia;

use bytes::Bytes;
use prost::Message;
use std::net::SocketAddr;

/// Protocol-independent view of one decoded inbound message, the unit
/// handed to the transform stage.
#[derive(Debug, Clone)]
pub struct InboundTelemetry {
    pub vendor: &'static str,
    pub peer: SocketAddr,
    pub collection_id: i64,
    pub payload: Bytes,
}

/// One vendor dial-out dialect.
pub trait Dialout: Send + Sync + 'static {
    const NAME: &'static str;

    /// Acknowledgement cap used when the listener config does not
    /// override it.
    const DEFAULT_MAX_REPLIES: u32;

    /// Inbound message schema.
    type Request: Message + Default + Send + 'static;

    /// Acknowledgement schema.
    type Response: Message + Send + 'static;

    /// Decode one inbound frame. A failure here is a per-message decode
    /// error, not a transport error.
    fn decode(frame: &[u8]) -> Result<Self::Request, prost::DecodeError> {
        Self::Request::decode(frame)
    }

    /// The telemetry view of a decoded message.
    fn telemetry(request: &Self::Request, peer: SocketAddr) -> InboundTelemetry;

    /// Build the acknowledgement for a message, or `None` when the
    /// dialect does not acknowledge it.
    fn reply(request: &Self::Request) -> Option<Self::Response>;
}
