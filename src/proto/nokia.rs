//! Nokia SR OS dial-out dialect (`DialoutTelemetry`).
//!
//! The stream is asymmetric: the router pushes `SubscribeResponse`
//! messages and the collector acknowledges with `PublishResponse`.
//! Only the subset of the subscribe schema the collector consumes is
//! modeled here.

use bytes::Bytes;
use std::net::SocketAddr;

use super::{Dialout, InboundTelemetry};

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SubscribeResponse {
    #[prost(int64, tag = "1")]
    pub request_id: i64,
    #[prost(bytes = "vec", tag = "2")]
    pub payload: Vec<u8>,
    /// End-of-initial-sync marker; carries no telemetry.
    #[prost(bool, tag = "3")]
    pub sync_response: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PublishResponse {
    #[prost(int64, tag = "1")]
    pub request_id: i64,
}

pub struct Nokia;

impl Dialout for Nokia {
    const NAME: &'static str = "nokia";
    const DEFAULT_MAX_REPLIES: u32 = 100;

    type Request = SubscribeResponse;
    type Response = PublishResponse;

    fn telemetry(request: &Self::Request, peer: SocketAddr) -> InboundTelemetry {
        InboundTelemetry {
            vendor: Self::NAME,
            peer,
            collection_id: request.request_id,
            payload: Bytes::copy_from_slice(&request.payload),
        }
    }

    fn reply(request: &Self::Request) -> Option<Self::Response> {
        Some(PublishResponse {
            request_id: request.request_id,
        })
    }
}
