//! Cisco MDT dial-out dialect (`gRPCMdtDialout`).
//!
//! Both directions of the stream carry `MdtDialoutArgs`; the collector
//! acknowledges a chunk by echoing its request id with an empty body.

use bytes::Bytes;
use std::net::SocketAddr;

use super::{Dialout, InboundTelemetry};

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MdtDialoutArgs {
    #[prost(int64, tag = "1")]
    pub req_id: i64,
    #[prost(bytes = "vec", tag = "2")]
    pub data: Vec<u8>,
    #[prost(string, tag = "3")]
    pub errors: String,
}

pub struct Cisco;

impl Dialout for Cisco {
    const NAME: &'static str = "cisco";
    const DEFAULT_MAX_REPLIES: u32 = 100;

    type Request = MdtDialoutArgs;
    type Response = MdtDialoutArgs;

    fn telemetry(request: &Self::Request, peer: SocketAddr) -> InboundTelemetry {
        InboundTelemetry {
            vendor: Self::NAME,
            peer,
            collection_id: request.req_id,
            payload: Bytes::copy_from_slice(&request.data),
        }
    }

    fn reply(request: &Self::Request) -> Option<Self::Response> {
        Some(MdtDialoutArgs {
            req_id: request.req_id,
            data: Vec::new(),
            errors: String::new(),
        })
    }
}
