//! Huawei dial-out dialect (`gRPCDataservice`).
//!
//! `ServiceArgs` flows in both directions; acknowledgements echo the
//! request id.

use bytes::Bytes;
use std::net::SocketAddr;

use super::{Dialout, InboundTelemetry};

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ServiceArgs {
    #[prost(int64, tag = "1")]
    pub req_id: i64,
    #[prost(bytes = "vec", tag = "2")]
    pub data: Vec<u8>,
    #[prost(string, tag = "3")]
    pub errors: String,
}

pub struct Huawei;

impl Dialout for Huawei {
    const NAME: &'static str = "huawei";
    const DEFAULT_MAX_REPLIES: u32 = 100;

    type Request = ServiceArgs;
    type Response = ServiceArgs;

    fn telemetry(request: &Self::Request, peer: SocketAddr) -> InboundTelemetry {
        InboundTelemetry {
            vendor: Self::NAME,
            peer,
            collection_id: request.req_id,
            payload: Bytes::copy_from_slice(&request.data),
        }
    }

    fn reply(request: &Self::Request) -> Option<Self::Response> {
        Some(ServiceArgs {
            req_id: request.req_id,
            data: Vec::new(),
            errors: String::new(),
        })
    }
}
