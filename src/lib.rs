//! dialoutd: telemetry dial-out collector.
//!
//! Routers dial out to the collector over one of three vendor
//! protocols (Cisco MDT, Nokia SR OS, Huawei) and push telemetry over
//! long-lived bidirectional streams. Each protocol gets a listener, a
//! completion queue and a dispatch loop; each accepted stream is a
//! small state machine with exactly one asynchronous operation in
//! flight at a time. Decoded frames flow through the
//! transform → wrap → deliver pipeline into the configured sinks.

pub mod bootstrap;
pub mod collector;
pub mod config;
pub mod labels;
pub mod pipeline;
pub mod proto;
pub mod telemetry;
