//! Metric counters for collector lifecycle and pipeline events.

use metrics::{counter, gauge};

pub fn listener_started(protocol: &str) {
    counter!("dialoutd.listener.starts", "protocol" => protocol.to_string()).increment(1);
}

pub fn listener_accept_error(protocol: &str) {
    counter!("dialoutd.listener.accept_errors", "protocol" => protocol.to_string()).increment(1);
}

pub fn socket_hook_failed(protocol: &str) {
    counter!("dialoutd.socket_hook.failures", "protocol" => protocol.to_string()).increment(1);
}

pub fn stream_accepted(protocol: &str) {
    counter!("dialoutd.streams.accepted", "protocol" => protocol.to_string()).increment(1);
}

pub fn stream_closed(protocol: &str, reason: &str) {
    counter!(
        "dialoutd.streams.closed",
        "protocol" => protocol.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

pub fn sessions_active(protocol: &str, count: usize) {
    gauge!("dialoutd.sessions.active", "protocol" => protocol.to_string()).set(count as f64);
}

pub fn frame_received(protocol: &str) {
    counter!("dialoutd.frames.received", "protocol" => protocol.to_string()).increment(1);
}

pub fn decode_error(protocol: &str) {
    counter!("dialoutd.frames.decode_errors", "protocol" => protocol.to_string()).increment(1);
}

pub fn reply_sent(protocol: &str) {
    counter!("dialoutd.replies.sent", "protocol" => protocol.to_string()).increment(1);
}

pub fn stale_completion(protocol: &str) {
    counter!("dialoutd.completions.stale", "protocol" => protocol.to_string()).increment(1);
}

pub fn pipeline_error(protocol: &str, stage: &str) {
    counter!(
        "dialoutd.pipeline.errors",
        "protocol" => protocol.to_string(),
        "stage" => stage.to_string()
    )
    .increment(1);
}

pub fn delivered(sink: &str) {
    counter!("dialoutd.delivery.sent", "sink" => sink.to_string()).increment(1);
}

pub fn delivery_error(sink: &str) {
    counter!("dialoutd.delivery.errors", "sink" => sink.to_string()).increment(1);
}

pub fn labels_refreshed(entries: usize) {
    counter!("dialoutd.labels.refreshes").increment(1);
    gauge!("dialoutd.labels.entries").set(entries as f64);
}
