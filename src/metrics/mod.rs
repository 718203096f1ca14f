// Metrics module for Prometheus observability
// Author: kelexine (https://github.com/kelexine)

mod registry;

pub use registry::{
    gather_metrics,
    init,
    ACTIVE_STREAMS,
    RELAYED_BYTES,
    RELAYED_CHUNKS,
    RELAY_REQUESTS,
    UPSTREAM_CALLS,
    UPSTREAM_FIRST_BYTE,
};

/// Helper to record the outcome of a relay request
pub fn record_outcome(outcome: &str) {
    RELAY_REQUESTS.with_label_values(&[outcome]).inc();
}

/// Helper to record an upstream call; `None` means the call never got a response
pub fn record_upstream_call(status_code: Option<u16>) {
    let label = status_code.map_or_else(|| "error".to_string(), |s| s.to_string());
    UPSTREAM_CALLS.with_label_values(&[&label]).inc();
}

pub fn record_first_byte(duration_secs: f64) {
    UPSTREAM_FIRST_BYTE.observe(duration_secs);
}

/// Helper to record a chunk forwarded downstream
pub fn record_chunk(len: usize) {
    RELAYED_CHUNKS.inc();
    RELAYED_BYTES.inc_by(len as u64);
}

pub fn stream_opened() {
    ACTIVE_STREAMS.inc();
}

pub fn stream_closed() {
    ACTIVE_STREAMS.dec();
}
