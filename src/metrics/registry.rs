// Prometheus metrics registry and collectors
// Author: kelexine (https://github.com/kelexine)

use crate::error::{RelayError, Result};
use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder, register_histogram_with_registry, register_int_counter_vec_with_registry,
    register_int_counter_with_registry, register_int_gauge_with_registry,
};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // ============================================================================
    // RELAY METRICS
    // ============================================================================

    /// Relay requests by outcome (streamed, invalid_request, upstream_status, ...)
    pub static ref RELAY_REQUESTS: IntCounterVec = register_int_counter_vec_with_registry!(
        Opts::new("relay_requests_total", "Total chat relay requests"),
        &["outcome"],
        REGISTRY
    ).unwrap();

    /// Streams currently being relayed
    pub static ref ACTIVE_STREAMS: IntGauge = register_int_gauge_with_registry!(
        Opts::new("relay_active_streams", "Streams currently being relayed"),
        REGISTRY
    ).unwrap();

    /// Bytes forwarded downstream
    pub static ref RELAYED_BYTES: IntCounter = register_int_counter_with_registry!(
        Opts::new("relay_bytes_total", "Total bytes forwarded to clients"),
        REGISTRY
    ).unwrap();

    /// Chunks forwarded downstream
    pub static ref RELAYED_CHUNKS: IntCounter = register_int_counter_with_registry!(
        Opts::new("relay_chunks_total", "Total chunks forwarded to clients"),
        REGISTRY
    ).unwrap();

    // ============================================================================
    // UPSTREAM METRICS
    // ============================================================================

    /// Upstream calls by response status (or "error" for transport failures)
    pub static ref UPSTREAM_CALLS: IntCounterVec = register_int_counter_vec_with_registry!(
        Opts::new("upstream_calls_total", "Total upstream completion calls"),
        &["status_code"],
        REGISTRY
    ).unwrap();

    /// Time from sending the upstream request to its first body chunk
    pub static ref UPSTREAM_FIRST_BYTE: Histogram = register_histogram_with_registry!(
        HistogramOpts::new("upstream_first_byte_seconds", "Upstream time to first byte")
            .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        REGISTRY
    ).unwrap();
}

/// Register every collector so `/metrics` lists them before first use
pub fn init() {
    lazy_static::initialize(&RELAY_REQUESTS);
    lazy_static::initialize(&ACTIVE_STREAMS);
    lazy_static::initialize(&RELAYED_BYTES);
    lazy_static::initialize(&RELAYED_CHUNKS);
    lazy_static::initialize(&UPSTREAM_CALLS);
    lazy_static::initialize(&UPSTREAM_FIRST_BYTE);
}

/// Gather all metrics and return as Prometheus text format
pub fn gather_metrics() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| RelayError::Internal(format!("Failed to encode metrics: {}", e)))?;
    String::from_utf8(buffer)
        .map_err(|e| RelayError::Internal(format!("Metrics are not UTF-8: {}", e)))
}
