//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define proxy metrics (requests, latency, phase failures, body rewrites)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `proxy_requests_total` (counter): total requests by method, status
//! - `proxy_request_duration_seconds` (histogram): latency distribution
//! - `proxy_phase_failures_total` (counter): shaping failures by phase, error kind
//! - `proxy_body_rewrites_total` (counter): intercepted bodies by leg, encoding
//! - `proxy_body_size_delta_bytes` (histogram): decoded size change per rewrite
//! - `proxy_upgrades_total` (counter): spliced protocol upgrades
//!
//! # Design Decisions
//! - Low-overhead metric updates (atomic operations)
//! - Labels are low-cardinality: no hosts, paths or tenant names

use std::net::SocketAddr;
use std::time::Instant;

use ::metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// One finished request, whatever its outcome.
pub fn record_request(method: &str, status: u16, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
    ];
    counter!("proxy_requests_total", &labels).increment(1);
    histogram!("proxy_request_duration_seconds", &labels).record(start.elapsed().as_secs_f64());
}

/// A request or response phase that failed.
pub fn record_phase_failure(phase: &'static str, kind: &'static str) {
    counter!("proxy_phase_failures_total", "phase" => phase, "kind" => kind).increment(1);
}

/// A body that went through decode, middleware and encode.
pub fn record_body_rewrite(leg: &'static str, encoding: &'static str, before: usize, after: usize) {
    counter!("proxy_body_rewrites_total", "leg" => leg, "encoding" => encoding).increment(1);
    histogram!("proxy_body_size_delta_bytes", "leg" => leg).record(after as f64 - before as f64);
}

/// A protocol upgrade tunnel was spliced.
pub fn record_upgrade() {
    counter!("proxy_upgrades_total").increment(1);
}
