//! Metrics collection and exposition.
//!
//! # Metrics
//! - `cfgd_requests_total` (counter): requests by endpoint, status
//! - `cfgd_request_duration_seconds` (histogram): latency distribution
//! - `cfgd_transactions_total` (counter): make/apply/cancel by outcome
//! - `cfgd_validation_failures_total` (counter): rejected candidates by
//!   failure kind
//!
//! # Design Decisions
//! - Low-overhead metric updates (atomic operations)
//! - Prometheus exposition on a dedicated bind address

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus exporter on its own listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter started"),
        Err(e) => tracing::error!(error = %e, "Failed to start metrics exporter"),
    }
}

/// Record one handled request.
pub fn record_request(endpoint: &'static str, status: u16, start: Instant) {
    metrics::counter!(
        "cfgd_requests_total",
        "endpoint" => endpoint,
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("cfgd_request_duration_seconds", "endpoint" => endpoint)
        .record(start.elapsed().as_secs_f64());
}

/// Record a transaction operation outcome.
pub fn record_transaction(operation: &'static str, ok: bool) {
    metrics::counter!(
        "cfgd_transactions_total",
        "operation" => operation,
        "outcome" => if ok { "ok" } else { "error" }
    )
    .increment(1);
}

/// Record a rejected candidate by failure kind.
pub fn record_validation_failure(kind: &'static str) {
    metrics::counter!("cfgd_validation_failures_total", "kind" => kind).increment(1);
}
