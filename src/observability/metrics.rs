//! Metrics collection and exposition.
//!
//! # Metrics
//! - `header_proxy_requests_total` (counter): requests by method, status, kind
//! - `header_proxy_request_duration_seconds` (histogram): end-to-end latency
//! - `header_proxy_session_transitions_total` (counter): status events by status
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one handled request. `kind` is `forwarded`, `diagnostic` or `error`.
pub fn record_request(method: &str, status: u16, kind: &'static str, start: Instant) {
    metrics::counter!(
        "header_proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "kind" => kind
    )
    .increment(1);
    metrics::histogram!("header_proxy_request_duration_seconds", "kind" => kind)
        .record(start.elapsed().as_secs_f64());
}

/// Record a session status event.
pub fn record_transition(status: &'static str) {
    metrics::counter!("header_proxy_session_transitions_total", "status" => status).increment(1);
}
