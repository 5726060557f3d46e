//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): proxied requests by method, status
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_captured_bytes_total` (counter): captured body bytes by direction
//! - `gateway_capture_failures_total` (counter): failed captures by kind
//! - `gateway_reconcile_total` (counter): reconciliation cycles by outcome
//! - `gateway_routes_active` (gauge): routes in the live table
//!
//! Recording goes through the `metrics` facade, so every function here is a
//! no-op until [`init_metrics`] installs the Prometheus recorder.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    metrics::counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("gateway_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

/// `direction` is `request` or `response`.
pub fn record_capture(direction: &'static str, bytes: usize) {
    metrics::counter!("gateway_captured_bytes_total", "direction" => direction)
        .increment(bytes as u64);
}

pub fn record_capture_failure(kind: &'static str) {
    metrics::counter!("gateway_capture_failures_total", "kind" => kind).increment(1);
}

pub fn record_reconcile(outcome: &'static str) {
    metrics::counter!("gateway_reconcile_total", "outcome" => outcome).increment(1);
}

pub fn set_active_routes(count: usize) {
    metrics::gauge!("gateway_routes_active").set(count as f64);
}
