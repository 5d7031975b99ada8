//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status, backend
//! - `proxy_request_duration_seconds` (histogram): latency distribution
//! - `proxy_retries_total` (counter): retry attempts by backend
//! - `proxy_probe_latency_seconds` (histogram): probe round-trips
//! - `proxy_backend_reachable` (gauge): 1=reachable, 0=unreachable

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on its own listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, backend: &str, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
        ("backend", backend.to_string()),
    ];
    metrics::counter!("proxy_requests_total", &labels).increment(1);
    metrics::histogram!("proxy_request_duration_seconds", &labels)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_retry(backend: &str) {
    metrics::counter!("proxy_retries_total", "backend" => backend.to_string()).increment(1);
}

/// Record one probe outcome; `latency` is `None` for an unreachable
/// backend.
pub fn record_probe(backend: &str, latency: Option<Duration>) {
    let reachable = if latency.is_some() { 1.0 } else { 0.0 };
    metrics::gauge!("proxy_backend_reachable", "backend" => backend.to_string()).set(reachable);
    if let Some(latency) = latency {
        metrics::histogram!("proxy_probe_latency_seconds", "backend" => backend.to_string())
            .record(latency.as_secs_f64());
    }
}
