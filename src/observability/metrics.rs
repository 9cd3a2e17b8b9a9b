//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status, backend
//! - `proxy_request_duration_seconds` (histogram): end-to-end latency
//! - `proxy_backend_health` (gauge): 1=healthy, 0=otherwise; removed backends read 0
//! - `proxy_pool_size` (gauge): pooled coordinators
//! - `proxy_sync_total` (counter): reconciliations by result
//! - `proxy_session_links_total` (counter): session store writes by op

use metrics::Label;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

use crate::health::HealthStatus;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, backend: &str, start: Instant) {
    let labels = vec![
        Label::new("method", method.to_string()),
        Label::new("status", status.to_string()),
        Label::new("backend", backend.to_string()),
    ];
    metrics::counter!("proxy_requests_total", labels.clone()).increment(1);
    metrics::histogram!("proxy_request_duration_seconds", labels).record(start.elapsed().as_secs_f64());
}

pub fn record_backend_health(backend: &str, status: HealthStatus) {
    let value = if status == HealthStatus::Healthy { 1.0 } else { 0.0 };
    metrics::gauge!("proxy_backend_health", "backend" => backend.to_string()).set(value);
}

pub fn record_pool_size(size: usize) {
    metrics::gauge!("proxy_pool_size").set(size as f64);
}

pub fn record_sync(result: &'static str) {
    metrics::counter!("proxy_sync_total", "result" => result).increment(1);
}

pub fn record_session_op(op: &'static str) {
    metrics::counter!("proxy_session_links_total", "op" => op).increment(1);
}
