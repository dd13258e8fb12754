//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): inbound requests by route, status
//! - `proxy_request_duration_seconds` (histogram): inbound latency by route
//! - `proxy_cache_lookups_total` (counter): cache results (hit, miss, stale)
//! - `proxy_cache_entries` (gauge): current cache size
//! - `proxy_upstream_attempts_total` (counter): upstream tries by outcome class
//! - `proxy_upstream_retries_total` (counter): retries scheduled
//! - `proxy_scheduler_active` / `proxy_scheduler_pending` (gauges): admission gate
//! - `proxy_rate_limited_total` (counter): inbound requests rejected with 429
//!
//! Recording is a no-op until [`init_metrics`] installs the Prometheus recorder.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(route: &'static str, status: u16, start: Instant) {
    metrics::counter!(
        "proxy_requests_total",
        "route" => route,
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("proxy_request_duration_seconds", "route" => route)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_cache_lookup(result: &'static str) {
    metrics::counter!("proxy_cache_lookups_total", "result" => result).increment(1);
}

pub fn record_cache_size(size: usize) {
    metrics::gauge!("proxy_cache_entries").set(size as f64);
}

pub fn record_upstream_attempt(outcome: &'static str) {
    metrics::counter!("proxy_upstream_attempts_total", "outcome" => outcome).increment(1);
}

pub fn record_retry() {
    metrics::counter!("proxy_upstream_retries_total").increment(1);
}

pub fn record_scheduler(active: usize, pending: usize) {
    metrics::gauge!("proxy_scheduler_active").set(active as f64);
    metrics::gauge!("proxy_scheduler_pending").set(pending as f64);
}

pub fn record_rate_limited() {
    metrics::counter!("proxy_rate_limited_total").increment(1);
}
