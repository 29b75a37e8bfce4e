//! Metrics collection and exposition.
//!
//! # Metrics
//! - `forge_requests_total` (counter): requests by method, status, route
//! - `forge_request_duration_seconds` (histogram): latency by route
//! - `forge_download_bytes_total` (counter): bytes served by the download relay
//! - `forge_relay_active_connections` (gauge): open WebSocket pairs
//! - `forge_relay_sessions_total` (counter): finished pairs by outcome

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a completed HTTP request.
pub fn record_request(method: &str, status: u16, route: &'static str, start: Instant) {
    ::metrics::counter!(
        "forge_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "route" => route,
    )
    .increment(1);
    ::metrics::histogram!("forge_request_duration_seconds", "route" => route)
        .record(start.elapsed().as_secs_f64());
}

/// Record bytes delivered by the download relay.
pub fn record_download(bytes: usize) {
    ::metrics::counter!("forge_download_bytes_total").increment(bytes as u64);
}

/// A WebSocket pair was established.
pub fn relay_opened() {
    ::metrics::gauge!("forge_relay_active_connections").increment(1.0);
}

/// A WebSocket pair was torn down.
pub fn relay_closed(outcome: &'static str) {
    ::metrics::gauge!("forge_relay_active_connections").decrement(1.0);
    ::metrics::counter!("forge_relay_sessions_total", "outcome" => outcome).increment(1);
}
