//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define dispatch and cache metrics
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `storefront_dispatch_total` (counter): dispatched requests by method, status
//! - `storefront_dispatch_duration_seconds` (histogram): dispatch latency
//! - `storefront_cache_lookups_total` (counter): cache lookups by result (hit, miss)
//!
//! # Design Decisions
//! - Recording without an installed exporter is a no-op
//! - Labels limited to method, status and cache result to bound cardinality

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) -> bool {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => {
            tracing::info!(address = %addr, "Metrics exporter listening");
            true
        }
        Err(err) => {
            tracing::error!(address = %addr, error = %err, "Failed to install metrics exporter");
            false
        }
    }
}

/// Record one dispatched request.
pub fn record_dispatch(method: &str, status: u16, start: Instant) {
    metrics::counter!(
        "storefront_dispatch_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("storefront_dispatch_duration_seconds")
        .record(start.elapsed().as_secs_f64());
}

/// Record a cache lookup outcome.
pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    metrics::counter!("storefront_cache_lookups_total", "result" => result).increment(1);
}
