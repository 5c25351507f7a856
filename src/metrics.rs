//! Prometheus metrics for relay traffic.
//!
//! Thin wrappers over the `metrics` facade so handlers record with one call.
//! The exporter recorder is process-global and installed at most once, which
//! lets tests build several routers in the same process.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;
use tracing::warn;

static HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

/// Install the Prometheus recorder (first call only) and return its handle.
///
/// Returns `None` if another recorder was already installed globally.
pub fn init() -> Option<PrometheusHandle> {
    HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("Prometheus recorder not installed: {}", e);
                None
            }
        })
        .clone()
}

/// Count a finished relay request by kind (`manifest`, `media`, `invalid`) and status.
pub fn record_request(kind: &'static str, status: u16) {
    metrics::counter!(
        "relay_requests_total",
        "kind" => kind,
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record time spent serving a request up to the response head.
pub fn record_duration(kind: &'static str, start: Instant) {
    metrics::histogram!("relay_request_duration_seconds", "kind" => kind)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_upstream_error(kind: &'static str) {
    metrics::counter!("relay_upstream_errors_total", "kind" => kind).increment(1);
}

/// A manifest reference that could not be resolved and was passed through.
pub fn record_rewrite_anomaly() {
    metrics::counter!("relay_rewrite_anomalies_total").increment(1);
}

pub fn record_rewritten_references(count: usize) {
    metrics::counter!("relay_manifest_references_total").increment(count as u64);
}
