//! Prometheus metrics for DocBridge.
//!
//! The recorder is installed without its own listener; the facade renders it
//! from its metrics endpoint with [`render_metrics`].
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `docbridge_requests_total` | Counter | `route`, `status` |
//! | `docbridge_request_duration_seconds` | Histogram | `route` |
//! | `docbridge_in_flight_requests` | Gauge | - |
//! | `docbridge_ingest_steps_total` | Counter | `step`, `outcome` |
//! | `docbridge_session_logins_total` | Counter | `profile`, `outcome` |
//! | `docbridge_reindex_total` | Counter | `outcome` |
//! | `docbridge_backend_call_duration_seconds` | Histogram | `op` |

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

use crate::error::TelemetryError;
use crate::TelemetryResult;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Latency buckets in seconds, from 5ms up to the upload timeout range.
pub const DEFAULT_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0,
];

/// Metrics configuration.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Whether a recorder is installed at all.
    pub enabled: bool,

    /// Buckets for every `*_seconds` histogram.
    pub duration_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            duration_buckets: DEFAULT_BUCKETS.to_vec(),
        }
    }
}

/// Install the process-wide Prometheus recorder.
///
/// Calling it again after a successful install is a no-op.
///
/// # Errors
///
/// Returns `TelemetryError::MetricsInit` if another recorder is installed or
/// the buckets are rejected.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled || METRICS_HANDLE.get().is_some() {
        return Ok(());
    }
    if config.duration_buckets.is_empty() {
        return Err(TelemetryError::InvalidConfig(
            "duration_buckets must not be empty".to_string(),
        ));
    }

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix("_seconds".to_string()),
            &config.duration_buckets,
        )
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?
        .install_recorder()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    let _ = METRICS_HANDLE.set(handle);
    register_metric_descriptions();
    Ok(())
}

/// Render every metric in the Prometheus text format.
///
/// `None` until [`init_metrics`] has installed the recorder.
#[must_use]
pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

fn register_metric_descriptions() {
    describe_counter!(
        "docbridge_requests_total",
        "Inbound HTTP requests by route and status"
    );
    describe_histogram!(
        "docbridge_request_duration_seconds",
        "Inbound HTTP request duration in seconds"
    );
    describe_gauge!(
        "docbridge_in_flight_requests",
        "Inbound HTTP requests currently being processed"
    );
    describe_counter!(
        "docbridge_ingest_steps_total",
        "Document creation steps by step and outcome"
    );
    describe_counter!(
        "docbridge_session_logins_total",
        "Backend credential logins by profile and outcome"
    );
    describe_counter!(
        "docbridge_reindex_total",
        "Background re-indexes by outcome"
    );
    describe_histogram!(
        "docbridge_backend_call_duration_seconds",
        "Backend call duration in seconds by operation"
    );
}

/// Count a finished inbound request and observe its duration.
///
/// `route` must be a route template, never a raw path.
pub fn record_request(route: &'static str, status_code: u16, duration: Duration) {
    counter!(
        "docbridge_requests_total",
        "route" => route,
        "status" => status_code.to_string()
    )
    .increment(1);

    histogram!("docbridge_request_duration_seconds", "route" => route)
        .record(duration.as_secs_f64());
}

/// Keeps `docbridge_in_flight_requests` raised while alive.
#[derive(Debug)]
pub struct InFlightGuard {
    _private: (),
}

impl InFlightGuard {
    /// Raise the gauge.
    #[must_use]
    pub fn new() -> Self {
        gauge!("docbridge_in_flight_requests").increment(1.0);
        Self { _private: () }
    }
}

impl Default for InFlightGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        gauge!("docbridge_in_flight_requests").decrement(1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MetricsConfig::default();
        assert!(config.enabled);
        assert_eq!(config.duration_buckets, DEFAULT_BUCKETS);
        assert!(config.duration_buckets.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_disabled_is_noop() {
        let config = MetricsConfig {
            enabled: false,
            duration_buckets: Vec::new(),
        };
        tokio_test::assert_ok!(init_metrics(&config));
    }

    #[test]
    fn test_recording_without_recorder() {
        record_request("/documents", 201, Duration::from_millis(12));
        let guard = InFlightGuard::new();
        drop(guard);
    }
}
