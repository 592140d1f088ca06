//! The recorder is process-wide, so everything that needs it lives in this
//! one test binary.

use std::time::Duration;

use docbridge_telemetry::{init_metrics, record_request, render_metrics, MetricsConfig};

#[test]
fn recorded_metrics_are_rendered() {
    init_metrics(&MetricsConfig::default()).unwrap();
    // second install is a no-op
    init_metrics(&MetricsConfig::default()).unwrap();

    record_request("/documents", 201, Duration::from_millis(40));
    record_request("/documents", 201, Duration::from_millis(60));
    record_request("/documents/{id}", 404, Duration::from_millis(5));
    metrics::counter!("docbridge_reindex_total", "outcome" => "success").increment(1);

    let body = render_metrics().expect("recorder installed");
    assert!(body.contains(r#"docbridge_requests_total{route="/documents",status="201"} 2"#));
    assert!(body.contains(r#"docbridge_requests_total{route="/documents/{id}",status="404"} 1"#));
    assert!(body.contains("docbridge_request_duration_seconds_bucket"));
    assert!(body.contains(r#"docbridge_reindex_total{outcome="success"} 1"#));
    assert!(body.contains("# HELP docbridge_requests_total"));
}
