//! # DocBridge Telemetry
//!
//! Logging and metrics set-up for DocBridge processes.
//!
//! - **Logging**: `tracing-subscriber` with JSON or pretty output
//! - **Metrics**: `metrics` recorded into a Prometheus recorder, rendered on
//!   demand by the facade
//!
//! ```rust,ignore
//! use docbridge_telemetry::{init_telemetry, TelemetryConfig};
//!
//! init_telemetry(&TelemetryConfig::default())?;
//! let body = docbridge_telemetry::render_metrics().unwrap_or_default();
//! ```

#![doc(html_root_url = "https://docs.rs/docbridge-telemetry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod logging;
pub mod metrics;

use serde::Deserialize;

pub use error::TelemetryError;
pub use logging::{init_logging, LogConfig};
pub use metrics::{init_metrics, record_request, render_metrics, InFlightGuard, MetricsConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// The `[telemetry]` configuration section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Name reported in the start-up log line.
    pub service_name: String,

    /// Log filter directive.
    pub log_level: String,

    /// JSON log lines; pretty output otherwise.
    pub json_logs: bool,

    /// Install the Prometheus recorder.
    pub metrics_enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "docbridge".to_string(),
            log_level: "info".to_string(),
            json_logs: true,
            metrics_enabled: true,
        }
    }
}

impl TelemetryConfig {
    /// The logging settings this section implies.
    #[must_use]
    pub fn log_config(&self) -> LogConfig {
        let base = if self.json_logs {
            LogConfig::production()
        } else {
            LogConfig::development()
        };
        base.with_level(self.log_level.clone())
            .with_service_name(self.service_name.clone())
    }

    /// The metrics settings this section implies.
    #[must_use]
    pub fn metrics_config(&self) -> MetricsConfig {
        MetricsConfig {
            enabled: self.metrics_enabled,
            ..MetricsConfig::default()
        }
    }

    /// Check the section.
    ///
    /// # Errors
    ///
    /// Returns `TelemetryError::InvalidConfig` for an empty service name or an
    /// unparsable log level.
    pub fn validate(&self) -> TelemetryResult<()> {
        if self.service_name.trim().is_empty() {
            return Err(TelemetryError::InvalidConfig(
                "service_name must not be empty".to_string(),
            ));
        }
        logging::create_env_filter(&self.log_level)
            .map_err(|e| TelemetryError::InvalidConfig(e.to_string()))?;
        Ok(())
    }
}

/// Install logging and metrics.
///
/// # Errors
///
/// Returns the first subsystem failure.
pub fn init_telemetry(config: &TelemetryConfig) -> TelemetryResult<()> {
    init_logging(&config.log_config())?;
    init_metrics(&config.metrics_config())?;
    Ok(())
}

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
