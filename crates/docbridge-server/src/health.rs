//! Liveness and readiness reports.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use docbridge_core::DocumentStore;
use docbridge_ingest::Ingestor;
use docbridge_sessions::ProfileStatus;
use serde::Serialize;

/// Overall liveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Serving.
    Healthy,
    /// Shutting down.
    Unhealthy,
}

/// Overall readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessStatus {
    /// Safe to route traffic here.
    Ready,
    /// Not yet, or no longer.
    NotReady,
}

impl ReadinessStatus {
    /// Whether traffic may be routed here.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// Body of the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Seconds since start.
    pub uptime_seconds: u64,
    /// Crate version.
    pub version: String,
}

/// Body of the readiness endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResponse {
    /// Overall status.
    pub status: ReadinessStatus,
    /// Individual checks.
    pub checks: Vec<CheckResult>,
    /// Session state per profile.
    pub profiles: Vec<ProfileStatus>,
}

/// Outcome of one readiness check.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    /// Check name.
    pub name: String,
    /// Whether it passed.
    pub passed: bool,
    /// Failure reason or note.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Time the check took.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl CheckResult {
    /// A passing check.
    pub fn pass(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            message: None,
            duration_ms: None,
        }
    }

    /// A failing check.
    pub fn fail(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            message: Some(message.into()),
            duration_ms: None,
        }
    }

    /// Set the duration.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = Some(duration.as_millis() as u64);
        self
    }
}

/// Tracks process state for the health endpoints.
#[derive(Debug)]
pub struct HealthChecker {
    start_time: Instant,
    draining: AtomicBool,
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthChecker {
    /// Start tracking from now.
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            draining: AtomicBool::new(false),
        }
    }

    /// Report not-ready from now on.
    pub fn set_draining(&self) {
        self.draining.store(true, Ordering::SeqCst);
    }

    /// Whether shutdown has begun.
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    /// Time since start.
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Liveness needs nothing but the process.
    pub fn liveness(&self) -> HealthResponse {
        let status = if self.is_draining() {
            HealthStatus::Unhealthy
        } else {
            HealthStatus::Healthy
        };
        HealthResponse {
            status,
            uptime_seconds: self.uptime().as_secs(),
            version: crate::VERSION.to_string(),
        }
    }

    /// Ready when not draining, the pool is usable and the backend answers
    /// its health probe.
    pub async fn readiness<S: DocumentStore>(&self, ingestor: &Ingestor<S>) -> ReadinessResponse {
        let pool = ingestor.pool();
        let mut checks = Vec::with_capacity(3);

        checks.push(if self.is_draining() {
            CheckResult::fail("process", "shutting down")
        } else {
            CheckResult::pass("process")
        });

        checks.push(if pool.is_disposed() {
            CheckResult::fail("sessions", "session pool disposed")
        } else {
            CheckResult::pass("sessions")
        });

        let start = Instant::now();
        let backend = match ingestor.health_check().await {
            Ok(()) => CheckResult::pass("backend"),
            Err(e) => CheckResult::fail("backend", e.detail()),
        };
        checks.push(backend.with_duration(start.elapsed()));

        let status = if checks.iter().all(|c| c.passed) {
            ReadinessStatus::Ready
        } else {
            ReadinessStatus::NotReady
        };
        ReadinessResponse {
            status,
            checks,
            profiles: pool.status(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readiness_status() {
        assert!(ReadinessStatus::Ready.is_ready());
        assert!(!ReadinessStatus::NotReady.is_ready());
        assert_eq!(
            serde_json::to_string(&ReadinessStatus::NotReady).unwrap(),
            r#""not_ready""#
        );
    }

    #[test]
    fn test_check_result() {
        let pass = CheckResult::pass("backend").with_duration(Duration::from_millis(12));
        assert!(pass.passed);
        assert_eq!(pass.duration_ms, Some(12));

        let fail = CheckResult::fail("sessions", "disposed");
        assert!(!fail.passed);
        let json = serde_json::to_value(&fail).unwrap();
        assert_eq!(json["message"], "disposed");
        assert!(json.get("duration_ms").is_none());
    }

    #[test]
    fn test_liveness_flips_when_draining() {
        let checker = HealthChecker::new();
        assert_eq!(checker.liveness().status, HealthStatus::Healthy);
        checker.set_draining();
        assert_eq!(checker.liveness().status, HealthStatus::Unhealthy);
    }
}
