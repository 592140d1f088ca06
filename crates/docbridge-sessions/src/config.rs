//! Session pool settings.

use std::time::Duration;

use docbridge_core::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

/// How the pool refreshes and releases sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionPoolConfig {
    /// Interval between full refreshes.
    #[serde(with = "docbridge_core::duration")]
    pub refresh_period: Duration,
    /// How long a replaced handle stays usable before it is disconnected.
    #[serde(with = "docbridge_core::duration")]
    pub release_grace: Duration,
    /// Profiles logged in at once during a refresh.
    pub max_concurrent_logins: usize,
    /// Upper bound on waiting for pending releases at dispose.
    #[serde(with = "docbridge_core::duration")]
    pub dispose_timeout: Duration,
}

impl Default for SessionPoolConfig {
    fn default() -> Self {
        Self {
            refresh_period: Duration::from_secs(24 * 60 * 60),
            release_grace: Duration::from_secs(10),
            max_concurrent_logins: 4,
            dispose_timeout: Duration::from_secs(30),
        }
    }
}

impl SessionPoolConfig {
    /// Create the default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the refresh period.
    #[must_use]
    pub fn with_refresh_period(mut self, period: Duration) -> Self {
        self.refresh_period = period;
        self
    }

    /// Set the release grace delay.
    #[must_use]
    pub fn with_release_grace(mut self, grace: Duration) -> Self {
        self.release_grace = grace;
        self
    }

    /// Set the login concurrency during a refresh.
    #[must_use]
    pub fn with_max_concurrent_logins(mut self, max: usize) -> Self {
        self.max_concurrent_logins = max;
        self
    }

    /// Check the settings are usable.
    pub fn validate(&self) -> CoreResult<()> {
        if self.refresh_period.is_zero() {
            return Err(CoreError::validation_with_field(
                "refresh period must be positive",
                "sessions.refresh_period",
            ));
        }
        if self.max_concurrent_logins == 0 {
            return Err(CoreError::validation_with_field(
                "max_concurrent_logins must be at least 1",
                "sessions.max_concurrent_logins",
            ));
        }
        Ok(())
    }
}
