//! Error types for DocBridge.
//!
//! [`CoreError`] is the single error taxonomy shared by the backend adapter,
//! the session pool, and the ingestion orchestrator. Callers branch on the
//! variant, never on message text.
//!
//! | Variant | Outward status | Retryable |
//! |---|---|---|
//! | `Validation` | 400 | no |
//! | `ProfileNotFound` | 401 | no |
//! | `SessionExpired` | 500 | no |
//! | `SessionUnavailable` | 500 | no |
//! | `UpstreamRejected` | backend 4xx (401/403/407 become 502) | no |
//! | `UpstreamUnavailable` | 503 | yes |
//! | `Internal` | 500 | no |

use thiserror::Error;

/// Result type alias using [`CoreError`].
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors surfaced by the document store bridge.
///
/// # Example
///
/// ```
/// use docbridge_core::CoreError;
///
/// let err = CoreError::validation_with_field("payload is empty", "file");
/// assert_eq!(err.status_code(), 400);
/// assert!(!err.is_retryable());
/// ```
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoreError {
    /// Caller input was rejected before any backend call was made.
    #[error("Validation error: {message}")]
    Validation {
        /// Human-readable error message.
        message: String,
        /// Input field that failed validation.
        field: Option<String>,
    },

    /// The named profile is not configured.
    #[error("Profile not found: {profile}")]
    ProfileNotFound {
        /// Requested profile name.
        profile: String,
    },

    /// The backend no longer recognises a session handle.
    #[error("Session expired: {message}")]
    SessionExpired {
        /// Backend-provided detail.
        message: String,
    },

    /// No usable session could be obtained for a profile.
    #[error("Session unavailable for profile '{profile}': {message}")]
    SessionUnavailable {
        /// Profile name.
        profile: String,
        /// Cause of the last failed attempt.
        message: String,
    },

    /// The backend answered with a 4xx status.
    #[error("Upstream rejected request ({status}): {message}")]
    UpstreamRejected {
        /// Backend HTTP status.
        status: u16,
        /// Backend-provided detail.
        message: String,
    },

    /// The backend answered with a 5xx status, timed out, or was unreachable.
    #[error("Upstream unavailable: {message}")]
    UpstreamUnavailable {
        /// Backend HTTP status, if a response was received.
        status: Option<u16>,
        /// Backend-provided or transport detail.
        message: String,
    },

    /// Unexpected response shape or broken internal invariant.
    #[error("Internal error: {message}")]
    Internal {
        /// Diagnostic message.
        message: String,
    },
}

impl CoreError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: None,
        }
    }

    /// Create a validation error naming the offending field.
    pub fn validation_with_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a profile-not-found error.
    pub fn profile_not_found(profile: impl Into<String>) -> Self {
        Self::ProfileNotFound {
            profile: profile.into(),
        }
    }

    /// Create a session-expired error.
    pub fn session_expired(message: impl Into<String>) -> Self {
        Self::SessionExpired {
            message: message.into(),
        }
    }

    /// Create a session-unavailable error.
    pub fn session_unavailable(profile: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SessionUnavailable {
            profile: profile.into(),
            message: message.into(),
        }
    }

    /// Create an upstream-rejected error.
    pub fn upstream_rejected(status: u16, message: impl Into<String>) -> Self {
        Self::UpstreamRejected {
            status,
            message: message.into(),
        }
    }

    /// Create an upstream-unavailable error without a response status.
    pub fn upstream_unavailable(message: impl Into<String>) -> Self {
        Self::UpstreamUnavailable {
            status: None,
            message: message.into(),
        }
    }

    /// Create an upstream-unavailable error carrying the backend status.
    pub fn upstream_unavailable_with_status(status: u16, message: impl Into<String>) -> Self {
        Self::UpstreamUnavailable {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Classify a non-2xx backend status.
    pub fn from_upstream_status(status: u16, message: impl Into<String>) -> Self {
        if (400..500).contains(&status) {
            Self::upstream_rejected(status, message)
        } else {
            Self::upstream_unavailable_with_status(status, message)
        }
    }

    /// Get the HTTP status code this error maps to at the facade.
    #[allow(clippy::match_same_arms)]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            Self::ProfileNotFound { .. } => 401,
            Self::SessionExpired { .. } => 500,
            Self::SessionUnavailable { .. } => 500,
            Self::UpstreamRejected { status, .. } => match status {
                401 | 403 | 407 => 502,
                s if (400..500).contains(s) => *s,
                _ => 502,
            },
            Self::UpstreamUnavailable { .. } => 503,
            Self::Internal { .. } => 500,
        }
    }

    /// Whether the caller may retry the whole operation.
    ///
    /// The bridge itself never retries; this only informs the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::UpstreamUnavailable { .. })
    }

    /// Get the error category for metrics and logs.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::ProfileNotFound { .. } => "profile",
            Self::SessionExpired { .. } => "session_expired",
            Self::SessionUnavailable { .. } => "session_unavailable",
            Self::UpstreamRejected { .. } => "upstream_rejected",
            Self::UpstreamUnavailable { .. } => "upstream_unavailable",
            Self::Internal { .. } => "internal",
        }
    }

    /// Message suitable for returning to a client.
    pub fn detail(&self) -> String {
        match self {
            Self::Validation { message, .. }
            | Self::SessionExpired { message }
            | Self::UpstreamRejected { message, .. }
            | Self::UpstreamUnavailable { message, .. }
            | Self::Internal { message } => message.clone(),
            Self::ProfileNotFound { profile } => format!("unknown profile '{profile}'"),
            Self::SessionUnavailable { profile, .. } => {
                format!("no backend session available for profile '{profile}'")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_constructors() {
        let err = CoreError::validation("missing type");
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.category(), "validation");

        let err = CoreError::profile_not_found("ops");
        assert_eq!(err.status_code(), 401);

        let err = CoreError::session_unavailable("ops", "login refused");
        assert_eq!(err.status_code(), 500);

        let err = CoreError::upstream_unavailable("timed out");
        assert_eq!(err.status_code(), 503);
    }

    #[test]
    fn test_upstream_status_classification() {
        assert!(matches!(
            CoreError::from_upstream_status(404, "gone"),
            CoreError::UpstreamRejected { status: 404, .. }
        ));
        assert!(matches!(
            CoreError::from_upstream_status(502, "bad gateway"),
            CoreError::UpstreamUnavailable {
                status: Some(502),
                ..
            }
        ));
    }

    #[test]
    fn test_rejected_status_passthrough() {
        assert_eq!(CoreError::upstream_rejected(404, "x").status_code(), 404);
        assert_eq!(CoreError::upstream_rejected(413, "x").status_code(), 413);
        assert_eq!(CoreError::upstream_rejected(401, "x").status_code(), 502);
        assert_eq!(CoreError::upstream_rejected(403, "x").status_code(), 502);
    }

    #[test]
    fn test_is_retryable() {
        assert!(CoreError::upstream_unavailable("test").is_retryable());
        assert!(!CoreError::upstream_rejected(400, "test").is_retryable());
        assert!(!CoreError::internal("test").is_retryable());
        assert!(!CoreError::validation("test").is_retryable());
    }

    #[test]
    fn test_detail_hides_session_cause() {
        let err = CoreError::session_unavailable("ops", "password=hunter2 rejected");
        assert!(!err.detail().contains("hunter2"));
        assert!(err.to_string().contains("ops"));
    }
}
