//! Error types for background task operations.

use std::time::Duration;

use thiserror::Error;

/// Result type for task operations.
pub type TaskResult<T> = Result<T, TaskError>;

/// Errors that can occur while spawning or joining tasks.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskError {
    /// Task was cancelled before completion.
    #[error("task cancelled: {0}")]
    Cancelled(String),

    /// Task exceeded its time budget.
    #[error("task timed out after {0:?}")]
    Timeout(Duration),

    /// Task panicked during execution.
    #[error("task panicked: {0}")]
    Panicked(String),

    /// The spawner refused the task.
    #[error("failed to spawn task: {0}")]
    SpawnFailed(String),

    /// Invalid task or scheduler configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl TaskError {
    /// Create a cancelled error.
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled(reason.into())
    }

    /// Create a timeout error.
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout(duration)
    }

    /// Create a panicked error.
    pub fn panicked(reason: impl Into<String>) -> Self {
        Self::Panicked(reason.into())
    }

    /// Create a spawn failed error.
    pub fn spawn_failed(reason: impl Into<String>) -> Self {
        Self::SpawnFailed(reason.into())
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig(reason.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TaskError::timeout(Duration::from_secs(30));
        assert_eq!(err.to_string(), "task timed out after 30s");

        let err = TaskError::spawn_failed("spawner is shut down");
        assert_eq!(err.to_string(), "failed to spawn task: spawner is shut down");
    }
}
