//! Error types for the devserve supervisor.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for supervisor operations.
pub type SupervisorResult<T> = std::result::Result<T, SupervisorError>;

/// Main error type for supervisor operations.
///
/// Variants are split along the failure taxonomy of the system: spawn
/// failures and health timeouts are fatal to startup, everything else is
/// handled (and logged) close to where it occurs.
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// A child process could not be spawned (binary missing, permission
    /// denied). Fatal: the run is aborted.
    #[error("Process spawn failed: {name} - {reason}")]
    SpawnFailed { name: String, reason: String },

    /// A child process could not be signalled or waited on during stop.
    #[error("Process stop failed: {name} - {reason}")]
    StopFailed { name: String, reason: String },

    /// An operation was requested in a state that does not allow it.
    #[error("Invalid process state: {name} - expected {expected}, got {actual}")]
    InvalidState {
        name: String,
        expected: String,
        actual: String,
    },

    /// The backend never reported healthy within the deadline. Fatal: the
    /// frontend is never served against an unhealthy backend.
    #[error("Health check timed out after {timeout:?}: {url}")]
    HealthTimeout { url: String, timeout: Duration },

    /// Invalid or missing configuration value.
    #[error("Configuration error: {key} - {reason}")]
    Configuration { key: String, reason: String },

    /// The static frontend server failed to bind or serve.
    #[error("Frontend server error: {0}")]
    Frontend(String),

    /// I/O error (wraps std::io::Error).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SupervisorError {
    /// Creates a SpawnFailed error.
    pub fn spawn_failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SpawnFailed {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates a StopFailed error.
    pub fn stop_failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StopFailed {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates an InvalidState error.
    pub fn invalid_state(
        name: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::InvalidState {
            name: name.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Creates a HealthTimeout error.
    pub fn health_timeout(url: impl Into<String>, timeout: Duration) -> Self {
        Self::HealthTimeout {
            url: url.into(),
            timeout,
        }
    }

    /// Creates a Configuration error.
    pub fn configuration(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// True for errors that must abort the whole startup sequence.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::SpawnFailed { .. }
                | Self::HealthTimeout { .. }
                | Self::Configuration { .. }
                | Self::Frontend(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let err = SupervisorError::spawn_failed("backend", "executable not found");
        assert!(matches!(err, SupervisorError::SpawnFailed { .. }));
        assert!(err.to_string().contains("spawn failed"));
        assert!(err.to_string().contains("backend"));
    }

    #[test]
    fn test_health_timeout_display() {
        let err = SupervisorError::health_timeout(
            "http://127.0.0.1:3000/api/health",
            Duration::from_secs(20),
        );
        assert!(err.to_string().contains("/api/health"));
        assert!(err.to_string().contains("20"));
    }

    #[test]
    fn test_fatal_classification() {
        assert!(SupervisorError::spawn_failed("x", "y").is_fatal());
        assert!(SupervisorError::health_timeout("u", Duration::from_secs(1)).is_fatal());
        assert!(!SupervisorError::stop_failed("x", "y").is_fatal());
        assert!(!SupervisorError::invalid_state("x", "running", "stopped").is_fatal());
    }
}
