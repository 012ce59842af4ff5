//! Error handling for the Vitalink ingest core
//!
//! This module provides a unified error type hierarchy using thiserror
//! covering telemetry decode, session transitions and infrastructure.

use thiserror::Error;

/// Main ingest error type
#[derive(Error, Debug)]
pub enum CoreError {
    // ========== Ingestion Errors ==========
    /// Inbound payload could not be decoded
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Inbound topic matched no known route
    #[error("unrecognized topic: {0}")]
    UnknownTopic(String),

    /// Location string failed to parse
    #[error("invalid location payload: {0}")]
    InvalidLocation(String),

    // ========== Session Errors ==========
    /// Session not found
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Band not found
    #[error("band not found: {0}")]
    BandNotFound(String),

    /// Operation not valid in the session's current state
    #[error("session {session_id} is {actual}, operation requires {expected}")]
    InvalidSessionState {
        session_id: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// Band already has an active session and policy forbids replacement
    #[error("band {band_id} already has active session {session_id}")]
    SessionConflict { band_id: i64, session_id: String },

    /// Stimulation level outside the permitted range
    #[error("stimulation level out of range: {0} (must be 1..=10)")]
    InvalidLevel(i32),

    // ========== Database Errors ==========
    /// Database query failed
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    // ========== Transport Errors ==========
    /// Redis operation failed
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// MQTT publish or subscribe failed
    #[error("mqtt error: {0}")]
    Mqtt(String),

    /// JSON encode/decode failed
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    // ========== Configuration Errors ==========
    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),

    // ========== Internal Errors ==========
    /// Internal error (catch-all for unexpected failures)
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::Redis(_) | Self::Mqtt(_)
        )
    }

    /// Get a severity level for logging
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            // Critical errors that should alert operators
            Self::Configuration(_) => ErrorSeverity::Critical,

            // Errors that indicate service issues
            Self::Database(_) | Self::Redis(_) | Self::Internal(_) => ErrorSeverity::Error,

            // Warnings for expected infrastructure hiccups
            Self::Mqtt(_) | Self::Serialization(_) => ErrorSeverity::Warning,

            // Info level for rejected input and state conflicts
            _ => ErrorSeverity::Info,
        }
    }

    /// Get the processing area this error belongs to, if applicable
    pub fn area(&self) -> Option<&'static str> {
        match self {
            Self::InvalidPayload(_)
            | Self::UnknownTopic(_)
            | Self::InvalidLocation(_) => Some("ingest"),
            Self::SessionNotFound(_)
            | Self::InvalidSessionState { .. }
            | Self::SessionConflict { .. }
            | Self::InvalidLevel(_) => Some("session"),
            Self::Database(_) | Self::BandNotFound(_) => Some("store"),
            Self::Redis(_) | Self::Mqtt(_) => Some("transport"),
            _ => None,
        }
    }

    /// Log the error with appropriate severity
    pub fn log(&self) {
        let area = self.area().unwrap_or("general");
        match self.severity() {
            ErrorSeverity::Critical => {
                tracing::error!(
                    error = %self,
                    area = area,
                    retryable = self.is_retryable(),
                    "Critical ingest error"
                );
            }
            ErrorSeverity::Error => {
                tracing::error!(
                    error = %self,
                    area = area,
                    retryable = self.is_retryable(),
                    "Ingest error"
                );
            }
            ErrorSeverity::Warning => {
                tracing::warn!(
                    error = %self,
                    area = area,
                    retryable = self.is_retryable(),
                    "Ingest warning"
                );
            }
            ErrorSeverity::Info => {
                tracing::info!(
                    error = %self,
                    area = area,
                    retryable = self.is_retryable(),
                    "Ingest info"
                );
            }
        }
    }

    /// Create an invalid-state error from session status names
    pub fn invalid_state(
        session_id: impl Into<String>,
        expected: &'static str,
        actual: &'static str,
    ) -> Self {
        Self::InvalidSessionState {
            session_id: session_id.into(),
            expected,
            actual,
        }
    }
}

/// Error severity levels for logging and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Critical errors that should trigger alerts
    Critical,
    /// Standard errors
    Error,
    /// Warnings for expected failures
    Warning,
    /// Informational messages
    Info,
}

/// Result type alias for ingest operations
pub type CoreResult<T> = Result<T, CoreError>;

impl From<anyhow::Error> for CoreError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<CoreError>() {
            Ok(core_err) => core_err,
            Err(err) => Self::Internal(err.to_string()),
        }
    }
}

impl From<vitalink_shared_config::ConfigError> for CoreError {
    fn from(err: vitalink_shared_config::ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(CoreError::Mqtt("connection reset".to_string()).is_retryable());
        assert!(CoreError::Database(sqlx::Error::PoolClosed).is_retryable());

        assert!(!CoreError::InvalidPayload("bad json".to_string()).is_retryable());
        assert!(!CoreError::InvalidLevel(11).is_retryable());
    }

    #[test]
    fn test_severity_levels() {
        assert_eq!(
            CoreError::Configuration("test".to_string()).severity(),
            ErrorSeverity::Critical
        );
        assert_eq!(
            CoreError::Database(sqlx::Error::PoolClosed).severity(),
            ErrorSeverity::Error
        );
        assert_eq!(
            CoreError::Mqtt("disconnected".to_string()).severity(),
            ErrorSeverity::Warning
        );
        assert_eq!(CoreError::InvalidLevel(0).severity(), ErrorSeverity::Info);
    }

    #[test]
    fn test_area() {
        assert_eq!(
            CoreError::InvalidPayload("x".to_string()).area(),
            Some("ingest")
        );
        assert_eq!(
            CoreError::SessionNotFound("STIM-1".to_string()).area(),
            Some("session")
        );
        assert_eq!(
            CoreError::Database(sqlx::Error::PoolClosed).area(),
            Some("store")
        );
        assert_eq!(CoreError::Internal("x".to_string()).area(), None);
    }

    #[test]
    fn test_error_display() {
        let err = CoreError::invalid_state("STIM-20260830-ABC123", "running", "pending");
        assert_eq!(
            err.to_string(),
            "session STIM-20260830-ABC123 is pending, operation requires running"
        );

        let err = CoreError::InvalidLevel(11);
        assert_eq!(
            err.to_string(),
            "stimulation level out of range: 11 (must be 1..=10)"
        );
    }
}
