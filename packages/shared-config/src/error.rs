//! Configuration error types

use thiserror::Error;

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required environment variable is not set
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// An environment variable is set but does not parse
    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
