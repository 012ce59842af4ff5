//! Weather API error types

use thiserror::Error;

/// Weather API client errors
#[derive(Error, Debug)]
pub enum WeatherError {
    /// Service key is missing or invalid
    #[error("Service key is required for weather API access")]
    MissingServiceKey,

    /// Invalid input provided to API method
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed
    #[error("Failed to parse weather response: {0}")]
    Parse(#[from] serde_json::Error),

    /// The weather API returned an error
    #[error("Weather API error {code}: {message}")]
    Api { code: String, message: String },

    /// The nowcast response carried no usable observation
    #[error("Weather response contains no temperature observation")]
    MissingObservation,

    /// Rate limited by the weather API
    #[error("Rate limited by weather API")]
    RateLimited,

    /// Request timeout
    #[error("Request to weather API timed out")]
    Timeout,
}

impl WeatherError {
    /// Check if this error is retryable (transient failure)
    ///
    /// Retries on:
    /// - Timeouts
    /// - Rate limiting
    /// - Transport errors (connect, timeout)
    /// - Server errors (5xx)
    ///
    /// Does NOT retry on client errors (4xx except 429 rate limiting).
    pub fn is_retryable(&self) -> bool {
        match self {
            WeatherError::Timeout | WeatherError::RateLimited => true,
            WeatherError::Http(e) => {
                if e.is_timeout() || e.is_connect() {
                    return true;
                }
                matches!(e.status(), Some(status) if status.is_server_error())
            }
            _ => false,
        }
    }
}

/// Result type for weather operations
pub type WeatherResult<T> = Result<T, WeatherError>;
