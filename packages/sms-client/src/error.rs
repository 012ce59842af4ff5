//! SMS gateway error types

use thiserror::Error;

/// SMS client errors
#[derive(Error, Debug)]
pub enum SmsError {
    /// API key or sender number is missing
    #[error("SMS gateway credentials are not configured")]
    NotConfigured,

    /// Recipient phone number failed normalization
    #[error("Invalid phone number: {0}")]
    InvalidPhoneNumber(String),

    /// Message body is empty or exceeds the gateway limit
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Gateway rejected the send
    #[error("SMS gateway error {code}: {message}")]
    Gateway { code: String, message: String },

    /// Gateway response could not be parsed
    #[error("Failed to parse gateway response: {0}")]
    ParseResponse(String),

    /// Request timeout
    #[error("Request to SMS gateway timed out")]
    Timeout,
}

impl SmsError {
    /// Check if this error is retryable (transient failure)
    pub fn is_retryable(&self) -> bool {
        match self {
            SmsError::Timeout => true,
            SmsError::Http(e) => {
                if e.is_timeout() || e.is_connect() {
                    return true;
                }
                matches!(e.status(), Some(status) if status.is_server_error())
            }
            _ => false,
        }
    }
}

/// Result type for SMS operations
pub type SmsResult<T> = Result<T, SmsError>;
