//! Realtime store error types

use thiserror::Error;

/// Errors reported by a realtime store backend
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The backend refused access to the path (rules, revoked credentials)
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The backend could not be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Request timed out
    #[error("Store request timed out")]
    Timeout,

    /// Backend answered with an unexpected status
    #[error("Store API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Payload could not be decoded
    #[error("Malformed store payload: {0}")]
    Malformed(String),

    /// Path was rejected before reaching the backend
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Rate limited by the backend
    #[error("Rate limited")]
    RateLimited,
}

impl StoreError {
    /// Whether a subscription should keep reconnecting after this error
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Unavailable(_) | StoreError::Timeout | StoreError::RateLimited
        )
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            StoreError::Timeout
        } else if err.is_decode() {
            StoreError::Malformed(err.to_string())
        } else {
            StoreError::Unavailable(err.to_string())
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Malformed(err.to_string())
    }
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;
