// src/error.rs

//! Unified error handling for the worker.

use thiserror::Error;

/// Result type alias for worker operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Search API rejected the credential (HTTP 403). Pauses all polling.
    #[error("Search API auth error: {0}")]
    Auth(String),

    /// Search API rate limit hit (HTTP 429)
    #[error("Search API rate limited: {0}")]
    RateLimited(String),

    /// Request timed out, retries exhausted
    #[error("Search API timeout: {0}")]
    Timeout(String),

    /// Server-side failure (5xx), retries exhausted
    #[error("Search API server error {status}: {message}")]
    Server { status: u16, message: String },

    /// Any other client-side rejection (4xx except 403/429)
    #[error("Search API client error {status}: {message}")]
    Api { status: u16, message: String },

    /// Response body did not match the expected shape
    #[error("Malformed search API response: {0}")]
    Malformed(String),

    /// Persistent store operation failed
    #[error("Store error: {0}")]
    Store(String),

    /// Notification transport failure
    #[error("Notification error: {0}")]
    Notify(String),
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a store error.
    pub fn store(message: impl std::fmt::Display) -> Self {
        Self::Store(message.to_string())
    }

    /// Create a notification transport error.
    pub fn notify(message: impl std::fmt::Display) -> Self {
        Self::Notify(message.to_string())
    }

    /// True for the one error class that is fatal to the whole system:
    /// the shared search credential is invalid for every subsequent call.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    /// True for transient per-watch failures that warrant a watch-local
    /// backoff rather than a global pause.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited(_) | Self::Timeout(_) | Self::Server { .. }
        )
    }
}
