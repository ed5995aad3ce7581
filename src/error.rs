//! Error types for feedfun.

use thiserror::Error;

use crate::summary::SummaryError;

/// Common error type for feedfun.
#[derive(Error, Debug)]
pub enum FeedError {
    /// The feed source itself is unusable (malformed URL).
    ///
    /// Raised before any network I/O happens for the source.
    #[error("invalid feed source: {0}")]
    Source(String),

    /// Fetching or parsing a single feed failed.
    #[error("fetch error: {0}")]
    Fetch(String),

    /// Key-value store error.
    ///
    /// Errors from sqlx are automatically converted.
    #[error("store error: {0}")]
    Store(String),

    /// Summary generation failed.
    #[error("summary error: {0}")]
    Summary(#[from] SummaryError),

    /// The subscription list could not be loaded.
    #[error("subscription error: {0}")]
    Subscription(String),

    /// A storage key could not be decoded.
    #[error("invalid storage key: {0}")]
    Key(String),

    /// Record (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<sqlx::Error> for FeedError {
    fn from(e: sqlx::Error) -> Self {
        FeedError::Store(e.to_string())
    }
}

/// Result type alias for feedfun operations.
pub type Result<T> = std::result::Result<T, FeedError>;
