//! Error types for the core library.

use thiserror::Error;

use crate::limit::RateLimitExceeded;
use crate::record::EmailId;
use crate::transport::TransportError;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A rate-limit window is full; the record stays pending.
    #[error(transparent)]
    RateLimited(#[from] RateLimitExceeded),

    /// Delivery failed in a way that leaves the record pending.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Invalid or incomplete configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A stored timestamp could not be parsed.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// No record with this id.
    #[error("Email not found: {0}")]
    NotFound(EmailId),
}

impl Error {
    /// Returns true if this error means "try again later" because of rate limiting.
    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
