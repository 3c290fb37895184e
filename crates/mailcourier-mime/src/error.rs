//! Error types for MIME rendering.

/// Result type alias for MIME operations.
pub type Result<T> = std::result::Result<T, Error>;

/// MIME error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Header value would break the header block (CR or LF inside).
    #[error("Invalid MIME header {name}: value contains a line break")]
    InvalidHeader {
        /// Header name.
        name: String,
    },

    /// Invalid content type.
    #[error("Invalid content type: {0}")]
    InvalidContentType(String),

    /// Missing required header.
    #[error("Missing required header: {0}")]
    MissingHeader(&'static str),
}
