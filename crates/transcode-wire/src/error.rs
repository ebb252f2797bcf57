//! Wire-level error types.

use thiserror::Error;

/// Errors that can occur while building, sending, or delivering wire envelopes.
#[derive(Debug, Error)]
pub enum WireError {
    /// The callback URL could not be parsed.
    #[error("invalid callback URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// HTTP transport error (connection refused, DNS failure, TLS failure, timeout).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// JSON serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The receiver returned a 4xx status — treated as a terminal delivery failure.
    #[error("callback rejected with client error {status}")]
    Rejected { status: u16 },

    /// All retry attempts were exhausted against a 5xx or transport error.
    #[error("callback delivery exhausted after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

/// Wire-level result type alias.
pub type WireResult<T> = Result<T, WireError>;
