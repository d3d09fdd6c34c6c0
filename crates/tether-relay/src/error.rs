//! Error type for the relay server.

use thiserror::Error;

/// Errors from relay setup and serving.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The listen socket could not be bound.
    #[error("bind failed on {addr}: {source}")]
    Bind {
        /// The requested listen address.
        addr: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The HTTP server terminated abnormally.
    #[error("serve failed: {0}")]
    Serve(std::io::Error),
}

/// Result alias for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;
