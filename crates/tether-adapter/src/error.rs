//! Error type for chat adapters.

use thiserror::Error;

/// Errors an adapter implementation may surface to the host.
///
/// The host logs these and moves on; an adapter failure never stalls the
/// session manager or terminates the event loop.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Posting to the remote platform failed.
    #[error("post failed: {0}")]
    Post(String),

    /// The adapter is not bound to a channel for this session.
    #[error("no channel bound for session {0}")]
    Unbound(String),

    /// Anything else.
    #[error("{0}")]
    Other(String),
}

/// Result alias for adapter operations.
pub type AdapterResult<T> = Result<T, AdapterError>;
