//! Error type for session-manager operations.

use thiserror::Error;

use tether_core::SessionId;

/// Errors from the session manager.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A session with this id is already registered.
    #[error("session already registered: {0}")]
    AlreadyRegistered(SessionId),

    /// No session with this id.
    #[error("session not found: {0}")]
    NotFound(SessionId),

    /// The local rendezvous socket could not be set up.
    #[error("rendezvous socket error: {0}")]
    Rendezvous(std::io::Error),

    /// Filesystem watcher error.
    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),

    /// Other I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result alias for session-manager operations.
pub type SessionResult<T> = Result<T, SessionError>;
