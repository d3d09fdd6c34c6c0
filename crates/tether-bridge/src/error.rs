//! Error type for the relay bridge.

use thiserror::Error;

/// Errors from the workstation-side relay client.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// WebSocket transport failure.
    #[error(transparent)]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    /// The relay rejected our credential.
    #[error("authentication rejected: {0}")]
    AuthRejected(String),

    /// The relay closed the connection (or never answered auth).
    #[error("relay connection closed")]
    ConnectionClosed,

    /// Reconnection attempts are exhausted.
    #[error("giving up after {attempts} failed connection attempts")]
    RetriesExhausted {
        /// Number of consecutive failures.
        attempts: u32,
    },
}

/// Result alias for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;
