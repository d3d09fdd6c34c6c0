//! Shared error type for core operations.

use thiserror::Error;

/// Errors from core operations (configuration, paths).
#[derive(Debug, Error)]
pub enum CoreError {
    /// Configuration is present but unusable.
    #[error("config error: {0}")]
    Config(String),

    /// Filesystem error while loading configuration.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Configuration file failed to parse.
    #[error("invalid config file: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
