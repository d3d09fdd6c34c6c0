//! Error type for the Telegram adapter binary.

use thiserror::Error;

/// Errors from the Telegram adapter.
#[derive(Debug, Error)]
pub enum TelegramBotError {
    /// The telegram section of the config is missing or incomplete.
    #[error("telegram not configured: {0}")]
    Config(String),

    /// The bot token is missing or was rejected by Telegram.
    #[error("telegram auth failed: {0}")]
    Auth(String),

    /// A Telegram API call failed.
    #[error("telegram request failed: {0}")]
    Request(#[from] teloxide::RequestError),

    /// The local session-manager setup failed.
    #[error(transparent)]
    Session(#[from] tether_session::SessionError),

    /// Config loading failed.
    #[error(transparent)]
    Core(#[from] tether_core::CoreError),
}

/// Result alias for the Telegram adapter.
pub type TelegramResult<T> = Result<T, TelegramBotError>;
