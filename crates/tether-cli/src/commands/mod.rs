//! Subcommand implementations.

pub(crate) mod daemon;
pub(crate) mod pair;
pub(crate) mod relay;
pub(crate) mod status;

/// Command outcome: auth failures map to exit code 2, everything else
/// to exit code 1.
#[derive(Debug)]
pub(crate) enum CommandError {
    /// Missing or rejected credential.
    Auth(String),
    /// Any other failure.
    Other(anyhow::Error),
}

impl From<anyhow::Error> for CommandError {
    fn from(e: anyhow::Error) -> Self {
        Self::Other(e)
    }
}

pub(crate) type CommandResult = Result<(), CommandError>;

/// Derive the relay's HTTP base URL from its WebSocket URL.
pub(crate) fn http_base(ws_url: &str) -> String {
    let trimmed = ws_url.trim_end_matches('/');
    if let Some(rest) = trimmed.strip_prefix("wss://") {
        format!("https://{rest}")
    } else if let Some(rest) = trimmed.strip_prefix("ws://") {
        format!("http://{rest}")
    } else {
        trimmed.to_string()
    }
}
