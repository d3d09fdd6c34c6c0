//! Configuration loading.
//!
//! Tether reads a TOML file at `~/.tether/config.toml`. The path can be
//! overridden with `TETHER_CONFIG`; secrets can be supplied through
//! `TETHER_TOKEN` (relay credential) and `TETHER_TELEGRAM_TOKEN` (bot
//! token) so they never have to live on disk.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Name of the config-path override variable.
pub const CONFIG_ENV: &str = "TETHER_CONFIG";
/// Name of the relay-credential override variable.
pub const TOKEN_ENV: &str = "TETHER_TOKEN";
/// Name of the Telegram bot-token override variable.
pub const TELEGRAM_TOKEN_ENV: &str = "TETHER_TELEGRAM_TOKEN";

/// The tether state directory (`~/.tether`).
///
/// Falls back to a relative `.tether` when no home directory can be
/// resolved (containers, stripped-down CI).
#[must_use]
pub fn data_dir() -> PathBuf {
    BaseDirs::new().map_or_else(
        || PathBuf::from(".tether"),
        |dirs| dirs.home_dir().join(".tether"),
    )
}

/// Default path of the local rendezvous socket.
#[must_use]
pub fn default_socket_path() -> PathBuf {
    data_dir().join("manager.sock")
}

/// Where the workstation stores its long-lived relay credential.
#[must_use]
pub fn credential_path() -> PathBuf {
    data_dir().join("credential")
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TetherConfig {
    /// Session-manager settings.
    #[serde(default)]
    pub manager: ManagerConfig,
    /// Relay settings (both client- and server-side).
    #[serde(default)]
    pub relay: RelayConfig,
    /// Telegram adapter settings; absent unless the adapter is used.
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
}

/// Session-manager settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManagerConfig {
    /// Path of the local rendezvous socket.
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,
    /// Seconds without transcript activity before a running session is
    /// reported idle.
    #[serde(default = "default_idle_after_secs")]
    pub idle_after_secs: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            idle_after_secs: default_idle_after_secs(),
        }
    }
}

impl ManagerConfig {
    /// The idle window as a [`Duration`].
    #[must_use]
    pub fn idle_after(&self) -> Duration {
        Duration::from_secs(self.idle_after_secs)
    }
}

fn default_idle_after_secs() -> u64 {
    30
}

/// Relay settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelayConfig {
    /// WebSocket base URL the workstation bridge connects to.
    #[serde(default = "default_relay_url")]
    pub url: String,
    /// Long-lived relay credential; usually supplied via `TETHER_TOKEN`
    /// or the credential file written by `tether pair`.
    #[serde(default)]
    pub token: Option<String>,
    /// Listen address for `tether relay`.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Base URL used to build pairing verification links.
    #[serde(default = "default_verification_base")]
    pub verification_base_url: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            url: default_relay_url(),
            token: None,
            listen_addr: default_listen_addr(),
            verification_base_url: default_verification_base(),
        }
    }
}

fn default_relay_url() -> String {
    "ws://127.0.0.1:8787".to_string()
}

fn default_listen_addr() -> String {
    "127.0.0.1:8787".to_string()
}

fn default_verification_base() -> String {
    "http://127.0.0.1:8787".to_string()
}

/// Telegram adapter settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelegramConfig {
    /// Bot token; `TETHER_TELEGRAM_TOKEN` takes precedence.
    #[serde(default)]
    pub bot_token: Option<String>,
    /// The chat the adapter is bound to.
    #[serde(default)]
    pub chat_id: Option<i64>,
    /// Mention inserted into attention banners (e.g. `@dev`).
    #[serde(default)]
    pub mention: Option<String>,
}

impl TetherConfig {
    /// Load configuration.
    ///
    /// Resolution order for the file path: explicit argument, then
    /// `TETHER_CONFIG`, then `~/.tether/config.toml`. A missing file is
    /// not an error; defaults apply. Env-var secrets override file
    /// values.
    pub fn load(path: Option<&Path>) -> CoreResult<Self> {
        let path = path.map_or_else(
            || {
                std::env::var(CONFIG_ENV)
                    .map_or_else(|_| data_dir().join("config.toml"), PathBuf::from)
            },
            Path::to_path_buf,
        );

        let mut config = if path.is_file() {
            let raw = std::fs::read_to_string(&path)?;
            toml::from_str(&raw)?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    /// Apply env-var overrides on top of file values.
    fn apply_env(&mut self) {
        if let Ok(token) = std::env::var(TOKEN_ENV)
            && !token.is_empty()
        {
            self.relay.token = Some(token);
        }
        if let Ok(token) = std::env::var(TELEGRAM_TOKEN_ENV)
            && !token.is_empty()
        {
            self.telegram.get_or_insert_with(TelegramConfig::default).bot_token = Some(token);
        }
    }

    /// The relay credential, from config or the credential file.
    pub fn relay_token(&self) -> CoreResult<String> {
        if let Some(token) = &self.relay.token {
            return Ok(token.clone());
        }
        let path = credential_path();
        if path.is_file() {
            let raw = std::fs::read_to_string(&path)?;
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                return Ok(trimmed.to_string());
            }
        }
        Err(CoreError::Config(format!(
            "no relay credential: set {TOKEN_ENV}, add relay.token to the config, \
             or run `tether pair`"
        )))
    }
}
