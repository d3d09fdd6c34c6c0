//! Tether Telegram adapter — standalone binary.
//!
//! `setup` writes the telegram section of the config; `run` starts the
//! session manager, the rendezvous socket, and the bot.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tether_core::config::{self, TetherConfig};
use tether_telegram::TelegramBotError;

/// Telegram adapter for tether sessions.
#[derive(Parser)]
#[command(name = "tether-telegram", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the telegram section of the config file.
    Setup {
        /// The chat the bot is bound to.
        #[arg(long)]
        chat_id: i64,
        /// Bot token (omit to keep using TETHER_TELEGRAM_TOKEN).
        #[arg(long)]
        token: Option<String>,
        /// Mention inserted into attention banners, e.g. `@dev`.
        #[arg(long)]
        mention: Option<String>,
    },
    /// Run the adapter.
    Run {
        /// Path to the config file.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,tether_telegram=info,tether_session=info")),
        )
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Usage problems exit 1 (clap's own help/version exit 0).
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
        },
    };

    match cli.command {
        Command::Setup {
            chat_id,
            token,
            mention,
        } => match setup(chat_id, token, mention) {
            Ok(path) => {
                println!("wrote {}", path.display());
                ExitCode::SUCCESS
            },
            Err(e) => {
                eprintln!("setup failed: {e}");
                ExitCode::from(1)
            },
        },
        Command::Run { config } => {
            let config = match TetherConfig::load(config.as_deref()) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("config error: {e}");
                    return ExitCode::from(1);
                },
            };
            match tether_telegram::bot::run(config).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(e @ TelegramBotError::Auth(_)) => {
                    eprintln!("{e}");
                    ExitCode::from(2)
                },
                Err(e) => {
                    eprintln!("{e}");
                    ExitCode::from(1)
                },
            }
        },
    }
}

/// Merge the telegram section into the config file on disk.
fn setup(
    chat_id: i64,
    token: Option<String>,
    mention: Option<String>,
) -> Result<PathBuf, tether_core::CoreError> {
    let path = config::data_dir().join("config.toml");
    let mut loaded = TetherConfig::load(Some(&path))?;
    let telegram = loaded.telegram.get_or_insert_with(Default::default);
    telegram.chat_id = Some(chat_id);
    if token.is_some() {
        telegram.bot_token = token;
    }
    if mention.is_some() {
        telegram.mention = mention;
    }

    let rendered = toml::to_string_pretty(&loaded)
        .map_err(|e| tether_core::CoreError::Config(e.to_string()))?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, rendered)?;
    Ok(path)
}
