//! tether: remote access to local AI coding sessions.
//!
//! The CLI is thin: `daemon` runs the workstation side (session manager,
//! rendezvous socket, relay bridge), `relay` runs a relay server,
//! `status` and `pair` talk to a relay over HTTP.

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

use tether_core::config::TetherConfig;

mod commands;

/// Remote access to local AI coding sessions.
#[derive(Parser)]
#[command(name = "tether", version, about)]
struct Cli {
    /// Path to the config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the workstation daemon (session manager + relay bridge).
    Daemon,
    /// Run a relay server.
    Relay,
    /// Show relay health.
    Status,
    /// Obtain a workstation credential via device-code pairing.
    Pair,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("warn,tether_cli=info,tether_session=info,tether_bridge=info,tether_relay=info")
            }),
        )
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
        },
    };

    let config = match TetherConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("config error: {e}");
            return ExitCode::from(1);
        },
    };

    let outcome = match cli.command {
        Command::Daemon => commands::daemon::run(config).await,
        Command::Relay => commands::relay::run(config).await,
        Command::Status => commands::status::run(&config).await,
        Command::Pair => commands::pair::run(&config).await,
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(commands::CommandError::Auth(message)) => {
            eprintln!("{message}");
            ExitCode::from(2)
        },
        Err(commands::CommandError::Other(e)) => {
            eprintln!("{e:#}");
            ExitCode::from(1)
        },
    }
}
