//! The workstation daemon: session manager, rendezvous socket, bridge.

use anyhow::Context as _;
use tracing::info;

use tether_bridge::{BridgeError, RelayBridge};
use tether_core::config::TetherConfig;
use tether_session::{IpcServer, SessionManager};

use super::{CommandError, CommandResult};

pub(crate) async fn run(config: TetherConfig) -> CommandResult {
    let token = config
        .relay_token()
        .map_err(|e| CommandError::Auth(e.to_string()))?;

    let manager = SessionManager::new(config.manager.idle_after());
    let ipc = IpcServer::bind(&config.manager.socket_path, manager.clone())
        .context("binding the rendezvous socket")?;
    tokio::spawn(ipc.run());

    let bridge = RelayBridge::new(config.relay.url.clone(), token, manager);

    tokio::select! {
        result = bridge.run() => match result {
            Ok(()) => Ok(()),
            Err(BridgeError::AuthRejected(message)) => Err(CommandError::Auth(message)),
            Err(e) => Err(CommandError::Other(e.into())),
        },
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, shutting down");
            Ok(())
        },
    }
}
