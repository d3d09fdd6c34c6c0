//! Run a relay server with the in-memory credential store.

use std::sync::Arc;

use tracing::info;

use tether_core::UserId;
use tether_core::config::TetherConfig;
use tether_relay::{ConnectionRole, CredentialStore as _, InMemoryCredentialStore, LogPushGateway, RelayState};

use super::{CommandError, CommandResult};

pub(crate) async fn run(config: TetherConfig) -> CommandResult {
    let credentials = Arc::new(InMemoryCredentialStore::new());

    // A fresh store is unusable without one seeded credential; issue a
    // bootstrap viewer token so devices can pair against this relay.
    let bootstrap = credentials
        .issue(UserId::new(), ConnectionRole::Viewer)
        .await;
    println!("bootstrap viewer token: {}", bootstrap.token);

    let verification_base = format!("http://{}", config.relay.listen_addr);
    let state = RelayState::new(credentials, Arc::new(LogPushGateway), verification_base);

    tokio::select! {
        result = tether_relay::serve(&config.relay.listen_addr, state) => {
            result.map_err(|e| CommandError::Other(e.into()))
        },
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, shutting down");
            Ok(())
        },
    }
}
