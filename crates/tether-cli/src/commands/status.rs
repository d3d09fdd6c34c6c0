//! Query a relay's health endpoint.

use anyhow::Context as _;

use tether_core::config::TetherConfig;

use super::{CommandResult, http_base};

pub(crate) async fn run(config: &TetherConfig) -> CommandResult {
    let url = format!("{}/health", http_base(&config.relay.url));
    let response = reqwest::get(&url)
        .await
        .with_context(|| format!("GET {url}"))?;
    let body: serde_json::Value = response.json().await.context("parsing health response")?;
    println!("{body:#}");
    Ok(())
}
