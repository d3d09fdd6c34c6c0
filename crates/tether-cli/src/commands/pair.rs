//! Drive the workstation side of device-code pairing.

use std::time::Duration;

use anyhow::Context as _;
use tracing::debug;

use tether_core::config::{TetherConfig, credential_path};

use super::{CommandError, CommandResult, http_base};

/// How often the workstation polls for the verified credential.
const POLL_INTERVAL: Duration = Duration::from_secs(3);

pub(crate) async fn run(config: &TetherConfig) -> CommandResult {
    let base = http_base(&config.relay.url);
    let client = reqwest::Client::new();

    let begin: serde_json::Value = client
        .post(format!("{base}/pair"))
        .send()
        .await
        .with_context(|| format!("POST {base}/pair"))?
        .json()
        .await
        .context("parsing pair response")?;

    let code = begin["code"]
        .as_str()
        .context("pair response has no code")?
        .to_string();
    let url = begin["verification_url"].as_str().unwrap_or_default();
    println!("pairing code: {code}");
    println!("verify from an authenticated device: {url}");

    loop {
        tokio::time::sleep(POLL_INTERVAL).await;
        let response = client
            .get(format!("{base}/pair/{code}"))
            .send()
            .await
            .context("polling pairing code")?;

        match response.status().as_u16() {
            200 => {
                let body: serde_json::Value =
                    response.json().await.context("parsing credential")?;
                let token = body["token"]
                    .as_str()
                    .context("credential response has no token")?;
                write_credential(token)?;
                println!("credential stored in {}", credential_path().display());
                return Ok(());
            },
            202 => debug!("still pending"),
            410 => {
                return Err(CommandError::Auth(
                    "pairing code expired before verification".into(),
                ));
            },
            status => {
                return Err(CommandError::Other(anyhow::anyhow!(
                    "unexpected pairing status {status}"
                )));
            },
        }
    }
}

fn write_credential(token: &str) -> Result<(), CommandError> {
    let path = credential_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    std::fs::write(&path, format!("{token}\n"))
        .with_context(|| format!("writing {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt as _;
        let _ = std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600));
    }
    Ok(())
}
