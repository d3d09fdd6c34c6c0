//! The authentication gateway.
//!
//! Connections authenticate with opaque bearer tokens. Token storage is
//! an external concern (a persistent device database in production); the
//! relay only depends on the [`CredentialStore`] trait. The in-memory
//! implementation here is the reference store and is what the tests and
//! the standalone `tether relay` use.

use std::collections::HashMap;

use async_trait::async_trait;
use rand::Rng;
use rand::distributions::Alphanumeric;
use tokio::sync::Mutex;

use tether_core::{DeviceId, UserId};

/// Which admission path a credential is valid for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionRole {
    /// A developer machine that owns sessions.
    Workstation,
    /// A remote surface (mobile client, chat adapter proxy).
    Viewer,
}

impl std::fmt::Display for ConnectionRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Workstation => f.write_str("workstation"),
            Self::Viewer => f.write_str("viewer"),
        }
    }
}

/// The authenticated identity behind a connection.
#[derive(Debug, Clone)]
pub struct Principal {
    /// The human this credential belongs to.
    pub user_id: UserId,
    /// The enrolled device.
    pub device_id: DeviceId,
    /// The admission path this credential is valid for.
    pub role: ConnectionRole,
}

/// A freshly issued credential.
#[derive(Debug, Clone)]
pub struct IssuedCredential {
    /// The bearer token.
    pub token: String,
    /// The device the token is bound to.
    pub device_id: DeviceId,
}

/// Token verification and device registration.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Resolve a bearer token to its principal, if valid.
    async fn verify(&self, token: &str) -> Option<Principal>;

    /// Issue a new credential for a user and role (device registration).
    async fn issue(&self, user_id: UserId, role: ConnectionRole) -> IssuedCredential;
}

/// Reference in-memory store.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    tokens: Mutex<HashMap<String, Principal>>,
}

impl InMemoryCredentialStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a known token (config-provisioned credentials, tests).
    pub async fn insert(&self, token: impl Into<String>, user_id: UserId, role: ConnectionRole) {
        self.tokens.lock().await.insert(
            token.into(),
            Principal {
                user_id,
                device_id: DeviceId::new(),
                role,
            },
        );
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn verify(&self, token: &str) -> Option<Principal> {
        self.tokens.lock().await.get(token).cloned()
    }

    async fn issue(&self, user_id: UserId, role: ConnectionRole) -> IssuedCredential {
        let token = generate_token();
        let device_id = DeviceId::new();
        self.tokens.lock().await.insert(
            token.clone(),
            Principal {
                user_id,
                device_id,
                role,
            },
        );
        IssuedCredential { token, device_id }
    }
}

/// 32 alphanumeric characters with a stable prefix.
fn generate_token() -> String {
    let body: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect();
    format!("tth_{body}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn verify_unknown_token_is_none() {
        let store = InMemoryCredentialStore::new();
        assert!(store.verify("tth_nope").await.is_none());
    }

    #[tokio::test]
    async fn issued_credential_verifies() {
        let store = InMemoryCredentialStore::new();
        let user = UserId::new();
        let issued = store.issue(user, ConnectionRole::Workstation).await;

        let principal = store.verify(&issued.token).await.unwrap();
        assert_eq!(principal.user_id, user);
        assert_eq!(principal.device_id, issued.device_id);
        assert_eq!(principal.role, ConnectionRole::Workstation);
    }

    #[tokio::test]
    async fn seeded_token_verifies() {
        let store = InMemoryCredentialStore::new();
        let user = UserId::new();
        store.insert("tth_fixed", user, ConnectionRole::Viewer).await;

        let principal = store.verify("tth_fixed").await.unwrap();
        assert_eq!(principal.role, ConnectionRole::Viewer);
    }

    #[tokio::test]
    async fn tokens_are_unique_and_prefixed() {
        let store = InMemoryCredentialStore::new();
        let user = UserId::new();
        let a = store.issue(user, ConnectionRole::Viewer).await;
        let b = store.issue(user, ConnectionRole::Viewer).await;
        assert_ne!(a.token, b.token);
        assert!(a.token.starts_with("tth_"));
    }
}
