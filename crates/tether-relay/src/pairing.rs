//! Device-code pairing.
//!
//! The out-of-band flow by which a workstation obtains a long-lived
//! credential: the workstation requests a short code, an already
//! authenticated viewer verifies it, and the workstation polls until the
//! bound credential is handed over. Codes live for ten minutes; the
//! store evicts expired entries on every request.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::Mutex;
use tracing::debug;

/// Lifetime of a pairing code.
pub const PAIRING_TTL: Duration = Duration::from_secs(600);

/// Code length in characters.
const CODE_LEN: usize = 6;

/// Unambiguous code alphabet (no `0`, `1`, `I`, `O`).
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Outcome of a workstation poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// Not verified yet; poll again.
    Pending,
    /// Verified; here is the credential. The code is now spent.
    Ready(String),
    /// Unknown, expired, or already claimed.
    Gone,
}

/// Outcome of a viewer verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// The code is now bound to a credential.
    Verified,
    /// Unknown or expired code.
    Gone,
    /// The code was already verified.
    AlreadyVerified,
}

enum PendingState {
    Pending,
    Verified { token: String },
}

struct PendingCode {
    created_at: Instant,
    state: PendingState,
}

/// Store of in-flight pairing codes.
pub struct PairingStore {
    codes: Mutex<HashMap<String, PendingCode>>,
    ttl: Duration,
}

impl Default for PairingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PairingStore {
    /// Create a store with the standard TTL.
    #[must_use]
    pub fn new() -> Self {
        Self::with_ttl(PAIRING_TTL)
    }

    /// Create a store with an explicit TTL (tests).
    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            codes: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Start a pairing flow; returns the fresh code.
    pub async fn begin(&self) -> String {
        let mut codes = self.codes.lock().await;
        Self::evict_expired(&mut codes, self.ttl);

        let mut code = generate_code();
        while codes.contains_key(&code) {
            code = generate_code();
        }
        codes.insert(
            code.clone(),
            PendingCode {
                created_at: Instant::now(),
                state: PendingState::Pending,
            },
        );
        debug!(code = %code, "pairing started");
        code
    }

    /// Bind a credential to a pending code (viewer side).
    pub async fn verify(&self, code: &str, token: String) -> VerifyOutcome {
        let mut codes = self.codes.lock().await;
        Self::evict_expired(&mut codes, self.ttl);

        match codes.get_mut(code) {
            None => VerifyOutcome::Gone,
            Some(entry) => match entry.state {
                PendingState::Verified { .. } => VerifyOutcome::AlreadyVerified,
                PendingState::Pending => {
                    entry.state = PendingState::Verified { token };
                    VerifyOutcome::Verified
                },
            },
        }
    }

    /// Poll a code (workstation side). A `Ready` claim spends the code:
    /// the next poll returns `Gone`.
    pub async fn claim(&self, code: &str) -> ClaimOutcome {
        let mut codes = self.codes.lock().await;
        Self::evict_expired(&mut codes, self.ttl);

        let verified = codes
            .get(code)
            .map(|entry| matches!(entry.state, PendingState::Verified { .. }));
        match verified {
            None => ClaimOutcome::Gone,
            Some(false) => ClaimOutcome::Pending,
            Some(true) => match codes.remove(code) {
                Some(PendingCode {
                    state: PendingState::Verified { token },
                    ..
                }) => ClaimOutcome::Ready(token),
                _ => ClaimOutcome::Gone,
            },
        }
    }

    /// Number of codes currently pending or verified.
    pub async fn len(&self) -> usize {
        let mut codes = self.codes.lock().await;
        Self::evict_expired(&mut codes, self.ttl);
        codes.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn evict_expired(codes: &mut HashMap<String, PendingCode>, ttl: Duration) {
        codes.retain(|_, entry| entry.created_at.elapsed() < ttl);
    }
}

fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LEN)
        .map(|_| {
            let index = rng.gen_range(0..CODE_ALPHABET.len());
            char::from(CODE_ALPHABET[index])
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_use_the_unambiguous_alphabet() {
        for _ in 0..50 {
            let code = generate_code();
            assert_eq!(code.len(), CODE_LEN);
            assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
        }
    }

    #[tokio::test]
    async fn unverified_code_stays_pending() {
        let store = PairingStore::new();
        let code = store.begin().await;
        assert_eq!(store.claim(&code).await, ClaimOutcome::Pending);
        assert_eq!(store.claim(&code).await, ClaimOutcome::Pending);
    }

    #[tokio::test]
    async fn verified_code_yields_token_once() {
        let store = PairingStore::new();
        let code = store.begin().await;

        assert_eq!(
            store.verify(&code, "tth_abc".into()).await,
            VerifyOutcome::Verified
        );
        assert_eq!(store.claim(&code).await, ClaimOutcome::Ready("tth_abc".into()));
        // Spent: the follow-up poll is gone.
        assert_eq!(store.claim(&code).await, ClaimOutcome::Gone);
    }

    #[tokio::test]
    async fn unknown_code_is_gone() {
        let store = PairingStore::new();
        assert_eq!(store.claim("ZZZZZZ").await, ClaimOutcome::Gone);
        assert_eq!(
            store.verify("ZZZZZZ", "t".into()).await,
            VerifyOutcome::Gone
        );
    }

    #[tokio::test]
    async fn double_verify_is_flagged() {
        let store = PairingStore::new();
        let code = store.begin().await;
        let _ = store.verify(&code, "a".into()).await;
        assert_eq!(
            store.verify(&code, "b".into()).await,
            VerifyOutcome::AlreadyVerified
        );
        // The first binding wins.
        assert_eq!(store.claim(&code).await, ClaimOutcome::Ready("a".into()));
    }

    #[tokio::test]
    async fn expired_code_is_evicted_on_access() {
        let store = PairingStore::with_ttl(Duration::from_millis(30));
        let code = store.begin().await;
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(store.claim(&code).await, ClaimOutcome::Gone);
        assert!(store.is_empty().await);
    }
}
