//! The echo-suppression ledger.
//!
//! When an adapter forwards remote text into a session, that text will
//! reappear shortly in the transcript as a `user` message, and must not
//! be posted back to the surface it came from. The ledger holds
//! fingerprints (trimmed text) of recent outbound input; the first
//! matching user message consumes its entry and is dropped.
//!
//! The ledger is bounded two ways: a FIFO capacity and a per-entry TTL.
//! Text that never reappears (the session died, the input was swallowed)
//! is evicted; a miss after eviction merely causes one duplicate post.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// Maximum number of outstanding fingerprints.
pub const LEDGER_CAPACITY: usize = 64;

/// How long an unmatched fingerprint survives.
pub const LEDGER_TTL: Duration = Duration::from_secs(300);

struct Entry {
    fingerprint: String,
    inserted_at: Instant,
}

/// Bounded FIFO of recent outbound-text fingerprints.
pub struct EchoLedger {
    entries: Mutex<VecDeque<Entry>>,
    capacity: usize,
    ttl: Duration,
}

impl Default for EchoLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl EchoLedger {
    /// Create a ledger with the standard bounds.
    #[must_use]
    pub fn new() -> Self {
        Self::with_bounds(LEDGER_CAPACITY, LEDGER_TTL)
    }

    /// Create a ledger with explicit bounds (tests).
    #[must_use]
    pub fn with_bounds(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity,
            ttl,
        }
    }

    /// Record an outbound text before it is sent to the session.
    pub async fn insert(&self, text: &str) {
        let fingerprint = text.trim().to_string();
        if fingerprint.is_empty() {
            return;
        }
        let mut entries = self.entries.lock().await;
        Self::evict(&mut entries, self.ttl);
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(Entry {
            fingerprint,
            inserted_at: Instant::now(),
        });
    }

    /// Consume the oldest entry matching `text`; `true` means the
    /// message is an echo and must be dropped.
    pub async fn consume(&self, text: &str) -> bool {
        let fingerprint = text.trim();
        let mut entries = self.entries.lock().await;
        Self::evict(&mut entries, self.ttl);
        if let Some(index) = entries.iter().position(|e| e.fingerprint == fingerprint) {
            entries.remove(index);
            true
        } else {
            false
        }
    }

    /// Roll back the newest entry matching `text` (send-input failed,
    /// the echo will never come).
    pub async fn remove(&self, text: &str) {
        let fingerprint = text.trim();
        let mut entries = self.entries.lock().await;
        if let Some(index) = entries.iter().rposition(|e| e.fingerprint == fingerprint) {
            entries.remove(index);
        }
    }

    /// Number of outstanding fingerprints.
    pub async fn len(&self) -> usize {
        let mut entries = self.entries.lock().await;
        Self::evict(&mut entries, self.ttl);
        entries.len()
    }

    /// Whether the ledger is empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn evict(entries: &mut VecDeque<Entry>, ttl: Duration) {
        entries.retain(|e| e.inserted_at.elapsed() < ttl);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn consume_matches_trimmed_text_once() {
        let ledger = EchoLedger::new();
        ledger.insert("run tests").await;

        assert!(ledger.consume("  run tests \n").await);
        assert!(ledger.is_empty().await);
        // Second occurrence is a genuine user message.
        assert!(!ledger.consume("run tests").await);
    }

    #[tokio::test]
    async fn duplicate_inserts_consume_independently() {
        let ledger = EchoLedger::new();
        ledger.insert("again").await;
        ledger.insert("again").await;

        assert!(ledger.consume("again").await);
        assert!(ledger.consume("again").await);
        assert!(!ledger.consume("again").await);
    }

    #[tokio::test]
    async fn remove_rolls_back_a_failed_send() {
        let ledger = EchoLedger::new();
        ledger.insert("doomed").await;
        ledger.remove("doomed").await;
        assert!(!ledger.consume("doomed").await);
    }

    #[tokio::test]
    async fn capacity_evicts_oldest_first() {
        let ledger = EchoLedger::with_bounds(2, LEDGER_TTL);
        ledger.insert("one").await;
        ledger.insert("two").await;
        ledger.insert("three").await;

        assert!(!ledger.consume("one").await);
        assert!(ledger.consume("two").await);
        assert!(ledger.consume("three").await);
    }

    #[tokio::test]
    async fn expired_entries_are_misses() {
        let ledger = EchoLedger::with_bounds(LEDGER_CAPACITY, Duration::from_millis(20));
        ledger.insert("stale").await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!ledger.consume("stale").await);
        assert!(ledger.is_empty().await);
    }

    #[tokio::test]
    async fn empty_text_is_never_recorded() {
        let ledger = EchoLedger::new();
        ledger.insert("   ").await;
        assert!(ledger.is_empty().await);
    }
}
