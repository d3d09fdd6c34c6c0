//! Transcript discovery and claiming.
//!
//! Transcripts are `*.jsonl` files deposited directly in a session's
//! project directory. The runner does not tell the manager which file
//! belongs to which session, so the manager infers it: a snapshot of the
//! directory is taken at registration, and afterwards any transcript that
//! was modified past its snapshot mtime (resumed session) or appeared
//! after the snapshot (fresh session) is a candidate, provided it
//! contains at least one conversational record and no live session has
//! claimed it already.
//!
//! Claiming is process-wide mutual exclusion over file paths: two
//! sessions registered against the same directory can never tail the
//! same file.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::Mutex;
use tracing::debug;

use tether_core::transcript::TranscriptRecord;

/// File extension of transcript files.
const TRANSCRIPT_EXT: &str = "jsonl";

/// Sub-agent transcripts carry this prefix and are never claimed.
const SUBAGENT_PREFIX: &str = "agent-";

/// The process-wide set of claimed transcript paths.
#[derive(Debug, Clone, Default)]
pub struct ClaimedFiles {
    inner: Arc<Mutex<HashSet<PathBuf>>>,
}

impl ClaimedFiles {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claim a path; `false` if another session holds it.
    pub async fn try_claim(&self, path: &Path) -> bool {
        self.inner.lock().await.insert(path.to_path_buf())
    }

    /// Release a claim.
    pub async fn release(&self, path: &Path) {
        self.inner.lock().await.remove(path);
    }

    /// Whether a path is currently claimed.
    pub async fn contains(&self, path: &Path) -> bool {
        self.inner.lock().await.contains(path)
    }
}

/// Whether `path` names a transcript this manager may claim.
fn is_claimable_transcript(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    path.extension().and_then(|e| e.to_str()) == Some(TRANSCRIPT_EXT)
        && !name.starts_with(SUBAGENT_PREFIX)
}

/// Snapshot the project directory: transcript path → mtime.
///
/// Errors are swallowed (the directory may not exist yet); the caller
/// retries discovery on every wake anyway.
#[must_use]
pub fn snapshot(project_dir: &Path) -> HashMap<PathBuf, SystemTime> {
    let mut seen = HashMap::new();
    let Ok(entries) = std::fs::read_dir(project_dir) else {
        return seen;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if !is_claimable_transcript(&path) {
            continue;
        }
        if let Ok(meta) = entry.metadata()
            && let Ok(mtime) = meta.modified()
        {
            seen.insert(path, mtime);
        }
    }
    seen
}

/// Whether the file already holds at least one conversational record.
fn has_conversation_record(path: &Path) -> bool {
    let Ok(raw) = std::fs::read_to_string(path) else {
        return false;
    };
    raw.lines().filter(|l| !l.trim().is_empty()).any(|line| {
        matches!(
            TranscriptRecord::parse(line),
            Ok(TranscriptRecord::User(_) | TranscriptRecord::Assistant(_))
        )
    })
}

/// Find this session's transcript and claim it.
///
/// Selection order:
/// 1. files from the snapshot modified past their snapshot mtime, most
///    recent first (resumed session);
/// 2. files absent from the snapshot, most recent first (fresh session).
///
/// Both tiers require an existing conversational record and an
/// unclaimed path. Returns the claimed path, or `None` to keep waiting.
pub async fn find_and_claim(
    project_dir: &Path,
    snapshot: &HashMap<PathBuf, SystemTime>,
    claimed: &ClaimedFiles,
) -> Option<PathBuf> {
    let current = self::snapshot(project_dir);

    let mut resumed: Vec<(&PathBuf, &SystemTime)> = Vec::new();
    let mut fresh: Vec<(&PathBuf, &SystemTime)> = Vec::new();
    for (path, mtime) in &current {
        match snapshot.get(path) {
            Some(snap_mtime) if mtime > snap_mtime => resumed.push((path, mtime)),
            Some(_) => {},
            None => fresh.push((path, mtime)),
        }
    }
    resumed.sort_by(|a, b| b.1.cmp(a.1));
    fresh.sort_by(|a, b| b.1.cmp(a.1));

    for (path, _) in resumed.into_iter().chain(fresh) {
        if claimed.contains(path).await {
            continue;
        }
        if !has_conversation_record(path) {
            continue;
        }
        if claimed.try_claim(path).await {
            debug!(path = %path.display(), "claimed transcript");
            return Some(path.clone());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;

    fn write_transcript(dir: &Path, name: &str, lines: &[&str]) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, lines.join("\n")).unwrap();
        path
    }

    const USER_LINE: &str = r#"{"type":"user","message":{"content":"hi"}}"#;

    #[tokio::test]
    async fn claims_new_file_with_conversation_record() {
        let dir = tempfile::tempdir().unwrap();
        let snap = snapshot(dir.path());
        let path = write_transcript(dir.path(), "s1.jsonl", &[USER_LINE]);

        let claimed = ClaimedFiles::new();
        let found = find_and_claim(dir.path(), &snap, &claimed).await;
        assert_eq!(found, Some(path.clone()));
        assert!(claimed.contains(&path).await);
    }

    #[tokio::test]
    async fn ignores_file_without_conversation_records() {
        let dir = tempfile::tempdir().unwrap();
        let snap = snapshot(dir.path());
        write_transcript(
            dir.path(),
            "s1.jsonl",
            &[r#"{"type":"system","subtype":"init"}"#],
        );

        let claimed = ClaimedFiles::new();
        assert!(find_and_claim(dir.path(), &snap, &claimed).await.is_none());
    }

    #[tokio::test]
    async fn pre_existing_unmodified_file_is_never_claimed() {
        let dir = tempfile::tempdir().unwrap();
        write_transcript(dir.path(), "old.jsonl", &[USER_LINE]);
        let snap = snapshot(dir.path());

        let claimed = ClaimedFiles::new();
        assert!(find_and_claim(dir.path(), &snap, &claimed).await.is_none());
    }

    #[tokio::test]
    async fn pre_existing_file_modified_past_snapshot_is_preferred() {
        let dir = tempfile::tempdir().unwrap();
        let old = write_transcript(dir.path(), "old.jsonl", &[USER_LINE]);
        let snap = snapshot(dir.path());

        // Append past the snapshot mtime.
        std::thread::sleep(Duration::from_millis(50));
        fs::write(
            &old,
            format!("{USER_LINE}\n{}", r#"{"type":"user","message":{"content":"continue"}}"#),
        )
        .unwrap();

        // A fresh file also appears; the resumed file should win.
        write_transcript(dir.path(), "fresh.jsonl", &[USER_LINE]);

        let claimed = ClaimedFiles::new();
        let found = find_and_claim(dir.path(), &snap, &claimed).await;
        assert_eq!(found, Some(old));
    }

    #[tokio::test]
    async fn subagent_and_foreign_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let snap = snapshot(dir.path());
        write_transcript(dir.path(), "agent-sub.jsonl", &[USER_LINE]);
        write_transcript(dir.path(), "notes.txt", &[USER_LINE]);

        let claimed = ClaimedFiles::new();
        assert!(find_and_claim(dir.path(), &snap, &claimed).await.is_none());
    }

    #[tokio::test]
    async fn claimed_file_is_not_offered_twice() {
        let dir = tempfile::tempdir().unwrap();
        let snap = snapshot(dir.path());
        let path = write_transcript(dir.path(), "s1.jsonl", &[USER_LINE]);

        let claimed = ClaimedFiles::new();
        assert!(claimed.try_claim(&path).await);
        assert!(find_and_claim(dir.path(), &snap, &claimed).await.is_none());

        claimed.release(&path).await;
        assert_eq!(find_and_claim(dir.path(), &snap, &claimed).await, Some(path));
    }

    #[tokio::test]
    async fn claim_is_exclusive() {
        let claimed = ClaimedFiles::new();
        let path = Path::new("/tmp/x.jsonl");
        assert!(claimed.try_claim(path).await);
        assert!(!claimed.try_claim(path).await);
    }
}
