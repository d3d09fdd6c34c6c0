//! Per-session transcript tailer.
//!
//! One tailer task runs per registered session. Until a transcript is
//! claimed it re-attempts discovery on every wake; afterwards each wake
//! re-reads the claimed file in full, deduplicates records by content
//! digest, and reduces new records to events in a fixed order: slug,
//! task list, plan-mode markers, tool blocks, conversational message.
//!
//! Wakes come from two sources kept deliberately redundant: filesystem
//! notifications for the project directory and a fixed 1-second poll.
//! Either alone can be lossy; together they are not.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::Utc;
use notify::{RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{debug, warn};

use tether_core::transcript::{
    ContentBlock, ConversationRecord, RecordDigest, TranscriptRecord, record_digest, todos_digest,
};
use tether_core::{Role, SessionEvent, SessionMode, SessionStatus};

use crate::bus::EventBus;
use crate::discovery::{self, ClaimedFiles};
use crate::manager::SessionHandle;

/// Fallback poll period; also drives idle detection.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Marker substrings in synthetic user records that flag plan-mode
/// transitions.
const PLANNING_MARKER: &str = "Entered plan mode";
const EXECUTING_MARKER: &str = "Exited plan mode";

pub(crate) struct Tailer {
    handle: Arc<SessionHandle>,
    bus: EventBus,
    claimed: ClaimedFiles,
    snapshot: HashMap<PathBuf, SystemTime>,
    idle_after: Duration,
    seen: HashSet<RecordDigest>,
    slug_seen: bool,
    todos: Option<RecordDigest>,
    mode: Option<SessionMode>,
    file: Option<PathBuf>,
    last_activity: Instant,
}

impl Tailer {
    pub(crate) fn new(
        handle: Arc<SessionHandle>,
        bus: EventBus,
        claimed: ClaimedFiles,
        snapshot: HashMap<PathBuf, SystemTime>,
        idle_after: Duration,
    ) -> Self {
        Self {
            handle,
            bus,
            claimed,
            snapshot,
            idle_after,
            seen: HashSet::new(),
            slug_seen: false,
            todos: None,
            mode: None,
            file: None,
            last_activity: Instant::now(),
        }
    }

    /// Main loop; returns when the session is cancelled.
    pub(crate) async fn run(mut self) {
        let (fs_tx, mut fs_rx) = mpsc::channel::<Vec<PathBuf>>(32);
        let watcher = notify::recommended_watcher(
            move |result: Result<notify::Event, notify::Error>| {
                if let Ok(event) = result {
                    let _ = fs_tx.try_send(event.paths);
                }
            },
        );
        // A broken watcher degrades to poll-only operation.
        let _watcher = match watcher {
            Ok(mut w) => match w.watch(&self.handle.project_dir, RecursiveMode::NonRecursive) {
                Ok(()) => Some(w),
                Err(e) => {
                    warn!(session = %self.handle.id, error = %e, "project dir watch failed, polling only");
                    None
                },
            },
            Err(e) => {
                warn!(session = %self.handle.id, error = %e, "watcher init failed, polling only");
                None
            },
        };

        let mut poll = interval(POLL_INTERVAL);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let cancel = self.handle.cancel_token();

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = poll.tick() => {
                    self.wake().await;
                    self.check_idle().await;
                },
                Some(paths) = fs_rx.recv() => {
                    if self.is_relevant(&paths) {
                        self.wake().await;
                    }
                },
            }
        }

        if let Some(path) = self.file.take() {
            self.claimed.release(&path).await;
        }
    }

    /// Whether a batch of notification paths concerns this session.
    fn is_relevant(&self, paths: &[PathBuf]) -> bool {
        match &self.file {
            // Tailing: only the claimed file matters.
            Some(file) => paths.iter().any(|p| p == file),
            // Waiting: any change could be our transcript appearing.
            None => true,
        }
    }

    async fn wake(&mut self) {
        if self.file.is_none() {
            let Some(path) = discovery::find_and_claim(
                &self.handle.project_dir,
                &self.snapshot,
                &self.claimed,
            )
            .await
            else {
                return;
            };
            self.handle.set_claimed_path(Some(path.clone())).await;
            self.last_activity = Instant::now();
            self.file = Some(path);
        }
        self.read_claimed_file().await;
    }

    /// Re-read the claimed transcript in full and process unseen records.
    async fn read_claimed_file(&mut self) {
        let Some(path) = self.file.clone() else {
            return;
        };
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) => {
                // The next poll retries.
                warn!(session = %self.handle.id, error = %e, "transcript read failed");
                return;
            },
        };

        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if !self.seen.insert(record_digest(line)) {
                continue;
            }
            match TranscriptRecord::parse(line) {
                Ok(record) => self.process_record(record).await,
                Err(e) => {
                    debug!(session = %self.handle.id, error = %e, "skipping malformed record");
                },
            }
        }
    }

    async fn process_record(&mut self, record: TranscriptRecord) {
        self.last_activity = Instant::now();

        if let Some(slug) = record.slug()
            && !self.slug_seen
        {
            self.slug_seen = true;
            self.handle.set_name(slug).await;
            self.bus.publish(SessionEvent::Slug {
                id: self.handle.id.clone(),
                name: slug.to_string(),
            });
        }

        if let Some(items) = record.todos() {
            let digest = todos_digest(items);
            if self.todos != Some(digest) {
                self.todos = Some(digest);
                self.bus.publish(SessionEvent::TaskList {
                    id: self.handle.id.clone(),
                    items: items.to_vec(),
                });
            }
        }

        match record {
            TranscriptRecord::User(user) => {
                if user.is_meta
                    && let Some(mode) = detect_mode_marker(&user.text())
                    && self.mode != Some(mode)
                {
                    self.mode = Some(mode);
                    self.bus.publish(SessionEvent::ModeChange {
                        id: self.handle.id.clone(),
                        mode,
                    });
                }

                for block in user.blocks() {
                    if let ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                        is_error,
                    } = block
                    {
                        self.bus.publish(SessionEvent::ToolResult {
                            id: self.handle.id.clone(),
                            call_id: tool_use_id.clone(),
                            text: content.as_ref().map(|c| c.text()).unwrap_or_default(),
                            is_error: *is_error,
                        });
                    }
                }

                self.emit_message(Role::User, &user).await;
            },
            TranscriptRecord::Assistant(assistant) => {
                for block in assistant.blocks() {
                    if let ContentBlock::ToolUse { id, name, input } = block {
                        self.bus.publish(SessionEvent::ToolCall {
                            id: self.handle.id.clone(),
                            call_id: id.clone(),
                            name: name.clone(),
                            input: input.clone(),
                        });
                    }
                }

                self.emit_message(Role::Assistant, &assistant).await;
            },
            TranscriptRecord::System(_) | TranscriptRecord::Other => {},
        }

        self.mark_active().await;
    }

    /// Emit a `message` event if the record qualifies as conversation.
    async fn emit_message(&self, role: Role, record: &ConversationRecord) {
        if !record.is_conversational() {
            return;
        }
        let text = record.text();
        if text.is_empty() {
            return;
        }
        // Records predating registration belong to an earlier run of a
        // resumed transcript.
        let timestamp = record.timestamp.unwrap_or_else(Utc::now);
        if timestamp < self.handle.started_at {
            return;
        }
        self.bus.publish(SessionEvent::Message {
            id: self.handle.id.clone(),
            role,
            text,
            timestamp,
        });
    }

    /// New transcript activity: an idle session is running again.
    async fn mark_active(&self) {
        if self.handle.transition(SessionStatus::Running).await {
            self.bus.publish(SessionEvent::Status {
                id: self.handle.id.clone(),
                status: SessionStatus::Running,
            });
        }
    }

    /// Poll-tick idle check; only meaningful once a transcript is claimed.
    async fn check_idle(&self) {
        if self.file.is_none() || self.last_activity.elapsed() < self.idle_after {
            return;
        }
        if self.handle.transition(SessionStatus::Idle).await {
            self.bus.publish(SessionEvent::Status {
                id: self.handle.id.clone(),
                status: SessionStatus::Idle,
            });
        }
    }
}

/// Detect a plan-mode transition marker in synthetic user text.
fn detect_mode_marker(text: &str) -> Option<SessionMode> {
    if text.contains(PLANNING_MARKER) {
        Some(SessionMode::Planning)
    } else if text.contains(EXECUTING_MARKER) {
        Some(SessionMode::Executing)
    } else {
        None
    }
}

/// Relevance check helper exposed for tests.
#[cfg(test)]
pub(crate) fn path_matches(claimed: Option<&std::path::Path>, paths: &[PathBuf]) -> bool {
    match claimed {
        Some(file) => paths.iter().any(|p| p == file),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_markers_detected() {
        assert_eq!(
            detect_mode_marker("Entered plan mode. The plan follows."),
            Some(SessionMode::Planning)
        );
        assert_eq!(
            detect_mode_marker("Exited plan mode."),
            Some(SessionMode::Executing)
        );
        assert_eq!(detect_mode_marker("just chatting about plans"), None);
    }

    #[test]
    fn waiting_tailer_treats_all_paths_as_relevant() {
        assert!(path_matches(None, &[PathBuf::from("/p/whatever.txt")]));
    }

    #[test]
    fn tailing_tailer_filters_on_claimed_path() {
        let claimed = PathBuf::from("/p/s1.jsonl");
        assert!(path_matches(
            Some(&claimed),
            &[PathBuf::from("/p/other.jsonl"), claimed.clone()]
        ));
        assert!(!path_matches(
            Some(&claimed),
            &[PathBuf::from("/p/other.jsonl")]
        ));
    }
}
