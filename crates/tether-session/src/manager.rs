//! The session manager.
//!
//! Owns all live sessions on a workstation: registers announcements from
//! runners, spawns a tailer per session, forwards remote input back to
//! the runner socket, and publishes the merged event stream on the bus.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tether_core::proto::ManagerFrame;
use tether_core::{SessionEvent, SessionId, SessionStatus};

use crate::bus::{EventBus, EventReceiver};
use crate::discovery::{self, ClaimedFiles};
use crate::error::{SessionError, SessionResult};
use crate::tailer::Tailer;

/// Gap between the input text frame and the synthetic carriage return
/// that submits it. Observable part of the input contract.
pub const SUBMIT_DELAY: Duration = Duration::from_millis(50);

/// A session announcement, as received from a runner.
#[derive(Debug, Clone)]
pub struct SessionAnnounce {
    /// Workstation-assigned session id.
    pub id: SessionId,
    /// Initial display name (the spawn command).
    pub name: String,
    /// Working directory of the session.
    pub cwd: PathBuf,
    /// Directory the runner deposits transcripts in.
    pub project_dir: PathBuf,
    /// The spawn command vector.
    pub command: Vec<String>,
}

/// Read-only snapshot of one session.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// Session id.
    pub id: SessionId,
    /// Current display name.
    pub name: String,
    /// Working directory.
    pub cwd: PathBuf,
    /// Current status.
    pub status: SessionStatus,
    /// Registration time.
    pub started_at: DateTime<Utc>,
}

/// Shared per-session state.
pub(crate) struct SessionHandle {
    pub(crate) id: SessionId,
    pub(crate) cwd: PathBuf,
    pub(crate) project_dir: PathBuf,
    pub(crate) started_at: DateTime<Utc>,
    name: RwLock<String>,
    status: RwLock<SessionStatus>,
    claimed_path: RwLock<Option<PathBuf>>,
    runner_tx: mpsc::Sender<ManagerFrame>,
    cancel: CancellationToken,
}

impl SessionHandle {
    fn new(announce: SessionAnnounce, runner_tx: mpsc::Sender<ManagerFrame>) -> Self {
        Self {
            id: announce.id,
            cwd: announce.cwd,
            project_dir: announce.project_dir,
            started_at: Utc::now(),
            name: RwLock::new(announce.name),
            status: RwLock::new(SessionStatus::Running),
            claimed_path: RwLock::new(None),
            runner_tx,
            cancel: CancellationToken::new(),
        }
    }

    pub(crate) async fn name(&self) -> String {
        self.name.read().await.clone()
    }

    pub(crate) async fn set_name(&self, name: &str) {
        *self.name.write().await = name.to_string();
    }

    pub(crate) async fn status(&self) -> SessionStatus {
        *self.status.read().await
    }

    /// Apply a status transition; `true` if the status actually changed.
    ///
    /// `Ended` is absorbing: nothing transitions out of it.
    pub(crate) async fn transition(&self, to: SessionStatus) -> bool {
        let mut status = self.status.write().await;
        if *status == SessionStatus::Ended || *status == to {
            return false;
        }
        *status = to;
        true
    }

    pub(crate) async fn set_claimed_path(&self, path: Option<PathBuf>) {
        *self.claimed_path.write().await = path;
    }

    async fn take_claimed_path(&self) -> Option<PathBuf> {
        self.claimed_path.write().await.take()
    }

    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

struct ManagerInner {
    sessions: RwLock<HashMap<SessionId, Arc<SessionHandle>>>,
    claimed: ClaimedFiles,
    bus: EventBus,
    idle_after: Duration,
}

/// Clone-able facade over the workstation's live sessions.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<ManagerInner>,
}

impl SessionManager {
    /// Create a manager with the given idle window.
    #[must_use]
    pub fn new(idle_after: Duration) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                sessions: RwLock::new(HashMap::new()),
                claimed: ClaimedFiles::new(),
                bus: EventBus::new(),
                idle_after,
            }),
        }
    }

    /// Subscribe to the merged event stream of all sessions.
    #[must_use]
    pub fn subscribe(&self) -> EventReceiver {
        self.inner.bus.subscribe()
    }

    /// Register an announced session and start watching for its
    /// transcript.
    ///
    /// Snapshots the project directory before anything else so that
    /// transcripts created after this point are distinguishable from
    /// pre-existing ones. Emits `SessionStarted`.
    pub async fn register(
        &self,
        announce: SessionAnnounce,
        runner_tx: mpsc::Sender<ManagerFrame>,
    ) -> SessionResult<()> {
        let snapshot = discovery::snapshot(&announce.project_dir);
        let id = announce.id.clone();
        let name = announce.name.clone();
        let cwd = announce.cwd.clone();

        let handle = Arc::new(SessionHandle::new(announce, runner_tx));
        {
            let mut sessions = self.inner.sessions.write().await;
            if sessions.contains_key(&id) {
                return Err(SessionError::AlreadyRegistered(id));
            }
            sessions.insert(id.clone(), Arc::clone(&handle));
        }

        info!(session = %id, name = %name, "session registered");
        self.inner.bus.publish(SessionEvent::SessionStarted {
            id,
            name,
            cwd,
        });

        let tailer = Tailer::new(
            handle,
            self.inner.bus.clone(),
            self.inner.claimed.clone(),
            snapshot,
            self.inner.idle_after,
        );
        tokio::spawn(tailer.run());
        Ok(())
    }

    /// Forward input text to a session's PTY.
    ///
    /// Writes the text frame, waits [`SUBMIT_DELAY`], then writes a
    /// carriage-return frame so the terminal submits. Returns `true` only
    /// if both frames were dispatched. A dead runner connection tears the
    /// session down (and emits `SessionEnded`) before returning `false`.
    pub async fn send_input(&self, id: &SessionId, text: &str) -> bool {
        let Some(handle) = self.handle(id).await else {
            return false;
        };

        let text_frame = ManagerFrame::Input {
            text: text.to_string(),
        };
        if handle.runner_tx.send(text_frame).await.is_err() {
            warn!(session = %id, "runner connection lost while sending input");
            self.end(id).await;
            return false;
        }

        tokio::time::sleep(SUBMIT_DELAY).await;

        let submit_frame = ManagerFrame::Input { text: "\r".into() };
        if handle.runner_tx.send(submit_frame).await.is_err() {
            warn!(session = %id, "runner connection lost while submitting input");
            self.end(id).await;
            return false;
        }
        true
    }

    /// Tear a session down: stop its tailer, release its transcript
    /// claim, drop its state, and emit `SessionEnded`.
    ///
    /// Returns `false` if the session was not known (already ended).
    pub async fn end(&self, id: &SessionId) -> bool {
        let Some(handle) = self.inner.sessions.write().await.remove(id) else {
            return false;
        };
        handle.cancel.cancel();
        handle.transition(SessionStatus::Ended).await;
        if let Some(path) = handle.take_claimed_path().await {
            self.inner.claimed.release(&path).await;
        }
        info!(session = %id, "session ended");
        self.inner
            .bus
            .publish(SessionEvent::SessionEnded { id: id.clone() });
        true
    }

    /// Snapshot one session.
    pub async fn get(&self, id: &SessionId) -> Option<SessionInfo> {
        let handle = self.handle(id).await?;
        Some(self.info(&handle).await)
    }

    /// Snapshot all live sessions.
    pub async fn list(&self) -> Vec<SessionInfo> {
        let handles: Vec<Arc<SessionHandle>> =
            self.inner.sessions.read().await.values().cloned().collect();
        let mut infos = Vec::with_capacity(handles.len());
        for handle in handles {
            infos.push(self.info(&handle).await);
        }
        infos
    }

    async fn handle(&self, id: &SessionId) -> Option<Arc<SessionHandle>> {
        self.inner.sessions.read().await.get(id).cloned()
    }

    async fn info(&self, handle: &SessionHandle) -> SessionInfo {
        SessionInfo {
            id: handle.id.clone(),
            name: handle.name().await,
            cwd: handle.cwd.clone(),
            status: handle.status().await,
            started_at: handle.started_at,
        }
    }
}
