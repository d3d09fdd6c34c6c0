//! Wire protocols.
//!
//! Two protocols live here:
//!
//! - the **relay protocol**: message-framed JSON over one bidirectional
//!   stream per connection ([`ClientFrame`] / [`ServerFrame`]);
//! - the **runner IPC protocol**: newline-delimited JSON over the local
//!   rendezvous socket between session runners and the session manager
//!   ([`RunnerFrame`] / [`ManagerFrame`]).
//!
//! Frames are internally tagged on `type` with snake_case tags and
//! camelCase fields, so `{"type":"send_input","sessionId":"…","text":"…"}`
//! is a [`ClientFrame::SendInput`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::event::{Role, SessionStatus, TodoItem};
use crate::id::SessionId;

/// Snapshot of one session as reported in `sessions_list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    /// Session id.
    pub id: SessionId,
    /// Current display name.
    pub name: String,
    /// Working directory on the owning workstation.
    pub cwd: String,
    /// Current status.
    pub status: SessionStatus,
    /// When the relay learned of the session.
    pub started_at: chrono::DateTime<chrono::Utc>,
}

/// Frames sent by clients (workstations and viewers) to the relay.
///
/// Every connection must send [`ClientFrame::Auth`] first; anything else
/// on an unauthenticated connection is a protocol error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientFrame {
    /// Authenticate the connection. Must be the first frame.
    Auth {
        /// Bearer credential issued by the relay.
        token: String,
    },

    // ---- workstation → relay ----
    /// Announce a session.
    SessionStart {
        /// Session id.
        session_id: SessionId,
        /// Display name.
        name: String,
        /// Working directory.
        cwd: String,
    },
    /// The session's display name changed (slug discovered).
    SessionUpdate {
        /// Session id.
        session_id: SessionId,
        /// New display name.
        name: String,
    },
    /// The session's task list changed.
    SessionTodos {
        /// Session id.
        session_id: SessionId,
        /// Full new list.
        todos: Vec<TodoItem>,
    },
    /// A conversational message.
    SessionMessage {
        /// Session id.
        session_id: SessionId,
        /// Who said it.
        role: Role,
        /// Message text.
        content: String,
    },
    /// Status transition.
    SessionStatus {
        /// Session id.
        session_id: SessionId,
        /// New status.
        status: SessionStatus,
    },
    /// The session ended.
    SessionEnd {
        /// Session id.
        session_id: SessionId,
    },

    // ---- viewer → relay ----
    /// Request an authoritative `sessions_list`.
    ListSessions,
    /// Subscribe to a session's live events (triggers history replay).
    Subscribe {
        /// Session id.
        session_id: SessionId,
    },
    /// Drop a subscription.
    Unsubscribe {
        /// Session id.
        session_id: SessionId,
    },
    /// Forward input to the owning workstation.
    SendInput {
        /// Session id.
        session_id: SessionId,
        /// Input text (submitted with a trailing carriage return by the
        /// session manager).
        text: String,
    },
    /// Mark a session for idle/end push notifications.
    TrackSession {
        /// Session id.
        session_id: SessionId,
    },
    /// Clear the notification mark.
    UntrackSession {
        /// Session id.
        session_id: SessionId,
    },
    /// Register a push-notification token for the authenticated user.
    RegisterPushToken {
        /// Opaque platform push token.
        push_token: String,
    },
}

/// Frames sent by the relay to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerFrame {
    /// Authentication accepted.
    AuthOk,
    /// Authentication rejected; the relay closes the connection after
    /// sending this.
    AuthError {
        /// Human-readable reason.
        message: String,
    },
    /// Authoritative snapshot of the user's sessions.
    SessionsList {
        /// All live sessions for the authenticated user.
        sessions: Vec<SessionSummary>,
    },
    /// A conversational message (live or replayed).
    SessionMessage {
        /// Session id.
        session_id: SessionId,
        /// Who said it.
        role: Role,
        /// Message text.
        content: String,
    },
    /// Status transition (also the first frame after `subscribe`).
    SessionStatus {
        /// Session id.
        session_id: SessionId,
        /// Current status.
        status: SessionStatus,
    },
    /// Task-list update.
    SessionTodos {
        /// Session id.
        session_id: SessionId,
        /// Full list.
        todos: Vec<TodoItem>,
    },
    /// Display-name update.
    SessionUpdate {
        /// Session id.
        session_id: SessionId,
        /// New display name.
        name: String,
    },
    /// Input routed to the owning workstation.
    SendInput {
        /// Session id.
        session_id: SessionId,
        /// Input text.
        text: String,
    },
    /// Request-scoped error; the connection stays open.
    Error {
        /// Human-readable reason.
        message: String,
    },
}

/// Frames sent by a session runner to the session manager over the local
/// rendezvous socket. One JSON object per newline-terminated line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum RunnerFrame {
    /// Register a freshly spawned session.
    SessionStart {
        /// Workstation-assigned session id.
        id: SessionId,
        /// Initial display name (the spawn command).
        name: String,
        /// Working directory of the spawned process.
        cwd: PathBuf,
        /// Directory where the runner deposits transcripts.
        project_dir: PathBuf,
        /// The spawn command vector.
        command: Vec<String>,
    },
    /// The runner is shutting the session down.
    SessionEnd {
        /// Session id.
        session_id: SessionId,
    },
}

/// Frames sent by the session manager back to a session runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ManagerFrame {
    /// Write these bytes to the session's PTY.
    Input {
        /// The input text.
        text: String,
    },
}
