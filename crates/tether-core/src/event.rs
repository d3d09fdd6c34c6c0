//! The normalized session event model.
//!
//! The session manager tails transcript files and reduces each new record
//! to zero or more [`SessionEvent`]s. Everything downstream (the relay
//! bridge, chat adapters) consumes this one enum and nothing else.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::id::SessionId;

/// Conversational role of a transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Text typed (or injected) on behalf of the human.
    User,
    /// Text produced by the AI.
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => f.write_str("user"),
            Self::Assistant => f.write_str("assistant"),
        }
    }
}

/// Lifecycle status of a session.
///
/// Transitions are monotone toward `Ended`: once a session has ended it
/// never reports any other status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// The AI is actively producing transcript records.
    Running,
    /// No transcript activity for the idle window; the session is waiting
    /// on the human.
    Idle,
    /// The session is over; no further events will be emitted.
    Ended,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => f.write_str("running"),
            Self::Idle => f.write_str("idle"),
            Self::Ended => f.write_str("ended"),
        }
    }
}

/// Interaction mode of the AI, derived from plan-mode marker records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// The AI is drafting a plan and not executing tools.
    Planning,
    /// Normal execution.
    Executing,
}

/// Completion state of a single task-list item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    /// Not started.
    Pending,
    /// Currently being worked.
    InProgress,
    /// Done.
    Completed,
    /// Any discriminant this build does not know about.
    #[serde(other)]
    Unknown,
}

/// One entry of the AI's task list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    /// Human-readable task text.
    #[serde(alias = "content")]
    pub text: String,
    /// Completion state.
    pub status: TodoStatus,
}

/// A normalized event derived from one session's transcript stream.
///
/// Within a single session, events are delivered in transcript order; no
/// ordering holds across sessions. Each transcript record contributes to
/// this stream at most once (dedup by content hash happens upstream).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SessionEvent {
    /// A session was registered with the manager.
    SessionStarted {
        /// Session id.
        id: SessionId,
        /// Initial display name (the spawn command until a slug arrives).
        name: String,
        /// Working directory of the session.
        cwd: PathBuf,
    },
    /// The session's transcript announced its slug; fired at most once.
    ///
    /// The manager has already replaced the display name when this fires.
    Slug {
        /// Session id.
        id: SessionId,
        /// The transcript-derived slug, now the display name.
        name: String,
    },
    /// A conversational message.
    Message {
        /// Session id.
        id: SessionId,
        /// Who said it.
        role: Role,
        /// Concatenated, trimmed text blocks; never empty.
        text: String,
        /// Record timestamp.
        timestamp: DateTime<Utc>,
    },
    /// The task list changed (content-hash change only, never a re-emit
    /// of an identical list).
    TaskList {
        /// Session id.
        id: SessionId,
        /// The full new list.
        items: Vec<TodoItem>,
    },
    /// The AI invoked a tool.
    ToolCall {
        /// Session id.
        id: SessionId,
        /// Tool-use id, correlates with [`SessionEvent::ToolResult`].
        call_id: String,
        /// Tool name.
        name: String,
        /// Tool input as recorded.
        input: serde_json::Value,
    },
    /// A tool produced a result.
    ToolResult {
        /// Session id.
        id: SessionId,
        /// The originating tool-use id.
        call_id: String,
        /// Flattened result text.
        text: String,
        /// Whether the tool reported an error.
        is_error: bool,
    },
    /// Plan-mode transition; edge-triggered.
    ModeChange {
        /// Session id.
        id: SessionId,
        /// New mode.
        mode: SessionMode,
    },
    /// Status transition; edge-triggered.
    Status {
        /// Session id.
        id: SessionId,
        /// New status.
        status: SessionStatus,
    },
    /// The session is gone; absorbing, nothing follows for this id.
    SessionEnded {
        /// Session id.
        id: SessionId,
    },
}

impl SessionEvent {
    /// The session this event belongs to.
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        match self {
            Self::SessionStarted { id, .. }
            | Self::Slug { id, .. }
            | Self::Message { id, .. }
            | Self::TaskList { id, .. }
            | Self::ToolCall { id, .. }
            | Self::ToolResult { id, .. }
            | Self::ModeChange { id, .. }
            | Self::Status { id, .. }
            | Self::SessionEnded { id } => id,
        }
    }

    /// Short event name for log fields.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionStarted { .. } => "session_started",
            Self::Slug { .. } => "slug",
            Self::Message { .. } => "message",
            Self::TaskList { .. } => "task_list",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::ModeChange { .. } => "mode_change",
            Self::Status { .. } => "status",
            Self::SessionEnded { .. } => "session_ended",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_display_matches_wire_form() {
        assert_eq!(SessionStatus::Running.to_string(), "running");
        assert_eq!(SessionStatus::Idle.to_string(), "idle");
        assert_eq!(SessionStatus::Ended.to_string(), "ended");
    }

    #[test]
    fn todo_item_accepts_content_alias() {
        let item: TodoItem =
            serde_json::from_str(r#"{"content":"write tests","status":"in_progress"}"#).unwrap();
        assert_eq!(item.text, "write tests");
        assert_eq!(item.status, TodoStatus::InProgress);
    }

    #[test]
    fn unknown_todo_status_is_tolerated() {
        let item: TodoItem =
            serde_json::from_str(r#"{"text":"x","status":"deferred"}"#).unwrap();
        assert_eq!(item.status, TodoStatus::Unknown);
    }

    #[test]
    fn event_session_id_covers_all_variants() {
        let id = SessionId::from("s1");
        let events = [
            SessionEvent::Slug {
                id: id.clone(),
                name: "refactor".into(),
            },
            SessionEvent::Status {
                id: id.clone(),
                status: SessionStatus::Idle,
            },
            SessionEvent::SessionEnded { id: id.clone() },
        ];
        for event in &events {
            assert_eq!(event.session_id(), &id);
        }
    }

    #[test]
    fn event_kind_is_stable() {
        let event = SessionEvent::ModeChange {
            id: SessionId::from("s"),
            mode: SessionMode::Planning,
        };
        assert_eq!(event.kind(), "mode_change");
    }
}
