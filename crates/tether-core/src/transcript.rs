//! The on-disk transcript record model.
//!
//! A transcript is an append-only file of newline-delimited JSON records
//! written by the session runner. Tether only ever consumes this format.
//! The record shape is self-describing and open-ended: unknown record
//! types and unknown content-block types deserialize to `Other` variants
//! and are dropped by the tailer.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::event::TodoItem;

/// Content digest of a raw record line; the unit of deduplication.
pub type RecordDigest = [u8; 32];

/// Digest of one raw transcript line.
///
/// The digest is computed over the exact line bytes (without the trailing
/// newline), so a record re-read on the next full-file pass hashes
/// identically and is skipped.
#[must_use]
pub fn record_digest(raw_line: &str) -> RecordDigest {
    *blake3::hash(raw_line.as_bytes()).as_bytes()
}

/// Digest of a task list, used for change detection.
#[must_use]
pub fn todos_digest(items: &[TodoItem]) -> RecordDigest {
    let json = serde_json::to_string(items).unwrap_or_default();
    *blake3::hash(json.as_bytes()).as_bytes()
}

/// One parsed transcript record.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TranscriptRecord {
    /// A record on the human side of the conversation. Also carries tool
    /// results and synthetic (meta) messages injected by the runner.
    User(ConversationRecord),
    /// A record produced by the AI. Carries text and tool-use blocks.
    Assistant(ConversationRecord),
    /// Runner bookkeeping; may announce the slug or a task list.
    System(SystemRecord),
    /// Any record type this build does not know about.
    #[serde(other)]
    Other,
}

impl TranscriptRecord {
    /// Parse a single transcript line.
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }

    /// The slug announced by this record, if any.
    #[must_use]
    pub fn slug(&self) -> Option<&str> {
        match self {
            Self::User(r) | Self::Assistant(r) => r.slug.as_deref(),
            Self::System(r) => r.slug.as_deref(),
            Self::Other => None,
        }
    }

    /// The task list carried by this record, if any.
    #[must_use]
    pub fn todos(&self) -> Option<&[TodoItem]> {
        match self {
            Self::User(r) | Self::Assistant(r) => r.todos.as_deref(),
            Self::System(r) => r.todos.as_deref(),
            Self::Other => None,
        }
    }

    /// The record timestamp, if present.
    #[must_use]
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::User(r) | Self::Assistant(r) => r.timestamp,
            Self::System(r) => r.timestamp,
            Self::Other => None,
        }
    }
}

/// Body of a `user` or `assistant` record.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRecord {
    /// Synthetic record injected by the runner, not typed by the human.
    #[serde(default)]
    pub is_meta: bool,
    /// Sub-type marker; conversational records carry none.
    #[serde(default)]
    pub subtype: Option<String>,
    /// When the record was appended.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// Session slug announcement.
    #[serde(default)]
    pub slug: Option<String>,
    /// Task-list snapshot.
    #[serde(default)]
    pub todos: Option<Vec<TodoItem>>,
    /// The message payload.
    #[serde(default)]
    pub message: Option<MessageBody>,
}

impl ConversationRecord {
    /// Whether this record counts as a conversational message.
    ///
    /// Meta records and sub-typed records never become `message` events.
    #[must_use]
    pub fn is_conversational(&self) -> bool {
        !self.is_meta && self.subtype.is_none()
    }

    /// The record's content blocks; empty for plain-string content.
    #[must_use]
    pub fn blocks(&self) -> &[ContentBlock] {
        match self.message.as_ref().map(|m| &m.content) {
            Some(MessageContent::Blocks(blocks)) => blocks,
            _ => &[],
        }
    }

    /// Concatenate the textual parts of the message, trimmed.
    ///
    /// Plain-string content is returned as-is; block content contributes
    /// only its `text` blocks, joined by newlines.
    #[must_use]
    pub fn text(&self) -> String {
        let Some(body) = &self.message else {
            return String::new();
        };
        match &body.content {
            MessageContent::Text(text) => text.trim().to_string(),
            MessageContent::Blocks(blocks) => {
                let parts: Vec<&str> = blocks
                    .iter()
                    .filter_map(|b| match b {
                        ContentBlock::Text { text } => Some(text.as_str()),
                        _ => None,
                    })
                    .collect();
                parts.join("\n").trim().to_string()
            },
        }
    }
}

/// Body of a `system` record.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemRecord {
    /// Sub-type marker.
    #[serde(default)]
    pub subtype: Option<String>,
    /// When the record was appended.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// Session slug announcement.
    #[serde(default)]
    pub slug: Option<String>,
    /// Task-list snapshot.
    #[serde(default)]
    pub todos: Option<Vec<TodoItem>>,
}

/// Message payload of a conversational record.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageBody {
    /// Plain string or heterogeneous block list.
    pub content: MessageContent,
}

/// Content of a message: either plain text or a list of typed blocks.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain string content.
    Text(String),
    /// Heterogeneous typed blocks.
    Blocks(Vec<ContentBlock>),
}

/// One typed content block.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Free text.
    Text {
        /// The text.
        text: String,
    },
    /// The AI invoked a tool.
    ToolUse {
        /// Tool-use id.
        id: String,
        /// Tool name.
        name: String,
        /// Tool input as recorded.
        #[serde(default)]
        input: Value,
    },
    /// Result of an earlier tool use.
    ToolResult {
        /// The originating tool-use id.
        tool_use_id: String,
        /// Result payload; string or nested blocks.
        #[serde(default)]
        content: Option<ToolResultContent>,
        /// Whether the tool reported an error.
        #[serde(default)]
        is_error: bool,
    },
    /// Any block type this build does not know about.
    #[serde(other)]
    Other,
}

/// Tool-result payload; the runner writes either form.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ToolResultContent {
    /// Plain string result.
    Text(String),
    /// Nested block list; only `text` blocks contribute.
    Blocks(Vec<ContentBlock>),
}

impl ToolResultContent {
    /// Flatten the result to plain text.
    #[must_use]
    pub fn text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Blocks(blocks) => {
                let parts: Vec<&str> = blocks
                    .iter()
                    .filter_map(|b| match b {
                        ContentBlock::Text { text } => Some(text.as_str()),
                        _ => None,
                    })
                    .collect();
                parts.join("\n")
            },
        }
    }
}
