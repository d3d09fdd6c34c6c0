//! The chat-adapter contract and its host loop.
//!
//! An adapter owns one remote surface (a Telegram chat, a Slack channel)
//! and reacts to session events. The [`AdapterHost`] wires an adapter to
//! the session manager: it runs the event loop, applies echo
//! suppression to user messages, and carries inbound remote text into
//! the session, recording it in the ledger first so the transcript echo
//! is dropped on the way back out.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use tether_core::{Role, SessionEvent, SessionId, SessionMode, SessionStatus, TodoItem};
use tether_session::{EventReceiver, SessionManager};

use crate::error::AdapterResult;
use crate::ledger::EchoLedger;

/// One remote chat surface.
///
/// Implementations post to their platform; ordering per session is the
/// caller's (host's) responsibility, error handling is the adapter's.
/// Methods the platform has no use for can keep their default no-op.
#[async_trait]
pub trait ChatAdapter: Send + Sync {
    /// A session appeared: create or identify the channel, post a start
    /// banner.
    async fn on_session_start(&self, id: &SessionId, name: &str, cwd: &Path) -> AdapterResult<()>;

    /// The session ended: post an end banner, archive if applicable.
    async fn on_session_end(&self, id: &SessionId) -> AdapterResult<()>;

    /// The display name changed (slug discovered).
    async fn on_session_update(&self, id: &SessionId, name: &str) -> AdapterResult<()>;

    /// Status transition. `Running → Idle` should post an attention
    /// banner mentioning the owning user.
    async fn on_status(&self, id: &SessionId, status: SessionStatus) -> AdapterResult<()>;

    /// A conversational message (echo suppression already applied).
    async fn on_message(&self, id: &SessionId, role: Role, text: &str) -> AdapterResult<()>;

    /// The task list changed; re-post the formatted list.
    async fn on_task_list(&self, id: &SessionId, items: &[TodoItem]) -> AdapterResult<()>;

    /// A tool call started. Default: ignore.
    async fn on_tool_call(&self, _id: &SessionId, _name: &str) -> AdapterResult<()> {
        Ok(())
    }

    /// Plan-mode transition. Default: ignore.
    async fn on_mode_change(&self, _id: &SessionId, _mode: SessionMode) -> AdapterResult<()> {
        Ok(())
    }
}

/// Connects one adapter to one session manager.
pub struct AdapterHost<A: ChatAdapter> {
    adapter: Arc<A>,
    manager: SessionManager,
    ledger: EchoLedger,
}

impl<A: ChatAdapter> AdapterHost<A> {
    /// Wire an adapter to a manager.
    #[must_use]
    pub fn new(adapter: Arc<A>, manager: SessionManager) -> Self {
        Self {
            adapter,
            manager,
            ledger: EchoLedger::new(),
        }
    }

    /// The adapter being hosted.
    #[must_use]
    pub fn adapter(&self) -> &Arc<A> {
        &self.adapter
    }

    /// The echo-suppression ledger.
    #[must_use]
    pub fn ledger(&self) -> &EchoLedger {
        &self.ledger
    }

    /// Forward remote text into a session.
    ///
    /// The trimmed text goes into the echo ledger before the send so the
    /// transcript echo is suppressed; a failed send rolls the entry back
    /// (the echo will never come).
    pub async fn submit_input(&self, id: &SessionId, text: &str) -> bool {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return false;
        }
        self.ledger.insert(trimmed).await;
        let sent = self.manager.send_input(id, trimmed).await;
        if !sent {
            self.ledger.remove(trimmed).await;
            warn!(session = %id, "input rejected, session gone");
        }
        sent
    }

    /// Consume events until the bus closes.
    ///
    /// Adapter errors are logged and swallowed: a broken surface must
    /// not take the tailer down with it.
    pub async fn run(&self, mut events: EventReceiver) {
        while let Some(event) = events.recv().await {
            let result = self.dispatch(event).await;
            if let Err(e) = result {
                warn!(error = %e, "adapter post failed");
            }
        }
        debug!("event bus closed, adapter host done");
    }

    async fn dispatch(&self, event: SessionEvent) -> AdapterResult<()> {
        match event {
            SessionEvent::SessionStarted { id, name, cwd } => {
                self.adapter.on_session_start(&id, &name, &cwd).await
            },
            SessionEvent::SessionEnded { id } => self.adapter.on_session_end(&id).await,
            SessionEvent::Slug { id, name } => self.adapter.on_session_update(&id, &name).await,
            SessionEvent::Status { id, status } => self.adapter.on_status(&id, status).await,
            SessionEvent::Message {
                id,
                role: Role::User,
                text,
                ..
            } => {
                if self.ledger.consume(&text).await {
                    debug!(session = %id, "echo suppressed");
                    Ok(())
                } else {
                    self.adapter.on_message(&id, Role::User, &text).await
                }
            },
            SessionEvent::Message {
                id,
                role: Role::Assistant,
                text,
                ..
            } => self.adapter.on_message(&id, Role::Assistant, &text).await,
            SessionEvent::TaskList { id, items } => {
                self.adapter.on_task_list(&id, &items).await
            },
            SessionEvent::ToolCall { id, name, .. } => {
                self.adapter.on_tool_call(&id, &name).await
            },
            SessionEvent::ModeChange { id, mode } => {
                self.adapter.on_mode_change(&id, mode).await
            },
            SessionEvent::ToolResult { .. } => Ok(()),
        }
    }
}
