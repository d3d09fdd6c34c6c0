//! The Telegram implementation of the chat-adapter contract.
//!
//! One bot, one bound chat. Assistant markdown is converted to Telegram
//! HTML (with a plain-text retry when Telegram rejects the formatting),
//! long messages are chunked, image paths referenced by the assistant
//! are attached once, and dispatch is lightly rate-limited.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{InputFile, ParseMode};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use tether_adapter::format::{chunk_text, find_image_paths};
use tether_adapter::{AdapterError, AdapterResult, ChatAdapter};
use tether_core::{Role, SessionId, SessionStatus, TodoItem, TodoStatus};

use crate::format::{MAX_MESSAGE_LEN, md_to_telegram_html};

/// Minimum gap between posts (≈10 messages/second sustained).
const MIN_POST_GAP: Duration = Duration::from_millis(100);

/// Per-session display state.
#[derive(Debug, Clone)]
struct SessionView {
    name: String,
    cwd: PathBuf,
}

/// Telegram chat adapter.
pub struct TelegramAdapter {
    bot: Bot,
    chat_id: ChatId,
    mention: Option<String>,
    sessions: Mutex<HashMap<SessionId, SessionView>>,
    last_post: Mutex<Instant>,
    home: Option<PathBuf>,
}

impl TelegramAdapter {
    /// Create an adapter bound to one chat.
    #[must_use]
    pub fn new(bot: Bot, chat_id: ChatId, mention: Option<String>) -> Self {
        Self {
            bot,
            chat_id,
            mention,
            sessions: Mutex::new(HashMap::new()),
            last_post: Mutex::new(Instant::now()),
            home: directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()),
        }
    }

    async fn display_name(&self, id: &SessionId) -> String {
        self.sessions
            .lock()
            .await
            .get(id)
            .map_or_else(|| id.to_string(), |view| view.name.clone())
    }

    /// Space out posts; Telegram throttles chatty bots.
    async fn pace(&self) {
        let mut last = self.last_post.lock().await;
        let elapsed = last.elapsed();
        if elapsed < MIN_POST_GAP {
            tokio::time::sleep(MIN_POST_GAP.saturating_sub(elapsed)).await;
        }
        *last = Instant::now();
    }

    /// Post markdown as HTML chunks, falling back to plain text per
    /// chunk if Telegram rejects the formatting.
    async fn post_markdown(&self, md: &str) -> AdapterResult<()> {
        for chunk in chunk_text(md, MAX_MESSAGE_LEN) {
            self.pace().await;
            let html = md_to_telegram_html(&chunk);
            let formatted = self
                .bot
                .send_message(self.chat_id, html)
                .parse_mode(ParseMode::Html)
                .await;
            if let Err(e) = formatted {
                debug!(error = %e, "formatted post rejected, retrying plain");
                self.bot
                    .send_message(self.chat_id, chunk)
                    .await
                    .map_err(|e| AdapterError::Post(e.to_string()))?;
            }
        }
        Ok(())
    }

    /// Post plain text chunks (no parse mode, nothing to reject).
    async fn post_plain(&self, text: &str) -> AdapterResult<()> {
        for chunk in chunk_text(text, MAX_MESSAGE_LEN) {
            self.pace().await;
            self.bot
                .send_message(self.chat_id, chunk)
                .await
                .map_err(|e| AdapterError::Post(e.to_string()))?;
        }
        Ok(())
    }

    async fn attach_images(&self, id: &SessionId, text: &str) {
        let cwd = self
            .sessions
            .lock()
            .await
            .get(id)
            .map(|view| view.cwd.clone());
        let Some(cwd) = cwd else {
            return;
        };
        for path in find_image_paths(text, &cwd, self.home.as_deref()) {
            self.pace().await;
            if let Err(e) = self
                .bot
                .send_photo(self.chat_id, InputFile::file(path.clone()))
                .await
            {
                warn!(path = %path.display(), error = %e, "image attachment failed");
            }
        }
    }
}

#[async_trait]
impl ChatAdapter for TelegramAdapter {
    async fn on_session_start(&self, id: &SessionId, name: &str, cwd: &Path) -> AdapterResult<()> {
        self.sessions.lock().await.insert(
            id.clone(),
            SessionView {
                name: name.to_string(),
                cwd: cwd.to_path_buf(),
            },
        );
        self.post_plain(&format!("▶️ {name}: session started in {}", cwd.display()))
            .await
    }

    async fn on_session_end(&self, id: &SessionId) -> AdapterResult<()> {
        let name = self.display_name(id).await;
        self.sessions.lock().await.remove(id);
        self.post_plain(&format!("⏹ {name}: session ended")).await
    }

    async fn on_session_update(&self, id: &SessionId, name: &str) -> AdapterResult<()> {
        if let Some(view) = self.sessions.lock().await.get_mut(id) {
            view.name = name.to_string();
        }
        self.post_plain(&format!("✏️ session is now “{name}”")).await
    }

    async fn on_status(&self, id: &SessionId, status: SessionStatus) -> AdapterResult<()> {
        if status != SessionStatus::Idle {
            return Ok(());
        }
        let name = self.display_name(id).await;
        let mention = self
            .mention
            .as_deref()
            .map(|m| format!(" {m}"))
            .unwrap_or_default();
        self.post_plain(&format!("⏸ {name} is waiting on you{mention}"))
            .await
    }

    async fn on_message(&self, id: &SessionId, role: Role, text: &str) -> AdapterResult<()> {
        match role {
            Role::User => self.post_plain(&format!("👤 {text}")).await,
            Role::Assistant => {
                self.post_markdown(text).await?;
                self.attach_images(id, text).await;
                Ok(())
            },
        }
    }

    async fn on_task_list(&self, _id: &SessionId, items: &[TodoItem]) -> AdapterResult<()> {
        self.post_plain(&format_todos(items)).await
    }
}

/// Render a task list as a compact checklist.
fn format_todos(items: &[TodoItem]) -> String {
    let mut out = String::from("📋 Tasks");
    for item in items {
        let mark = match item.status {
            TodoStatus::Completed => '☑',
            TodoStatus::InProgress => '◐',
            TodoStatus::Pending | TodoStatus::Unknown => '☐',
        };
        out.push('\n');
        out.push(mark);
        out.push(' ');
        out.push_str(&item.text);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn todos_render_with_status_marks() {
        let items = vec![
            TodoItem {
                text: "write tests".into(),
                status: TodoStatus::Completed,
            },
            TodoItem {
                text: "fix bug".into(),
                status: TodoStatus::InProgress,
            },
            TodoItem {
                text: "ship".into(),
                status: TodoStatus::Pending,
            },
        ];
        let rendered = format_todos(&items);
        assert_eq!(rendered, "📋 Tasks\n☑ write tests\n◐ fix bug\n☐ ship");
    }

    #[test]
    fn empty_task_list_is_just_the_header() {
        assert_eq!(format_todos(&[]), "📋 Tasks");
    }
}
