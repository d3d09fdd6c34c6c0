//! Inbound message handler: remote text from the bound chat goes into a
//! session; slash commands answer directly.

use std::sync::Arc;

use teloxide::prelude::*;
use tokio::sync::Mutex;
use tracing::warn;

use tether_adapter::AdapterHost;
use tether_core::SessionId;
use tether_session::{SessionInfo, SessionManager};

use crate::adapter::TelegramAdapter;

/// Shared state for all updates.
#[derive(Clone)]
pub struct BotState {
    /// The adapter host (owns the echo ledger).
    pub host: Arc<AdapterHost<TelegramAdapter>>,
    /// The local session manager.
    pub manager: SessionManager,
    /// The one chat this bot serves.
    pub chat_id: ChatId,
    /// Session pinned with `/use`; otherwise the newest session wins.
    pub pinned: Arc<Mutex<Option<SessionId>>>,
}

/// Handle one incoming Telegram message.
pub async fn handle_message(bot: Bot, msg: Message, state: BotState) -> ResponseResult<()> {
    if msg.chat.id != state.chat_id {
        return Ok(());
    }
    let Some(text) = msg.text() else {
        return Ok(());
    };

    if text.starts_with('/') {
        return handle_command(&bot, text, &state).await;
    }

    let sessions = state.manager.list().await;
    let pinned = state.pinned.lock().await.clone();
    let Some(target) = pick_target(&sessions, pinned.as_ref()) else {
        let _ = bot
            .send_message(state.chat_id, "No active session to send to.")
            .await;
        return Ok(());
    };

    if !state.host.submit_input(&target, text).await {
        warn!(session = %target, "input rejected");
        let _ = bot
            .send_message(state.chat_id, format!("Session {target} is gone."))
            .await;
    }
    Ok(())
}

/// Pick the session inbound text is routed to: the pinned one if it is
/// still alive, else the most recently started.
pub(crate) fn pick_target(
    sessions: &[SessionInfo],
    pinned: Option<&SessionId>,
) -> Option<SessionId> {
    if let Some(pinned) = pinned
        && sessions.iter().any(|s| &s.id == pinned)
    {
        return Some(pinned.clone());
    }
    sessions
        .iter()
        .max_by_key(|s| s.started_at)
        .map(|s| s.id.clone())
}

async fn handle_command(bot: &Bot, text: &str, state: &BotState) -> ResponseResult<()> {
    let mut words = text.split_whitespace();
    let command = words.next().unwrap_or("");

    match command {
        "/start" | "/help" => {
            let help = "Send any text to feed the active session.\n\n\
                        /sessions - list live sessions\n\
                        /use <id> - pin the target session\n\
                        /help - this text";
            let _ = bot.send_message(state.chat_id, help).await;
        },
        "/sessions" => {
            let sessions = state.manager.list().await;
            let reply = if sessions.is_empty() {
                "No live sessions.".to_string()
            } else {
                sessions
                    .iter()
                    .map(|s| format!("{} — {} ({})", s.id, s.name, s.status))
                    .collect::<Vec<_>>()
                    .join("\n")
            };
            let _ = bot.send_message(state.chat_id, reply).await;
        },
        "/use" => match words.next() {
            Some(id) => {
                let id = SessionId::from(id);
                if state.manager.get(&id).await.is_some() {
                    *state.pinned.lock().await = Some(id.clone());
                    let _ = bot
                        .send_message(state.chat_id, format!("Pinned to {id}."))
                        .await;
                } else {
                    let _ = bot
                        .send_message(state.chat_id, format!("No such session: {id}"))
                        .await;
                }
            },
            None => {
                *state.pinned.lock().await = None;
                let _ = bot
                    .send_message(state.chat_id, "Unpinned; newest session wins.")
                    .await;
            },
        },
        _ => {
            let _ = bot
                .send_message(state.chat_id, "Unknown command. Try /help.")
                .await;
        },
    }
    Ok(())
}
