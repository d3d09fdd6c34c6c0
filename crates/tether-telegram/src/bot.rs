//! Bot assembly: session manager + rendezvous socket + adapter host +
//! Telegram long polling, in one process on the workstation.

use std::sync::Arc;

use teloxide::prelude::*;
use tokio::sync::Mutex;
use tracing::info;

use tether_adapter::AdapterHost;
use tether_core::config::TetherConfig;
use tether_session::{IpcServer, SessionManager};

use crate::adapter::TelegramAdapter;
use crate::error::{TelegramBotError, TelegramResult};
use crate::handler::{BotState, handle_message};

/// Run the Telegram adapter until the process is stopped.
pub async fn run(config: TetherConfig) -> TelegramResult<()> {
    let telegram = config
        .telegram
        .clone()
        .ok_or_else(|| TelegramBotError::Config("no [telegram] section".into()))?;
    let token = telegram
        .bot_token
        .ok_or_else(|| TelegramBotError::Auth("no bot token configured".into()))?;
    let chat_id = ChatId(
        telegram
            .chat_id
            .ok_or_else(|| TelegramBotError::Config("no chat_id configured".into()))?,
    );

    let bot = Bot::new(token);

    let manager = SessionManager::new(config.manager.idle_after());
    let ipc = IpcServer::bind(&config.manager.socket_path, manager.clone())?;
    tokio::spawn(ipc.run());

    let adapter = Arc::new(TelegramAdapter::new(
        bot.clone(),
        chat_id,
        telegram.mention.clone(),
    ));
    let host = Arc::new(AdapterHost::new(adapter, manager.clone()));
    let events = manager.subscribe();
    {
        let host = Arc::clone(&host);
        tokio::spawn(async move { host.run(events).await });
    }

    info!(%chat_id, "telegram adapter running");
    let state = BotState {
        host,
        manager,
        chat_id,
        pinned: Arc::new(Mutex::new(None)),
    };
    teloxide::repl(bot, move |bot: Bot, msg: Message| {
        let state = state.clone();
        async move { handle_message(bot, msg, state).await }
    })
    .await;

    Ok(())
}
