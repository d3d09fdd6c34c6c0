//! Telegram adapter for tether.
//!
//! Binds one Telegram chat to the workstation's sessions: session
//! events are posted into the chat (start/end banners, renames,
//! attention banners on idle, messages, task lists, image
//! attachments), and chat messages are fed back into the active
//! session with echo suppression.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

pub mod adapter;
pub mod bot;
pub mod error;
pub mod format;
pub mod handler;

pub use adapter::TelegramAdapter;
pub use error::{TelegramBotError, TelegramResult};
