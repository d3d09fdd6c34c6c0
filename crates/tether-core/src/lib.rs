//! Core types for the tether session mediation layer.
//!
//! This crate is the shared vocabulary of the workspace:
//!
//! - [`id`] — UUID-backed identifier newtypes
//! - [`event`] — the normalized session event model emitted by the
//!   session manager and consumed by bridges and adapters
//! - [`transcript`] — the on-disk transcript record model (consumed,
//!   never produced)
//! - [`proto`] — relay wire frames and the local runner IPC frames
//! - [`config`] — TOML configuration loading
//! - [`error`] — shared error type

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

pub mod config;
pub mod error;
pub mod event;
pub mod id;
pub mod proto;
pub mod transcript;

pub use error::{CoreError, CoreResult};
pub use event::{Role, SessionEvent, SessionMode, SessionStatus, TodoItem, TodoStatus};
pub use id::{DeviceId, SessionId, UserId};
