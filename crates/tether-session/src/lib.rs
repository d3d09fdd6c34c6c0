//! Session manager for tether.
//!
//! Runs on the workstation. Accepts session announcements from runners
//! over a local Unix-socket rendezvous, discovers and tails each
//! session's transcript file, and publishes a normalized event stream:
//!
//! - [`manager::SessionManager`] — registration, input forwarding,
//!   teardown, read-only queries
//! - [`ipc::IpcServer`] — the rendezvous socket
//! - [`bus`] — event fan-out to bridges and adapters
//! - [`discovery`] — transcript discovery and the process-wide claim set

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

pub mod bus;
pub mod discovery;
pub mod error;
pub mod ipc;
pub mod manager;
mod tailer;

pub use bus::{EventBus, EventReceiver};
pub use error::{SessionError, SessionResult};
pub use ipc::IpcServer;
pub use manager::{SessionAnnounce, SessionInfo, SessionManager, SUBMIT_DELAY};
