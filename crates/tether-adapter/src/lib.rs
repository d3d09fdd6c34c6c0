//! Chat-adapter contract for tether.
//!
//! Platform-agnostic pieces shared by every remote chat surface:
//!
//! - [`ChatAdapter`] — the callback surface an adapter implements
//! - [`AdapterHost`] — the loop wiring an adapter to a session manager,
//!   including echo suppression on inbound/outbound user text
//! - [`EchoLedger`] — the bounded fingerprint FIFO behind it
//! - [`format`] — chunking and image-path scanning helpers

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

pub mod adapter;
pub mod error;
pub mod format;
pub mod ledger;

pub use adapter::{AdapterHost, ChatAdapter};
pub use error::{AdapterError, AdapterResult};
pub use ledger::EchoLedger;
