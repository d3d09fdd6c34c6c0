//! Relay server for tether.
//!
//! A process-global fan-out hub: workstations announce sessions and
//! stream their events in; viewers subscribe and receive them, with
//! bounded history replay on (re)subscribe; viewer input is routed back
//! to the owning workstation. Authentication, per-session access
//! control, idle/ended push notifications, and the device-code pairing
//! flow live here too.
//!
//! - [`server`] — axum router, HTTP surface, WebSocket admission
//! - [`registry`] — connections, sessions, ring buffers, fan-out rules
//! - [`auth`] — the credential-store boundary
//! - [`pairing`] — device-code pairing store
//! - [`push`] — the push-gateway boundary

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

pub mod auth;
mod connection;
pub mod error;
pub mod pairing;
pub mod push;
pub mod registry;
pub mod server;

pub use auth::{ConnectionRole, CredentialStore, InMemoryCredentialStore, IssuedCredential, Principal};
pub use error::{RelayError, RelayResult};
pub use pairing::{ClaimOutcome, PairingStore, VerifyOutcome};
pub use push::{LogPushGateway, PushGateway, PushNotification};
pub use server::{RelayState, router, serve, serve_on};
