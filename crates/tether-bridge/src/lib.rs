//! Workstation-side relay client.
//!
//! Owns the WebSocket to the relay: authenticates with the long-lived
//! workstation credential, announces the manager's live sessions (again
//! on every reconnect), translates the session event stream into relay
//! frames, and routes inbound `send_input` frames back into the session
//! manager. Reconnects on a doubling wait window starting at one second,
//! giving up after ten consecutive failures.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

pub mod error;
mod reconnect;

use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use tether_core::SessionEvent;
use tether_core::proto::{ClientFrame, ServerFrame};
use tether_session::SessionManager;

pub use error::{BridgeError, BridgeResult};
use reconnect::ReconnectSchedule;

/// Consecutive connection failures tolerated before giving up.
const MAX_ATTEMPTS: u32 = 10;

/// First reconnect wait window; doubles on every further failure.
const RECONNECT_FLOOR: Duration = Duration::from_secs(1);

/// Largest reconnect wait window.
const RECONNECT_CEILING: Duration = Duration::from_secs(60);

/// How long to wait for the relay's auth verdict.
const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsTx = SplitSink<WsStream, Message>;
type WsRx = SplitStream<WsStream>;

/// The bridge between one session manager and one relay.
pub struct RelayBridge {
    url: String,
    token: String,
    manager: SessionManager,
}

impl RelayBridge {
    /// Create a bridge. `url` is the relay base (`ws://host:port`).
    #[must_use]
    pub fn new(url: impl Into<String>, token: impl Into<String>, manager: SessionManager) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            manager,
        }
    }

    /// Run until the session manager goes away (clean) or reconnection
    /// attempts are exhausted.
    ///
    /// The schedule only counts consecutive failures; any successful
    /// authenticated connection starts it over.
    pub async fn run(self) -> BridgeResult<()> {
        let mut schedule = ReconnectSchedule::new(RECONNECT_FLOOR, RECONNECT_CEILING, MAX_ATTEMPTS);

        loop {
            let outcome = match self.connect().await {
                Ok((ws_tx, ws_rx)) => {
                    schedule.connected();
                    self.serve(ws_tx, ws_rx).await
                },
                Err(e) => Err(e),
            };

            match outcome {
                Ok(()) => {
                    info!("event stream finished, bridge done");
                    return Ok(());
                },
                Err(BridgeError::AuthRejected(message)) => {
                    // A bad credential will not get better by retrying.
                    return Err(BridgeError::AuthRejected(message));
                },
                Err(e) => {
                    let Some(wait) = schedule.next_failure() else {
                        return Err(BridgeError::RetriesExhausted {
                            attempts: schedule.failures(),
                        });
                    };
                    warn!(
                        error = %e,
                        attempt = schedule.failures(),
                        wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                        "relay connection lost, waiting to reconnect"
                    );
                    tokio::time::sleep(wait).await;
                },
            }
        }
    }

    /// Connect and authenticate.
    async fn connect(&self) -> BridgeResult<(WsTx, WsRx)> {
        let url = format!("{}/ws/workstation", self.url.trim_end_matches('/'));
        let (ws, _) = connect_async(&url).await?;
        let (mut ws_tx, mut ws_rx) = ws.split();

        let auth = ClientFrame::Auth {
            token: self.token.clone(),
        };
        send_frame(&mut ws_tx, &auth).await?;
        match tokio::time::timeout(AUTH_TIMEOUT, next_server_frame(&mut ws_rx)).await {
            Ok(Some(ServerFrame::AuthOk)) => {},
            Ok(Some(ServerFrame::AuthError { message })) => {
                return Err(BridgeError::AuthRejected(message));
            },
            Ok(_) | Err(_) => return Err(BridgeError::ConnectionClosed),
        }
        info!(url = %url, "connected to relay");
        Ok((ws_tx, ws_rx))
    }

    /// Pump events out and input frames in, for one connection lifetime.
    async fn serve(&self, mut ws_tx: WsTx, mut ws_rx: WsRx) -> BridgeResult<()> {
        // Subscribe before announcing so no event published after the
        // snapshot below can be missed.
        let mut events = self.manager.subscribe();
        for info in self.manager.list().await {
            let frame = ClientFrame::SessionStart {
                session_id: info.id,
                name: info.name,
                cwd: info.cwd.display().to_string(),
            };
            send_frame(&mut ws_tx, &frame).await?;
        }

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else {
                        // Manager dropped: nothing left to bridge.
                        return Ok(());
                    };
                    if let Some(frame) = outbound_frame(event) {
                        send_frame(&mut ws_tx, &frame).await?;
                    }
                },
                message = ws_rx.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => self.handle_server_frame(&text).await,
                        Some(Ok(Message::Close(_))) | None => {
                            return Err(BridgeError::ConnectionClosed);
                        },
                        Some(Ok(_)) => {},
                        Some(Err(e)) => return Err(e.into()),
                    }
                },
            }
        }
    }

    async fn handle_server_frame(&self, text: &str) {
        match serde_json::from_str::<ServerFrame>(text) {
            Ok(ServerFrame::SendInput { session_id, text }) => {
                if !self.manager.send_input(&session_id, &text).await {
                    debug!(session = %session_id, "input for unknown or dead session dropped");
                }
            },
            Ok(ServerFrame::Error { message }) => {
                warn!(message = %message, "relay reported an error");
            },
            Ok(_) => {},
            Err(e) => debug!(error = %e, "malformed relay frame skipped"),
        }
    }
}

/// Translate a session event into its relay frame, if it has one.
///
/// Tool calls, tool results, and mode changes stay local: the relay
/// protocol does not carry them.
fn outbound_frame(event: SessionEvent) -> Option<ClientFrame> {
    match event {
        SessionEvent::SessionStarted { id, name, cwd } => Some(ClientFrame::SessionStart {
            session_id: id,
            name,
            cwd: cwd.display().to_string(),
        }),
        SessionEvent::Slug { id, name } => Some(ClientFrame::SessionUpdate {
            session_id: id,
            name,
        }),
        SessionEvent::Message { id, role, text, .. } => Some(ClientFrame::SessionMessage {
            session_id: id,
            role,
            content: text,
        }),
        SessionEvent::TaskList { id, items } => Some(ClientFrame::SessionTodos {
            session_id: id,
            todos: items,
        }),
        SessionEvent::Status { id, status } => Some(ClientFrame::SessionStatus {
            session_id: id,
            status,
        }),
        SessionEvent::SessionEnded { id } => Some(ClientFrame::SessionEnd { session_id: id }),
        SessionEvent::ToolCall { .. }
        | SessionEvent::ToolResult { .. }
        | SessionEvent::ModeChange { .. } => None,
    }
}

async fn send_frame(ws_tx: &mut WsTx, frame: &ClientFrame) -> BridgeResult<()> {
    let json = serde_json::to_string(frame).unwrap_or_default();
    ws_tx.send(Message::Text(json.into())).await?;
    Ok(())
}

async fn next_server_frame(ws_rx: &mut WsRx) -> Option<ServerFrame> {
    loop {
        match ws_rx.next().await? {
            Ok(Message::Text(text)) => {
                if let Ok(frame) = serde_json::from_str(&text) {
                    return Some(frame);
                }
            },
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => {},
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tether_core::{Role, SessionId, SessionStatus, TodoItem, TodoStatus};

    #[test]
    fn lifecycle_events_map_to_frames() {
        let started = outbound_frame(SessionEvent::SessionStarted {
            id: SessionId::from("s1"),
            name: "claude".into(),
            cwd: "/home/dev".into(),
        });
        assert!(matches!(
            started,
            Some(ClientFrame::SessionStart { cwd, .. }) if cwd == "/home/dev"
        ));

        let ended = outbound_frame(SessionEvent::SessionEnded {
            id: SessionId::from("s1"),
        });
        assert!(matches!(ended, Some(ClientFrame::SessionEnd { .. })));
    }

    #[test]
    fn slug_becomes_session_update() {
        let frame = outbound_frame(SessionEvent::Slug {
            id: SessionId::from("s1"),
            name: "refactor".into(),
        });
        assert!(matches!(
            frame,
            Some(ClientFrame::SessionUpdate { name, .. }) if name == "refactor"
        ));
    }

    #[test]
    fn message_and_todos_and_status_map() {
        assert!(matches!(
            outbound_frame(SessionEvent::Message {
                id: SessionId::from("s"),
                role: Role::Assistant,
                text: "hi".into(),
                timestamp: Utc::now(),
            }),
            Some(ClientFrame::SessionMessage { role: Role::Assistant, content, .. }) if content == "hi"
        ));
        assert!(matches!(
            outbound_frame(SessionEvent::TaskList {
                id: SessionId::from("s"),
                items: vec![TodoItem {
                    text: "a".into(),
                    status: TodoStatus::Pending
                }],
            }),
            Some(ClientFrame::SessionTodos { todos, .. }) if todos.len() == 1
        ));
        assert!(matches!(
            outbound_frame(SessionEvent::Status {
                id: SessionId::from("s"),
                status: SessionStatus::Idle,
            }),
            Some(ClientFrame::SessionStatus { status: SessionStatus::Idle, .. })
        ));
    }

    #[test]
    fn local_only_events_produce_no_frame() {
        assert!(outbound_frame(SessionEvent::ToolCall {
            id: SessionId::from("s"),
            call_id: "tu_1".into(),
            name: "bash".into(),
            input: serde_json::json!({}),
        })
        .is_none());
        assert!(outbound_frame(SessionEvent::ModeChange {
            id: SessionId::from("s"),
            mode: tether_core::SessionMode::Planning,
        })
        .is_none());
    }
}
