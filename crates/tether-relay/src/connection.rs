//! Per-connection WebSocket loops.
//!
//! Every connection starts unauthenticated: the first frame must be
//! `auth`, answered with `auth_ok` or `auth_error` (then close). After
//! that, the loop dispatches role-specific frames until the socket
//! closes, the registry cancels the connection (back-pressure), or the
//! process shuts down.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use tether_core::SessionId;
use tether_core::proto::{ClientFrame, ServerFrame};

use crate::auth::{ConnectionRole, Principal};
use crate::server::RelayState;

/// How long an unauthenticated connection may sit before being dropped.
const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

/// Drive one freshly upgraded socket to completion.
pub(crate) async fn serve_socket(
    socket: WebSocket,
    path_role: ConnectionRole,
    state: Arc<RelayState>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let Some(principal) = authenticate(&mut ws_tx, &mut ws_rx, path_role, &state).await else {
        return;
    };

    let registered = state.registry.register_connection(&principal).await;
    let conn_id = registered.conn_id;
    let cancel = registered.cancel;
    let mut outbound_rx = registered.outbound_rx;

    // Writer task: everything queued for this connection goes out here.
    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            let Ok(json) = serde_json::to_string(&frame) else {
                continue;
            };
            if ws_tx.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    match path_role {
        ConnectionRole::Workstation => {
            workstation_loop(&mut ws_rx, &cancel, conn_id, &principal, &state).await;
            // Transport closure ends every session this connection owned.
            state.registry.end_sessions_owned_by(conn_id).await;
        },
        ConnectionRole::Viewer => {
            viewer_loop(&mut ws_rx, &cancel, conn_id, &principal, &state).await;
        },
    }

    state.registry.unregister_connection(conn_id).await;
    writer.abort();
    info!(conn = conn_id, "connection closed");
}

/// Run the auth handshake; `None` means the connection is done.
async fn authenticate(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    ws_rx: &mut SplitStream<WebSocket>,
    path_role: ConnectionRole,
    state: &RelayState,
) -> Option<Principal> {
    let first = tokio::time::timeout(AUTH_TIMEOUT, next_frame(ws_rx)).await;
    let token = match first {
        Ok(Some(ClientFrame::Auth { token })) => token,
        Ok(_) => {
            let _ = send_now(ws_tx, &ServerFrame::AuthError {
                message: "first message must be auth".into(),
            })
            .await;
            return None;
        },
        Err(_) => {
            debug!("auth timeout");
            return None;
        },
    };

    let principal = match state.credentials.verify(&token).await {
        Some(principal) if principal.role == path_role => principal,
        Some(_) => {
            let _ = send_now(ws_tx, &ServerFrame::AuthError {
                message: format!("credential not valid for the {path_role} path"),
            })
            .await;
            return None;
        },
        None => {
            let _ = send_now(ws_tx, &ServerFrame::AuthError {
                message: "invalid token".into(),
            })
            .await;
            return None;
        },
    };

    if send_now(ws_tx, &ServerFrame::AuthOk).await.is_err() {
        return None;
    }
    Some(principal)
}

/// Workstation dispatch.
async fn workstation_loop(
    ws_rx: &mut SplitStream<WebSocket>,
    cancel: &tokio_util::sync::CancellationToken,
    conn_id: crate::registry::ConnId,
    principal: &Principal,
    state: &RelayState,
) {
    let user = principal.user_id;
    // announced id → tracked id (rewritten on collision)
    let mut aliases: HashMap<SessionId, SessionId> = HashMap::new();

    loop {
        let frame = tokio::select! {
            () = cancel.cancelled() => break,
            frame = next_frame(ws_rx) => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        match frame {
            ClientFrame::SessionStart {
                session_id,
                name,
                cwd,
            } => {
                let assigned = state
                    .registry
                    .announce_session(conn_id, user, session_id.clone(), name, cwd)
                    .await;
                aliases.insert(session_id, assigned);
            },
            ClientFrame::SessionUpdate { session_id, name } => {
                let id = resolve(&aliases, session_id);
                state.registry.update_session_name(user, &id, name).await;
            },
            ClientFrame::SessionTodos { session_id, todos } => {
                let id = resolve(&aliases, session_id);
                state.registry.update_session_todos(user, &id, todos).await;
            },
            ClientFrame::SessionMessage {
                session_id,
                role,
                content,
            } => {
                let id = resolve(&aliases, session_id);
                state.registry.session_message(user, &id, role, content).await;
            },
            ClientFrame::SessionStatus { session_id, status } => {
                let id = resolve(&aliases, session_id);
                state.registry.session_status(user, &id, status).await;
            },
            ClientFrame::SessionEnd { session_id } => {
                let id = resolve(&aliases, session_id.clone());
                state.registry.end_session(user, &id).await;
                aliases.remove(&session_id);
            },
            ClientFrame::Auth { .. } => {
                debug!(conn = conn_id, "redundant auth frame ignored");
            },
            other => {
                warn!(conn = conn_id, frame = ?other, "viewer frame on workstation path");
                state
                    .registry
                    .reply(conn_id, ServerFrame::Error {
                        message: "not a viewer connection".into(),
                    })
                    .await;
            },
        }
    }
}

/// Viewer dispatch.
async fn viewer_loop(
    ws_rx: &mut SplitStream<WebSocket>,
    cancel: &tokio_util::sync::CancellationToken,
    conn_id: crate::registry::ConnId,
    principal: &Principal,
    state: &RelayState,
) {
    let user = principal.user_id;

    loop {
        let frame = tokio::select! {
            () = cancel.cancelled() => break,
            frame = next_frame(ws_rx) => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        match frame {
            ClientFrame::ListSessions => {
                let sessions = state.registry.sessions_snapshot(user).await;
                state
                    .registry
                    .reply(conn_id, ServerFrame::SessionsList { sessions })
                    .await;
            },
            ClientFrame::Subscribe { session_id } => {
                if let Err(message) = state.registry.subscribe(conn_id, user, &session_id).await {
                    state.registry.reply(conn_id, ServerFrame::Error { message }).await;
                }
            },
            ClientFrame::Unsubscribe { session_id } => {
                state.registry.unsubscribe(conn_id, &session_id).await;
            },
            ClientFrame::SendInput { session_id, text } => {
                if let Err(message) = state.registry.route_input(user, &session_id, text).await {
                    state.registry.reply(conn_id, ServerFrame::Error { message }).await;
                }
            },
            ClientFrame::TrackSession { session_id } => {
                state.registry.set_tracked(user, &session_id, true).await;
            },
            ClientFrame::UntrackSession { session_id } => {
                state.registry.set_tracked(user, &session_id, false).await;
            },
            ClientFrame::RegisterPushToken { push_token } => {
                state.registry.register_push_token(user, push_token).await;
            },
            ClientFrame::Auth { .. } => {
                debug!(conn = conn_id, "redundant auth frame ignored");
            },
            other => {
                warn!(conn = conn_id, frame = ?other, "workstation frame on viewer path");
                state
                    .registry
                    .reply(conn_id, ServerFrame::Error {
                        message: "not a workstation connection".into(),
                    })
                    .await;
            },
        }
    }
}

fn resolve(aliases: &HashMap<SessionId, SessionId>, id: SessionId) -> SessionId {
    aliases.get(&id).cloned().unwrap_or(id)
}

/// Read the next parseable client frame; `None` on close or transport
/// error. Malformed frames are skipped, not fatal.
async fn next_frame(ws_rx: &mut SplitStream<WebSocket>) -> Option<ClientFrame> {
    loop {
        match ws_rx.next().await {
            Some(Ok(Message::Text(text))) => match serde_json::from_str(&text) {
                Ok(frame) => return Some(frame),
                Err(e) => debug!(error = %e, "malformed client frame skipped"),
            },
            Some(Ok(Message::Close(_))) | None => return None,
            Some(Ok(Message::Binary(_) | Message::Ping(_) | Message::Pong(_))) => {},
            Some(Err(e)) => {
                debug!(error = %e, "socket read error");
                return None;
            },
        }
    }
}

/// Send a frame directly on the socket (pre-registration only).
async fn send_now(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    frame: &ServerFrame,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(frame).unwrap_or_default();
    ws_tx.send(Message::Text(json.into())).await
}
