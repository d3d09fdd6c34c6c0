//! Connection and session registry.
//!
//! Process-wide state of the relay, explicitly owned (no ambient
//! globals): authenticated connections, tracked sessions with their
//! recent-event ring buffers, per-user notification marks, and push
//! tokens. Each map has its own lock; where two are taken together the
//! order is always sessions → connections.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tether_core::proto::{ServerFrame, SessionSummary};
use tether_core::{Role, SessionId, SessionStatus, TodoItem, UserId};

use crate::auth::{ConnectionRole, Principal};
use crate::push::{PushGateway, PushNotification};

/// Ring-buffer capacity: how many conversational messages are replayed
/// to a late subscriber.
pub const RECENT_CAPACITY: usize = 100;

/// Outbound frame queue per connection. A viewer that lets this fill up
/// is dropped rather than allowed to stall the relay.
const OUTBOUND_QUEUE: usize = 256;

/// Process-unique connection id.
pub(crate) type ConnId = u64;

/// One authenticated connection.
struct ConnectionHandle {
    user: UserId,
    role: ConnectionRole,
    outbound: mpsc::Sender<ServerFrame>,
    cancel: CancellationToken,
}

/// One session announced by a workstation.
struct TrackedSession {
    user: UserId,
    owner: Option<ConnId>,
    name: String,
    cwd: String,
    status: SessionStatus,
    started_at: DateTime<Utc>,
    /// Recent conversational messages, oldest first.
    recent: VecDeque<(Role, String)>,
    /// Last task list (kept as last-value, not ring-buffered).
    todos: Option<Vec<TodoItem>>,
    subscribers: HashSet<ConnId>,
}

impl TrackedSession {
    fn summary(&self, id: &SessionId) -> SessionSummary {
        SessionSummary {
            id: id.clone(),
            name: self.name.clone(),
            cwd: self.cwd.clone(),
            status: self.status,
            started_at: self.started_at,
        }
    }
}

/// Everything a freshly registered connection needs.
pub(crate) struct RegisteredConnection {
    pub(crate) conn_id: ConnId,
    pub(crate) outbound_rx: mpsc::Receiver<ServerFrame>,
    pub(crate) cancel: CancellationToken,
}

/// The relay's shared state.
pub struct Registry {
    connections: RwLock<HashMap<ConnId, ConnectionHandle>>,
    sessions: RwLock<HashMap<SessionId, TrackedSession>>,
    tracked: RwLock<HashMap<UserId, HashSet<SessionId>>>,
    push_tokens: RwLock<HashMap<UserId, Vec<String>>>,
    push: Arc<dyn PushGateway>,
    next_conn_id: AtomicU64,
}

impl Registry {
    /// Create a registry that pushes through `push`.
    #[must_use]
    pub fn new(push: Arc<dyn PushGateway>) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
            tracked: RwLock::new(HashMap::new()),
            push_tokens: RwLock::new(HashMap::new()),
            push,
            next_conn_id: AtomicU64::new(1),
        }
    }

    // ---- connection lifecycle ----

    pub(crate) async fn register_connection(&self, principal: &Principal) -> RegisteredConnection {
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE);
        let cancel = CancellationToken::new();
        self.connections.write().await.insert(
            conn_id,
            ConnectionHandle {
                user: principal.user_id,
                role: principal.role,
                outbound,
                cancel: cancel.clone(),
            },
        );
        info!(conn = conn_id, user = %principal.user_id, role = %principal.role, "connection registered");
        RegisteredConnection {
            conn_id,
            outbound_rx,
            cancel,
        }
    }

    /// Remove a connection and its viewer subscriptions.
    ///
    /// Workstation-owned sessions are NOT ended here; the connection
    /// loop ends them first so that subscribers and pushes fire in
    /// order.
    pub(crate) async fn unregister_connection(&self, conn_id: ConnId) {
        {
            let mut sessions = self.sessions.write().await;
            for session in sessions.values_mut() {
                session.subscribers.remove(&conn_id);
            }
        }
        self.connections.write().await.remove(&conn_id);
        debug!(conn = conn_id, "connection unregistered");
    }

    // ---- workstation side ----

    /// Track an announced session and broadcast the user's refreshed
    /// session list to all of their viewers.
    ///
    /// Returns the id under which the session is tracked; it differs
    /// from the announced one only when the announced id collides
    /// within the user namespace.
    pub(crate) async fn announce_session(
        &self,
        owner: ConnId,
        user: UserId,
        id: SessionId,
        name: String,
        cwd: String,
    ) -> SessionId {
        let assigned = {
            let mut sessions = self.sessions.write().await;
            let mut assigned = id;
            while sessions.contains_key(&assigned) {
                assigned = assigned.with_suffix(&format!("{:04x}", rand::random::<u16>()));
            }
            sessions.insert(
                assigned.clone(),
                TrackedSession {
                    user,
                    owner: Some(owner),
                    name,
                    cwd,
                    status: SessionStatus::Running,
                    started_at: Utc::now(),
                    recent: VecDeque::new(),
                    todos: None,
                    subscribers: HashSet::new(),
                },
            );
            assigned
        };
        info!(session = %assigned, user = %user, "session announced");
        self.broadcast_sessions_list(user).await;
        assigned
    }

    pub(crate) async fn update_session_name(&self, user: UserId, id: &SessionId, name: String) {
        let mut sessions = self.sessions.write().await;
        let Some(session) = Self::owned_session(&mut sessions, user, id) else {
            return;
        };
        session.name.clone_from(&name);
        let frame = ServerFrame::SessionUpdate {
            session_id: id.clone(),
            name,
        };
        self.forward_to_subscribers(session, &frame).await;
    }

    pub(crate) async fn update_session_todos(
        &self,
        user: UserId,
        id: &SessionId,
        todos: Vec<TodoItem>,
    ) {
        let mut sessions = self.sessions.write().await;
        let Some(session) = Self::owned_session(&mut sessions, user, id) else {
            return;
        };
        session.todos = Some(todos.clone());
        let frame = ServerFrame::SessionTodos {
            session_id: id.clone(),
            todos,
        };
        self.forward_to_subscribers(session, &frame).await;
    }

    pub(crate) async fn session_message(
        &self,
        user: UserId,
        id: &SessionId,
        role: Role,
        content: String,
    ) {
        let mut sessions = self.sessions.write().await;
        let Some(session) = Self::owned_session(&mut sessions, user, id) else {
            return;
        };
        session.recent.push_back((role, content.clone()));
        while session.recent.len() > RECENT_CAPACITY {
            session.recent.pop_front();
        }
        let frame = ServerFrame::SessionMessage {
            session_id: id.clone(),
            role,
            content,
        };
        self.forward_to_subscribers(session, &frame).await;
    }

    pub(crate) async fn session_status(&self, user: UserId, id: &SessionId, status: SessionStatus) {
        let became_idle = {
            let mut sessions = self.sessions.write().await;
            let Some(session) = Self::owned_session(&mut sessions, user, id) else {
                return;
            };
            // Ended is absorbing; a stale frame cannot resurrect.
            if session.status == SessionStatus::Ended || session.status == status {
                return;
            }
            let became_idle =
                session.status == SessionStatus::Running && status == SessionStatus::Idle;
            session.status = status;
            let frame = ServerFrame::SessionStatus {
                session_id: id.clone(),
                status,
            };
            self.forward_to_subscribers(session, &frame).await;
            became_idle
        };

        if became_idle {
            let name = {
                let sessions = self.sessions.read().await;
                sessions
                    .get(id)
                    .map_or_else(|| id.to_string(), |s| s.name.clone())
            };
            self.push_if_tracked(user, id, &name, "Session idle", "is waiting on you")
                .await;
        }
    }

    /// Transition a session to ended, notify subscribers, push if
    /// tracked, and drop the state.
    pub(crate) async fn end_session(&self, user: UserId, id: &SessionId) {
        let name = {
            let mut sessions = self.sessions.write().await;
            match sessions.get(id) {
                Some(session) if session.user == user => {},
                _ => return,
            }
            let Some(session) = sessions.remove(id) else {
                return;
            };
            let frame = ServerFrame::SessionStatus {
                session_id: id.clone(),
                status: SessionStatus::Ended,
            };
            self.forward_to_subscribers(&session, &frame).await;
            session.name
        };

        self.push_if_tracked(user, id, &name, "Session ended", "has ended")
            .await;
        self.tracked
            .write()
            .await
            .entry(user)
            .or_default()
            .remove(id);
        info!(session = %id, "session ended");
    }

    /// End every session owned by a workstation connection (transport
    /// closure).
    pub(crate) async fn end_sessions_owned_by(&self, conn_id: ConnId) {
        let owned: Vec<(UserId, SessionId)> = {
            let sessions = self.sessions.read().await;
            sessions
                .iter()
                .filter(|(_, s)| s.owner == Some(conn_id))
                .map(|(id, s)| (s.user, id.clone()))
                .collect()
        };
        for (user, id) in owned {
            self.end_session(user, &id).await;
        }
    }

    // ---- viewer side ----

    pub(crate) async fn sessions_snapshot(&self, user: UserId) -> Vec<SessionSummary> {
        let sessions = self.sessions.read().await;
        let mut summaries: Vec<SessionSummary> = sessions
            .iter()
            .filter(|(_, s)| s.user == user)
            .map(|(id, s)| s.summary(id))
            .collect();
        summaries.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        summaries
    }

    /// Subscribe a viewer to a session.
    ///
    /// Sends, in order: the current status, up to [`RECENT_CAPACITY`]
    /// recent messages, and the latest task list, all enqueued before
    /// the subscription becomes live, so replay never interleaves with
    /// live frames.
    pub(crate) async fn subscribe(
        &self,
        conn_id: ConnId,
        user: UserId,
        id: &SessionId,
    ) -> Result<(), String> {
        let mut sessions = self.sessions.write().await;
        let Some(session) = sessions.get_mut(id) else {
            return Err(format!("session not found: {id}"));
        };
        if session.user != user {
            // Same shape as not-found: no cross-user existence leakage.
            return Err(format!("session not found: {id}"));
        }

        let mut replay = Vec::with_capacity(session.recent.len().saturating_add(2));
        replay.push(ServerFrame::SessionStatus {
            session_id: id.clone(),
            status: session.status,
        });
        for (role, content) in &session.recent {
            replay.push(ServerFrame::SessionMessage {
                session_id: id.clone(),
                role: *role,
                content: content.clone(),
            });
        }
        if let Some(todos) = &session.todos {
            replay.push(ServerFrame::SessionTodos {
                session_id: id.clone(),
                todos: todos.clone(),
            });
        }

        let connections = self.connections.read().await;
        if let Some(conn) = connections.get(&conn_id) {
            for frame in replay {
                Self::deliver(conn_id, conn, &frame);
            }
        }
        session.subscribers.insert(conn_id);
        Ok(())
    }

    pub(crate) async fn unsubscribe(&self, conn_id: ConnId, id: &SessionId) {
        if let Some(session) = self.sessions.write().await.get_mut(id) {
            session.subscribers.remove(&conn_id);
        }
    }

    /// Route viewer input to the owning workstation.
    pub(crate) async fn route_input(
        &self,
        user: UserId,
        id: &SessionId,
        text: String,
    ) -> Result<(), String> {
        let owner = {
            let sessions = self.sessions.read().await;
            let Some(session) = sessions.get(id) else {
                return Err(format!("session not found: {id}"));
            };
            if session.user != user {
                return Err(format!("session not found: {id}"));
            }
            session.owner
        };

        let Some(owner) = owner else {
            self.end_session(user, id).await;
            return Err(format!("session gone: {id}"));
        };

        let delivered = {
            let connections = self.connections.read().await;
            connections.get(&owner).is_some_and(|conn| {
                Self::deliver(
                    owner,
                    conn,
                    &ServerFrame::SendInput {
                        session_id: id.clone(),
                        text,
                    },
                )
            })
        };

        if delivered {
            Ok(())
        } else {
            // The owning workstation is gone; the session is over.
            self.end_session(user, id).await;
            Err(format!("session gone: {id}"))
        }
    }

    pub(crate) async fn set_tracked(&self, user: UserId, id: &SessionId, on: bool) {
        let mut tracked = self.tracked.write().await;
        let entry = tracked.entry(user).or_default();
        if on {
            entry.insert(id.clone());
        } else {
            entry.remove(id);
        }
    }

    pub(crate) async fn register_push_token(&self, user: UserId, token: String) {
        let mut tokens = self.push_tokens.write().await;
        let entry = tokens.entry(user).or_default();
        if !entry.contains(&token) {
            entry.push(token);
        }
    }

    /// Enqueue a frame on one connection (request replies).
    pub(crate) async fn reply(&self, conn_id: ConnId, frame: ServerFrame) {
        let connections = self.connections.read().await;
        if let Some(conn) = connections.get(&conn_id) {
            Self::deliver(conn_id, conn, &frame);
        }
    }

    // ---- counters (health) ----

    /// Connection counts as (workstations, viewers).
    pub async fn connection_counts(&self) -> (usize, usize) {
        let connections = self.connections.read().await;
        let workstations = connections
            .values()
            .filter(|c| c.role == ConnectionRole::Workstation)
            .count();
        (workstations, connections.len().saturating_sub(workstations))
    }

    /// Number of tracked sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    // ---- internals ----

    /// Look up a session, enforcing workstation ownership by user.
    fn owned_session<'a>(
        sessions: &'a mut HashMap<SessionId, TrackedSession>,
        user: UserId,
        id: &SessionId,
    ) -> Option<&'a mut TrackedSession> {
        match sessions.get_mut(id) {
            Some(session) if session.user == user => Some(session),
            Some(_) => {
                warn!(session = %id, "frame for session of another user, dropped");
                None
            },
            None => {
                debug!(session = %id, "frame for unknown session, dropped");
                None
            },
        }
    }

    /// Forward a frame to all subscribers of a session.
    async fn forward_to_subscribers(&self, session: &TrackedSession, frame: &ServerFrame) {
        let connections = self.connections.read().await;
        for conn_id in &session.subscribers {
            if let Some(conn) = connections.get(conn_id) {
                Self::deliver(*conn_id, conn, frame);
            }
        }
    }

    /// Enqueue a frame on a connection; a full queue drops the
    /// connection (back-pressure rule). Returns delivery success.
    fn deliver(conn_id: ConnId, conn: &ConnectionHandle, frame: &ServerFrame) -> bool {
        match conn.outbound.try_send(frame.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(conn = conn_id, "outbound queue full, dropping connection");
                conn.cancel.cancel();
                false
            },
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Send the authoritative session list to every viewer of a user.
    pub(crate) async fn broadcast_sessions_list(&self, user: UserId) {
        let sessions = self.sessions_snapshot(user).await;
        let frame = ServerFrame::SessionsList { sessions };
        let connections = self.connections.read().await;
        for (conn_id, conn) in connections.iter() {
            if conn.user == user && conn.role == ConnectionRole::Viewer {
                Self::deliver(*conn_id, conn, &frame);
            }
        }
    }

    /// Fire-and-forget pushes for a tracked session.
    async fn push_if_tracked(&self, user: UserId, id: &SessionId, name: &str, title: &str, verb: &str) {
        let is_tracked = self
            .tracked
            .read()
            .await
            .get(&user)
            .is_some_and(|set| set.contains(id));
        if !is_tracked {
            return;
        }

        let notification = PushNotification {
            title: title.to_string(),
            body: format!("{name} {verb}"),
        };
        let tokens = self
            .push_tokens
            .read()
            .await
            .get(&user)
            .cloned()
            .unwrap_or_default();
        for token in tokens {
            let push = Arc::clone(&self.push);
            let notification = notification.clone();
            tokio::spawn(async move {
                push.send(&token, &notification).await;
            });
        }
    }
}
