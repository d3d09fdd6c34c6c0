//! HTTP surface and WebSocket admission paths.
//!
//! Two upgrade endpoints (`/ws/workstation`, `/ws/viewer`), a health
//! endpoint, and the device-code pairing flow. All handler state is
//! explicitly owned by [`RelayState`] and injected through axum's
//! `State` extractor.

use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::auth::{ConnectionRole, CredentialStore, Principal};
use crate::connection::serve_socket;
use crate::error::{RelayError, RelayResult};
use crate::pairing::{ClaimOutcome, PAIRING_TTL, PairingStore, VerifyOutcome};
use crate::push::PushGateway;
use crate::registry::Registry;

/// Shared state of one relay process.
pub struct RelayState {
    /// The connection/session registry.
    pub registry: Registry,
    pub(crate) credentials: Arc<dyn CredentialStore>,
    pub(crate) pairing: PairingStore,
    started_at: Instant,
    verification_base_url: String,
}

impl RelayState {
    /// Assemble relay state from its collaborators.
    #[must_use]
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        push: Arc<dyn PushGateway>,
        verification_base_url: impl Into<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry: Registry::new(push),
            credentials,
            pairing: PairingStore::new(),
            started_at: Instant::now(),
            verification_base_url: verification_base_url.into(),
        })
    }
}

/// Build the relay router.
#[must_use]
pub fn router(state: Arc<RelayState>) -> axum::Router {
    axum::Router::new()
        .route("/health", get(health))
        .route("/pair", post(pair_begin))
        .route("/pair/{code}", get(pair_poll))
        .route("/pair/verify", post(pair_verify))
        .route("/devices", post(register_device))
        .route("/ws/workstation", get(ws_workstation))
        .route("/ws/viewer", get(ws_viewer))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(addr: &str, state: Arc<RelayState>) -> RelayResult<()> {
    let listener = TcpListener::bind(addr).await.map_err(|source| RelayError::Bind {
        addr: addr.to_string(),
        source,
    })?;
    serve_on(listener, state).await
}

/// Serve on an already bound listener (lets tests bind port 0).
pub async fn serve_on(listener: TcpListener, state: Arc<RelayState>) -> RelayResult<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "relay listening");
    }
    axum::serve(listener, router(state))
        .await
        .map_err(RelayError::Serve)
}

// ---- handlers ----

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    workstation_connections: usize,
    viewer_connections: usize,
    sessions: usize,
    pending_pairings: usize,
}

async fn health(State(state): State<Arc<RelayState>>) -> Json<HealthResponse> {
    let (workstations, viewers) = state.registry.connection_counts().await;
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.started_at.elapsed().as_secs(),
        workstation_connections: workstations,
        viewer_connections: viewers,
        sessions: state.registry.session_count().await,
        pending_pairings: state.pairing.len().await,
    })
}

#[derive(Debug, Serialize)]
struct PairBeginResponse {
    code: String,
    verification_url: String,
    expires_in: u64,
}

async fn pair_begin(State(state): State<Arc<RelayState>>) -> Json<PairBeginResponse> {
    let code = state.pairing.begin().await;
    let verification_url = format!("{}/pair/verify?code={code}", state.verification_base_url);
    Json(PairBeginResponse {
        code,
        verification_url,
        expires_in: PAIRING_TTL.as_secs(),
    })
}

async fn pair_poll(State(state): State<Arc<RelayState>>, Path(code): Path<String>) -> Response {
    match state.pairing.claim(&code).await {
        ClaimOutcome::Ready(token) => (StatusCode::OK, Json(json!({ "token": token }))).into_response(),
        ClaimOutcome::Pending => {
            (StatusCode::ACCEPTED, Json(json!({ "status": "pending" }))).into_response()
        },
        ClaimOutcome::Gone => (StatusCode::GONE, Json(json!({ "status": "gone" }))).into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct PairVerifyRequest {
    code: String,
}

async fn pair_verify(
    State(state): State<Arc<RelayState>>,
    headers: HeaderMap,
    Json(request): Json<PairVerifyRequest>,
) -> Response {
    let Some(principal) = bearer_principal(&state, &headers).await else {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "invalid token" })))
            .into_response();
    };
    if principal.role != ConnectionRole::Viewer {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "pairing requires a viewer credential" })),
        )
            .into_response();
    }

    // Bind a fresh workstation credential of the verifying user to the
    // code. On a dead code the credential is never handed out.
    let issued = state
        .credentials
        .issue(principal.user_id, ConnectionRole::Workstation)
        .await;
    match state.pairing.verify(&request.code, issued.token).await {
        VerifyOutcome::Verified => {
            info!(code = %request.code, user = %principal.user_id, "pairing verified");
            (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response()
        },
        VerifyOutcome::AlreadyVerified => (
            StatusCode::CONFLICT,
            Json(json!({ "error": "code already verified" })),
        )
            .into_response(),
        VerifyOutcome::Gone => {
            (StatusCode::GONE, Json(json!({ "status": "gone" }))).into_response()
        },
    }
}

async fn register_device(State(state): State<Arc<RelayState>>, headers: HeaderMap) -> Response {
    let Some(principal) = bearer_principal(&state, &headers).await else {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "invalid token" })))
            .into_response();
    };
    let issued = state
        .credentials
        .issue(principal.user_id, ConnectionRole::Viewer)
        .await;
    (
        StatusCode::OK,
        Json(json!({ "token": issued.token, "deviceId": issued.device_id })),
    )
        .into_response()
}

async fn ws_workstation(
    State(state): State<Arc<RelayState>>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| serve_socket(socket, ConnectionRole::Workstation, state))
}

async fn ws_viewer(State(state): State<Arc<RelayState>>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| serve_socket(socket, ConnectionRole::Viewer, state))
}

/// Resolve the `Authorization: Bearer` header to a principal.
async fn bearer_principal(state: &RelayState, headers: &HeaderMap) -> Option<Principal> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?;
    let principal = state.credentials.verify(token).await;
    if principal.is_none() {
        debug!("bearer token rejected");
    }
    principal
}
