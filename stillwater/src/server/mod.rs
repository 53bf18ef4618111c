//! REST layer over the document store.
//!
//! Endpoints:
//! - POST /api/drafts - Create a draft
//! - GET /api/drafts/{id} - Read a draft (owner only)
//! - PUT /api/drafts/{id} - Partially update a draft (owner only)
//! - DELETE /api/drafts/{id} - Delete a draft (owner only)
//! - POST /api/sessions - Create a session
//! - GET /api/sessions/{id} - Read a session (unpublished: owner only)
//! - PUT /api/sessions/{id} - Partially update a session (owner only)
//! - DELETE /api/sessions/{id} - Delete a session (owner only)
//! - WS /ws - Live feed of the caller's store events
//!
//! The caller is identified by the `x-owner-id` header, set by the
//! authentication layer in front of this service.

use std::convert::Infallible;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        FromRequestParts, OptionalFromRequestParts, Path, State, WebSocketUpgrade,
    },
    http::{header::CONTENT_TYPE, request::Parts, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast::{self, error::RecvError};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::db::{Database, Store};
use crate::error::Error;
use crate::models::{Draft, DraftFields, DraftPatch, NewSession, OwnerId, Session, SessionPatch};

/// Header carrying the authenticated caller.
pub const OWNER_HEADER: &str = "x-owner-id";

const EVENT_BUFFER: usize = 1000;

/// Shared server state.
pub struct ServerState {
    store: Store,
    /// Broadcast channel for live updates.
    tx: broadcast::Sender<StoreEvent>,
}

/// Change notification pushed to websocket clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StoreEvent {
    DraftSaved {
        owner_id: OwnerId,
        draft_id: String,
        last_saved_at: Option<DateTime<Utc>>,
    },
    DraftDeleted {
        owner_id: OwnerId,
        draft_id: String,
    },
    SessionPublished {
        owner_id: OwnerId,
        session_id: String,
        title: String,
    },
}

impl StoreEvent {
    pub const fn owner_id(&self) -> &OwnerId {
        match self {
            Self::DraftSaved { owner_id, .. }
            | Self::DraftDeleted { owner_id, .. }
            | Self::SessionPublished { owner_id, .. } => owner_id,
        }
    }

    fn draft_saved(draft: &Draft) -> Option<Self> {
        Some(Self::DraftSaved {
            owner_id: draft.owner_id.clone(),
            draft_id: draft.id.clone()?,
            last_saved_at: draft.last_saved_at,
        })
    }

    fn session_published(session: &Session) -> Self {
        Self::SessionPublished {
            owner_id: session.owner_id.clone(),
            session_id: session.id.clone(),
            title: session.fields.title.clone(),
        }
    }
}

impl ServerState {
    fn notify(&self, event: StoreEvent) {
        // No subscribers is fine.
        let _ = self.tx.send(event);
    }
}

/// The authenticated caller, read from [`OWNER_HEADER`].
pub struct Owner(pub OwnerId);

fn owner_from(parts: &Parts) -> Option<Owner> {
    let value = parts.headers.get(OWNER_HEADER)?.to_str().ok()?.trim();
    (!value.is_empty()).then(|| Owner(OwnerId::new(value)))
}

impl<S: Send + Sync> FromRequestParts<S> for Owner {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        owner_from(parts).ok_or_else(|| Error::unauthorized("api", "anonymous"))
    }
}

impl<S: Send + Sync> OptionalFromRequestParts<S> for Owner {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(owner_from(parts))
    }
}

type ApiResult<T> = crate::error::Result<T>;

// === Server Lifecycle ===

/// Build the application router over `store`.
pub fn router(store: Store) -> Router {
    let (tx, _rx) = broadcast::channel(EVENT_BUFFER);
    let state = Arc::new(ServerState { store, tx });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, HeaderName::from_static(OWNER_HEADER)]);

    Router::new()
        .route("/api/drafts", post(create_draft))
        .route(
            "/api/drafts/{id}",
            get(get_draft).put(update_draft).delete(delete_draft),
        )
        .route("/api/sessions", post(create_session))
        .route(
            "/api/sessions/{id}",
            get(get_session).put(update_session).delete(delete_session),
        )
        .route("/ws", get(websocket_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the server and run until interrupted.
pub async fn start_server(config: &ServerConfig) -> Result<()> {
    let db = Database::open_at(&config.db_path)?;
    let app = router(Store::new(db));

    let listener = TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.addr))?;
    info!(addr = %config.addr, db = %config.db_path.display(), "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown requested");
}

// === Handlers ===

async fn create_draft(
    State(state): State<Arc<ServerState>>,
    Owner(owner): Owner,
    Json(fields): Json<DraftFields>,
) -> ApiResult<impl IntoResponse> {
    let draft = state.store.insert_draft(&owner, &fields).await?;
    if let Some(event) = StoreEvent::draft_saved(&draft) {
        state.notify(event);
    }
    Ok((StatusCode::CREATED, Json(draft)))
}

async fn get_draft(
    State(state): State<Arc<ServerState>>,
    Owner(owner): Owner,
    Path(id): Path<String>,
) -> ApiResult<Json<Draft>> {
    Ok(Json(state.store.fetch_draft(&id, &owner).await?))
}

async fn update_draft(
    State(state): State<Arc<ServerState>>,
    Owner(owner): Owner,
    Path(id): Path<String>,
    Json(patch): Json<DraftPatch>,
) -> ApiResult<Json<Draft>> {
    let draft = state.store.patch_draft(&id, &owner, &patch).await?;
    if let Some(event) = StoreEvent::draft_saved(&draft) {
        state.notify(event);
    }
    Ok(Json(draft))
}

async fn delete_draft(
    State(state): State<Arc<ServerState>>,
    Owner(owner): Owner,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.store.remove_draft(&id, &owner).await?;
    state.notify(StoreEvent::DraftDeleted {
        owner_id: owner,
        draft_id: id,
    });
    Ok(StatusCode::NO_CONTENT)
}

async fn create_session(
    State(state): State<Arc<ServerState>>,
    Owner(owner): Owner,
    Json(session): Json<NewSession>,
) -> ApiResult<impl IntoResponse> {
    let session = state.store.insert_session(&owner, &session).await?;
    if session.published {
        state.notify(StoreEvent::session_published(&session));
    }
    Ok((StatusCode::CREATED, Json(session)))
}

async fn get_session(
    State(state): State<Arc<ServerState>>,
    viewer: Option<Owner>,
    Path(id): Path<String>,
) -> ApiResult<Json<Session>> {
    let viewer = viewer.map(|Owner(id)| id);
    Ok(Json(state.store.fetch_session(&id, viewer.as_ref()).await?))
}

async fn update_session(
    State(state): State<Arc<ServerState>>,
    Owner(owner): Owner,
    Path(id): Path<String>,
    Json(patch): Json<SessionPatch>,
) -> ApiResult<Json<Session>> {
    let publishing = patch.published == Some(true);
    let session = state.store.patch_session(&id, &owner, patch).await?;
    if publishing {
        state.notify(StoreEvent::session_published(&session));
    }
    Ok(Json(session))
}

async fn delete_session(
    State(state): State<Arc<ServerState>>,
    Owner(owner): Owner,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.store.remove_session(&id, &owner).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn websocket_handler(
    ws: WebSocketUpgrade,
    Owner(owner): Owner,
    State(state): State<Arc<ServerState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state, owner))
}

async fn handle_websocket(mut socket: WebSocket, state: Arc<ServerState>, owner: OwnerId) {
    let mut rx = state.tx.subscribe();
    debug!(owner = %owner, "websocket subscribed");

    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(owner = %owner, skipped, "websocket client lagging");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        if event.owner_id() != &owner {
            continue;
        }
        if let Ok(json) = serde_json::to_string(&event) {
            if socket.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    }
    debug!(owner = %owner, "websocket closed");
}

/// Serve `store` on an ephemeral local port and return the base URL.
#[cfg(test)]
pub(crate) async fn spawn_local(store: Store) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router(store)).await.unwrap() });
    format!("http://{addr}")
}
