//! WebSocket gateway: the server surface of the chat session protocol.
//!
//! `/chat/ws/{token}` upgrades into a chat session; a small `/api/*`
//! surface exposes knowledge-base status and health.

pub mod connection;
pub mod error;
pub mod history;
pub mod prompt;
pub mod protocol;
pub mod registry;
pub mod sweeper;

pub use connection::{ChatDeps, ChatSettings};
pub use error::ChatError;
pub use protocol::ServerEvent;
pub use registry::{ConnectionHandle, ConnectionId, ConnectionRegistry};

use anyhow::{Context, Result};
use axum::{
    extract::{Path, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::info;

use crate::config::Config;
use crate::retrieval::Retrieval as _;

const MAX_BODY_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub deps: Arc<ChatDeps>,
}

/// Build the gateway router over an already-assembled dependency set.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/chat/ws/{token}", get(handle_chat_ws))
        .route("/api/knowledge-base/status", get(handle_kb_status))
        .route("/api/health", get(handle_health))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

/// GET /chat/ws/{token} — upgrade into a chat session.
///
/// The token is only carried here; it is verified during the in-protocol
/// handshake so failures surface as `error` events instead of HTTP statuses.
async fn handle_chat_ws(
    State(state): State<AppState>,
    Path(token): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection::handle_socket(socket, token, state.deps))
}

/// GET /api/knowledge-base/status — chunk and document counts.
async fn handle_kb_status(State(state): State<AppState>) -> impl IntoResponse {
    match state.deps.retrieval.status().await {
        Ok(status) => Json(serde_json::json!({
            "knowledge_base": state.deps.settings.knowledge_base_key,
            "status": status,
        }))
        .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": format!("Knowledge base status failed: {e}")})),
        )
            .into_response(),
    }
}

/// GET /api/health — liveness plus the current connection count.
async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    let connections = state
        .deps
        .registry
        .count(&state.deps.settings.knowledge_base_key);
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "active_connections": connections,
    }))
}

/// Assemble dependencies from config and run the gateway until shutdown.
pub async fn run_gateway(host: &str, port: u16, config: Config) -> Result<()> {
    let db_path = config.database_path();

    let deps = Arc::new(ChatDeps {
        auth: Arc::from(crate::auth::create_authenticator(&config.auth)),
        sessions: Arc::from(crate::sessions::create_session_store(&db_path)?),
        retrieval: Arc::from(crate::retrieval::create_retrieval(&db_path)?),
        generator: Arc::from(crate::providers::create_generator(&config.provider)),
        registry: Arc::new(ConnectionRegistry::new()),
        settings: ChatSettings::from_config(&config.chat),
    });

    tokio::spawn(sweeper::run(
        Arc::clone(&deps.registry),
        deps.settings.knowledge_base_key.clone(),
        deps.settings.heartbeat_interval,
    ));

    let app = router(AppState { deps });

    let listener = tokio::net::TcpListener::bind((host, port))
        .await
        .with_context(|| format!("Failed to bind gateway to {host}:{port}"))?;
    let addr = listener.local_addr()?;
    info!(%addr, "Gateway listening");

    axum::serve(listener, app)
        .await
        .context("Gateway server error")?;
    Ok(())
}
