use crate::commit::CommitReport;
use crate::coordinator::{ConversationRuntime, RuntimeError};
use crate::session::SessionStoreError;
use crate::web_ui;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use membot_core::SessionKey;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::future::Future;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error, info, warn};

const DEFAULT_MEMORY_LIMIT: usize = 10;
const CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

/// Application state shared with all routes
#[derive(Clone)]
pub struct AppState {
    runtime: Arc<ConversationRuntime>,
    default_user_id: String,
}

impl AppState {
    pub fn new(runtime: Arc<ConversationRuntime>, default_user_id: impl Into<String>) -> Self {
        Self {
            runtime,
            default_user_id: default_user_id.into(),
        }
    }

    fn user_or_default(&self, user_id: Option<String>) -> String {
        user_id
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| self.default_user_id.clone())
    }
}

/// Request model for chat messages
#[derive(Deserialize)]
pub struct ChatRequest {
    message: String,
    user_id: Option<String>,
}

/// Response model for chat messages
#[derive(Serialize, Deserialize, Debug)]
pub struct ChatResponse {
    pub success: bool,
    pub response: String,
    pub session_id: String,
    pub user_id: String,
    pub memories_used: usize,
    pub timestamp: DateTime<Utc>,
}

/// Body of the session management routes
#[derive(Deserialize, Default)]
pub struct UserRequest {
    user_id: Option<String>,
}

#[derive(Deserialize)]
pub struct MemoryQuery {
    q: Option<String>,
    limit: Option<usize>,
}

/// Error type for HTTP server
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Runtime(RuntimeError),
}

impl From<RuntimeError> for ApiError {
    fn from(e: RuntimeError) -> Self {
        match e {
            RuntimeError::Session(SessionStoreError::NotFound(what)) => {
                ApiError::NotFound(format!("Session not found: {}", what))
            }
            RuntimeError::NoActiveSession(_) => ApiError::BadRequest(e.to_string()),
            other => ApiError::Runtime(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            Self::NotFound(message) => (StatusCode::NOT_FOUND, message),
            Self::Runtime(e) => {
                error!(error = %e, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        };
        (status, Json(json!({ "success": false, "error": message }))).into_response()
    }
}

/// Builds the router. `with_ui` also serves the chat page at `/`.
pub fn router(state: AppState, with_ui: bool) -> Router {
    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut app = Router::new()
        .route("/health", get(health))
        .route("/chat", post(handle_chat))
        .route("/new_session", post(handle_new_session))
        .route("/save_memory", post(handle_save_memory))
        .route("/session/:user_id", get(handle_session_info))
        .route("/memories/:user_id", get(handle_memories));
    if with_ui {
        app = app.route("/", get(index));
    } else {
        app = app.route("/", get(health));
    }

    app.layer(cors).with_state(state)
}

/// Serves `app` on an already bound listener until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    listener.set_nonblocking(true)?;
    axum::Server::from_tcp(listener)
        .map_err(|e| anyhow::anyhow!("Failed to use listener: {}", e))?
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| anyhow::anyhow!("HTTP server failed: {}", e))
}

/// Runs `app` until `shutdown` resolves, then ends every current session and
/// waits for the resulting memory commits.
///
/// Expired sessions are cleaned from the store every `CLEANUP_INTERVAL` while serving.
pub async fn serve_until_shutdown<F>(
    runtime: Arc<ConversationRuntime>,
    listener: TcpListener,
    app: Router,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let cleanup = tokio::spawn(cleanup_loop(runtime.clone()));
    let served = serve(listener, app, shutdown).await;
    cleanup.abort();

    runtime.end_all_sessions().await;
    info!("Waiting for pending memory commits");
    runtime.drain_commits().await;
    served
}

async fn cleanup_loop(runtime: Arc<ConversationRuntime>) {
    let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        match runtime.cleanup_expired_sessions().await {
            Ok(0) => {}
            Ok(count) => debug!(count, "Cleaned up expired sessions"),
            Err(e) => warn!(error = %e, "Session cleanup failed"),
        }
    }
}

/// Start the HTTP server and run it until Ctrl-C
pub async fn run_server(
    runtime: Arc<ConversationRuntime>,
    default_user_id: String,
    addr: SocketAddr,
    with_ui: bool,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .map_err(|e| anyhow::anyhow!("Failed to bind {}: {}", addr, e))?;
    info!(%addr, with_ui, "Starting HTTP server");

    let app = router(AppState::new(runtime.clone(), default_user_id), with_ui);
    serve_until_shutdown(runtime, listener, app, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for shutdown signal");
            return;
        }
        info!("Shutdown signal received");
    })
    .await
}

async fn index() -> Html<&'static str> {
    Html(web_ui::INDEX_HTML)
}

/// Health check handler
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "app_name": state.runtime.app_name(),
        "memory": state.runtime.has_memory(),
        "timestamp": Utc::now(),
    }))
}

/// Handler for chat messages
async fn handle_chat(
    State(state): State<AppState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let message = payload.message.trim();
    if message.is_empty() {
        return Err(ApiError::BadRequest("Message cannot be empty".to_string()));
    }
    let user_id = state.user_or_default(payload.user_id);

    let reply = state.runtime.chat(&user_id, message).await?;
    Ok(Json(ChatResponse {
        success: true,
        response: reply.reply,
        session_id: reply.key.session_id,
        user_id,
        memories_used: reply.memories_used,
        timestamp: reply.timestamp,
    }))
}

async fn handle_new_session(
    State(state): State<AppState>,
    payload: Option<Json<UserRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = state.user_or_default(payload.and_then(|Json(p)| p.user_id));
    let key = state.runtime.new_session(&user_id).await?;
    Ok(Json(json!({
        "success": true,
        "session_id": key.session_id,
        "user_id": user_id,
        "message": "New session created",
    })))
}

async fn handle_save_memory(
    State(state): State<AppState>,
    payload: Option<Json<UserRequest>>,
) -> Result<Response, ApiError> {
    let user_id = state.user_or_default(payload.and_then(|Json(p)| p.user_id));
    let report = state.runtime.save_current(&user_id).await?;

    let response = match report {
        CommitReport::Ingested(receipt) => Json(json!({
            "success": true,
            "message": "Session saved to memory",
            "turns": receipt.turns,
        }))
        .into_response(),
        CommitReport::Skipped(reason) => Json(json!({
            "success": true,
            "message": format!("Nothing to save: {}", reason),
        }))
        .into_response(),
        CommitReport::Failed(error) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "success": false, "error": error })),
        )
            .into_response(),
    };
    Ok(response)
}

async fn handle_session_info(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let key: SessionKey = state
        .runtime
        .current_session(&user_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("No active session for user {}", user_id)))?;
    let session = state.runtime.session_info(&key).await?;

    let turns: Vec<_> = session
        .turns
        .iter()
        .map(|t| {
            json!({
                "role": t.role,
                "author": t.author,
                "text": t.text(),
                "timestamp": t.timestamp,
            })
        })
        .collect();
    Ok(Json(json!({
        "user_id": user_id,
        "session_id": session.key.session_id,
        "state": session.state,
        "turn_count": session.turns.len(),
        "turns": turns,
        "created_at": session.created_at,
    })))
}

async fn handle_memories(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<MemoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let q = query.q.unwrap_or_default();
    let limit = query.limit.unwrap_or(DEFAULT_MEMORY_LIMIT);
    let memories = state.runtime.search_memories(&user_id, &q, limit).await?;
    Ok(Json(json!({
        "user_id": user_id,
        "query": q,
        "count": memories.len(),
        "memories": memories,
    })))
}
