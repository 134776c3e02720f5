//! HTTP API for a browser frontend.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/process-repo` | Clone and ingest a repository URL |
//! | `POST` | `/chat` | Ask a question with caller-supplied history |
//! | `GET`  | `/file-content` | Read one file from a checkout |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_ingested", "message": "Repository 'octocat_hello-world' has not been processed yet." } }
//! ```
//!
//! Usage errors map to 4xx, dependency failures to 5xx, and timeouts to
//! 504, so a frontend can tell "fix your input" from "try again later".
//!
//! # CORS
//!
//! Only the configured frontend origin (`[server] cors_origin`, overridden
//! by `FRONTEND_URL`) is allowed.

use std::path::Path as FsPath;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::error::{AskError, FailureKind};
use crate::materialize::{checkout_dir, read_repo_file, FileAccessError, FileNode};
use crate::models::ConversationTurn;
use crate::pipeline::RepoChat;
use crate::repo_id::RepoId;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<RepoChat>,
}

/// Build the router without binding; used by [`run_server`] and tests.
pub fn router(state: AppState) -> anyhow::Result<Router> {
    let origin = cors_origin(&state.chat.config().server.cors_origin);
    let cors = CorsLayer::new()
        .allow_origin(origin.parse::<HeaderValue>()?)
        .allow_methods(Any)
        .allow_headers(Any);

    Ok(Router::new()
        .route("/process-repo", post(handle_process_repo))
        .route("/chat", post(handle_chat))
        .route("/file-content", get(handle_file_content))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state))
}

/// Bind `[server] bind` and serve until the process exits.
pub async fn run_server(chat: Arc<RepoChat>) -> anyhow::Result<()> {
    let bind_addr = chat.config().server.bind.clone();
    let app = router(AppState { chat: chat.clone() })?;

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("repochat listening on http://{}", bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    chat.shutdown().await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {e:#}");
        std::future::pending::<()>().await;
    }
    tracing::info!("received shutdown signal");
}

fn cors_origin(configured: &str) -> String {
    std::env::var("FRONTEND_URL").unwrap_or_else(|_| configured.to_string())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<AskError> for AppError {
    fn from(err: AskError) -> Self {
        let message = err.to_string();
        match &err {
            AskError::EmptyQuestion => AppError::bad_request(message),
            AskError::NotIngested(_) => {
                AppError::new(StatusCode::BAD_REQUEST, "not_ingested", message)
            }
            AskError::EmbeddingMismatch { .. } => {
                AppError::new(StatusCode::CONFLICT, "embedding_mismatch", message)
            }
            AskError::Timeout(_) => AppError::new(StatusCode::GATEWAY_TIMEOUT, "timeout", message),
            AskError::Embedding(_) | AskError::Storage(_) | AskError::Generation(_) => {
                AppError::new(StatusCode::BAD_GATEWAY, "dependency_error", message)
            }
        }
    }
}

impl From<FileAccessError> for AppError {
    fn from(err: FileAccessError) -> Self {
        let message = err.to_string();
        match err {
            FileAccessError::Escape => AppError::new(StatusCode::FORBIDDEN, "forbidden", message),
            FileAccessError::NotFound => AppError::new(StatusCode::NOT_FOUND, "not_found", message),
            FileAccessError::NotAFile | FileAccessError::Binary => AppError::bad_request(message),
            FileAccessError::Io(_) => {
                AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
            }
        }
    }
}

fn kind_error(kind: FailureKind, message: String) -> AppError {
    match kind {
        FailureKind::Usage => AppError::bad_request(message),
        FailureKind::Timeout => AppError::new(StatusCode::GATEWAY_TIMEOUT, "timeout", message),
        FailureKind::Dependency => {
            AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "ingest_failed", message)
        }
    }
}

fn parse_repo_name(name: &str) -> Result<RepoId, AppError> {
    RepoId::parse(name).map_err(|e| AppError::bad_request(e.to_string()))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /process-repo ============

#[derive(Deserialize)]
struct ProcessRepoRequest {
    url: String,
}

#[derive(Serialize)]
struct ProcessRepoResponse {
    message: String,
    file_tree: Vec<FileNode>,
    repo_name: String,
}

async fn handle_process_repo(
    State(state): State<AppState>,
    Json(req): Json<ProcessRepoRequest>,
) -> Result<Json<ProcessRepoResponse>, AppError> {
    let processed = state
        .chat
        .process_repository(req.url.trim())
        .await
        .map_err(|e| kind_error(e.kind(), e.to_string()))?;

    let outcome = processed.outcome;
    if !outcome.success {
        let kind = outcome.failure.unwrap_or(FailureKind::Dependency);
        return Err(kind_error(kind, outcome.message));
    }

    Ok(Json(ProcessRepoResponse {
        message: outcome.message,
        file_tree: processed.file_tree,
        repo_name: processed.id.to_string(),
    }))
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatRequest {
    repo_name: String,
    question: String,
    #[serde(default)]
    chat_history: Vec<(String, String)>,
}

#[derive(Serialize)]
struct ChatResponse {
    answer: String,
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let repo = parse_repo_name(&req.repo_name)?;
    let history: Vec<ConversationTurn> = req
        .chat_history
        .into_iter()
        .map(ConversationTurn::from)
        .collect();

    let answer = state.chat.ask(&repo, &req.question, &history).await?;
    Ok(Json(ChatResponse { answer }))
}

// ============ GET /file-content ============

#[derive(Deserialize)]
struct FileContentQuery {
    repo_name: String,
    file_path: String,
}

#[derive(Serialize)]
struct FileContentResponse {
    content: String,
    path: String,
    name: String,
}

async fn handle_file_content(
    State(state): State<AppState>,
    Query(query): Query<FileContentQuery>,
) -> Result<Json<FileContentResponse>, AppError> {
    let repo = parse_repo_name(&query.repo_name)?;
    let root = checkout_dir(&state.chat.config().repos, &repo);
    let content = read_repo_file(&root, &query.file_path)?;

    let name = FsPath::new(&query.file_path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(Json(FileContentResponse {
        content,
        path: query.file_path,
        name,
    }))
}
