//! HTTP API server.
//!
//! Exposes the generation pipeline to the notebook frontend.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/generate-chat-turn` | Streamed chat answer over the selected documents |
//! | `POST` | `/generate-flashcards` | Exactly 5 validated flashcards |
//! | `POST` | `/generate-mcq` | Exactly 5 validated multiple-choice questions |
//! | `POST` | `/chats` | Create a chat |
//! | `GET`  | `/chats/{id}/messages` | List a chat's messages, oldest first |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! Every error response is JSON of the form
//!
//! ```json
//! { "error": "human-readable summary", "details": "optional specifics" }
//! ```
//!
//! Malformed requests get 400, an unknown chat id gets 404, a blown
//! pipeline deadline gets 408, and upstream/model failures get 500 with the
//! failure in `details`. The chat stream itself is `text/plain`; errors
//! after streaming has begun terminate the body mid-stream.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted; the notebook frontend
//! runs on a different origin in development.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::chatlog;
use crate::config::Config;
use crate::generation::CompletionHook;
use crate::models::ChatMessage;
use crate::pipeline::{Pipeline, PipelineError};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
    pool: SqlitePool,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>, pool: SqlitePool) -> Self {
        Self { pipeline, pool }
    }
}

/// Starts the HTTP server.
///
/// Binds to the address configured in `[server].bind`, applies migrations,
/// and serves until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = crate::db::connect(config).await?;
    crate::migrate::run_migrations_on(&pool).await?;

    let pipeline = Arc::new(Pipeline::from_config(config)?);
    let app = build_router(AppState::new(pipeline, pool));

    let bind_addr = config.server.bind.clone();
    println!("Notebook engine listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the router; exposed so tests can serve it on an ephemeral port.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/generate-chat-turn", post(handle_chat_turn))
        .route("/generate-flashcards", post(handle_flashcards))
        .route("/generate-mcq", post(handle_mcq))
        .route("/chats", post(handle_create_chat))
        .route("/chats/{id}/messages", get(handle_list_messages))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    error: String,
    details: Option<String>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    timestamp: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.error,
            details: self.details,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        error: message.into(),
        details: None,
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        error: message.into(),
        details: None,
    }
}

fn timeout_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::REQUEST_TIMEOUT,
        error: message.into(),
        details: None,
    }
}

fn internal_error(summary: impl Into<String>, err: anyhow::Error) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        error: summary.into(),
        details: Some(format!("{:#}", err)),
    }
}

/// Map a pipeline failure to the most appropriate HTTP status.
///
/// Caller-fault conditions carry a typed [`PipelineError`]; everything else
/// is an upstream or internal failure.
fn classify_pipeline_error(summary: &str, err: anyhow::Error) -> AppError {
    if let Some(pipeline_err) = err.downcast_ref::<PipelineError>() {
        return bad_request(pipeline_err.to_string());
    }
    internal_error(summary, err)
}

// ============ Request parsing ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatTurnRequest {
    #[serde(default)]
    messages: Vec<ChatMessage>,
    #[serde(default)]
    file_key: Option<String>,
    #[serde(default)]
    file_keys: Option<Vec<String>>,
    /// Optional persistence target; `id` is accepted as an alias.
    #[serde(default, alias = "id")]
    chat_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArtifactRequest {
    #[serde(default)]
    file_key: Option<String>,
    #[serde(default)]
    file_keys: Option<Vec<String>>,
}

/// Parse a request body into `T`, turning shape errors into a 400 with the
/// serde failure in `details`.
fn parse_body<T: serde::de::DeserializeOwned>(body: serde_json::Value) -> Result<T, AppError> {
    serde_json::from_value(body).map_err(|e| AppError {
        status: StatusCode::BAD_REQUEST,
        error: "Malformed request body".to_string(),
        details: Some(e.to_string()),
    })
}

/// Merge `fileKey`/`fileKeys` into one non-empty key list.
fn resolve_keys(
    file_key: Option<String>,
    file_keys: Option<Vec<String>>,
) -> Result<Vec<String>, AppError> {
    let mut keys = file_keys.unwrap_or_default();
    if let Some(key) = file_key {
        keys.push(key);
    }
    keys.retain(|k| !k.trim().is_empty());
    if keys.is_empty() {
        return Err(bad_request("fileKey or fileKeys is required"));
    }
    Ok(keys)
}

fn validate_messages(messages: &[ChatMessage]) -> Result<(), AppError> {
    if messages.is_empty() {
        return Err(bad_request("messages must not be empty"));
    }
    for (i, m) in messages.iter().enumerate() {
        if m.role.trim().is_empty() || m.content.trim().is_empty() {
            return Err(bad_request(format!(
                "messages[{}] must have a non-empty role and content",
                i
            )));
        }
    }
    Ok(())
}

// ============ POST /generate-chat-turn ============

/// Streams the assistant answer as `text/plain` deltas.
///
/// When `chatId` is given it must name an existing chat: the latest user
/// message is persisted before streaming starts, and the assistant message
/// is persisted only after the stream completes in full.
async fn handle_chat_turn(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Result<Response, AppError> {
    let req: ChatTurnRequest = parse_body(body)?;
    validate_messages(&req.messages)?;
    let keys = resolve_keys(req.file_key, req.file_keys)?;

    let mut on_complete: Option<CompletionHook> = None;
    if let Some(chat_id) = req.chat_id {
        if !chatlog::chat_exists(&state.pool, &chat_id)
            .await
            .map_err(|e| internal_error("Chat lookup failed", e))?
        {
            return Err(not_found(format!("Chat not found: {}", chat_id)));
        }

        if let Some(user_msg) = req.messages.iter().rev().find(|m| m.role == "user") {
            chatlog::append_message(&state.pool, &chat_id, "user", &user_msg.content)
                .await
                .map_err(|e| internal_error("Failed to persist user message", e))?;
        }

        let pool = state.pool.clone();
        on_complete = Some(Box::new(move |full: String| {
            tokio::spawn(async move {
                if let Err(e) = chatlog::append_message(&pool, &chat_id, "assistant", &full).await {
                    eprintln!("Warning: failed to persist assistant message: {:#}", e);
                }
            });
        }));
    }

    // The deadline covers ingestion, retrieval, and the first byte of the
    // completion; an open stream is not cut off mid-answer.
    let stream = tokio::time::timeout(
        state.pipeline.deadline(),
        state.pipeline.chat_turn(&keys, &req.messages, on_complete),
    )
    .await
    .map_err(|_| {
        timeout_error(format!(
            "Chat turn timed out after {}s",
            state.pipeline.deadline().as_secs()
        ))
    })?
    .map_err(|e| classify_pipeline_error("Chat turn failed", e))?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(stream),
    )
        .into_response())
}

// ============ POST /generate-flashcards ============

/// Returns a top-level JSON array of exactly 5 flashcards.
async fn handle_flashcards(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Result<Response, AppError> {
    let req: ArtifactRequest = parse_body(body)?;
    let keys = resolve_keys(req.file_key, req.file_keys)?;

    let cards = tokio::time::timeout(state.pipeline.deadline(), state.pipeline.build_flashcards(&keys))
        .await
        .map_err(|_| {
            timeout_error(format!(
                "Flashcard generation timed out after {}s",
                state.pipeline.deadline().as_secs()
            ))
        })?
        .map_err(|e| classify_pipeline_error("Flashcard generation failed", e))?;

    Ok(Json(cards).into_response())
}

// ============ POST /generate-mcq ============

/// Returns `{"questions": [...]}` with exactly 5 validated questions.
async fn handle_mcq(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Result<Response, AppError> {
    let req: ArtifactRequest = parse_body(body)?;
    let keys = resolve_keys(req.file_key, req.file_keys)?;

    let questions = tokio::time::timeout(state.pipeline.deadline(), state.pipeline.build_mcq(&keys))
        .await
        .map_err(|_| {
            timeout_error(format!(
                "MCQ generation timed out after {}s",
                state.pipeline.deadline().as_secs()
            ))
        })?
        .map_err(|e| classify_pipeline_error("MCQ generation failed", e))?;

    Ok(Json(serde_json::json!({ "questions": questions })).into_response())
}

// ============ Chat management ============

#[derive(Deserialize, Default)]
struct CreateChatRequest {
    #[serde(default)]
    title: Option<String>,
}

async fn handle_create_chat(
    State(state): State<AppState>,
    body: Option<Json<serde_json::Value>>,
) -> Result<Response, AppError> {
    let req: CreateChatRequest = match body {
        Some(Json(value)) => parse_body(value)?,
        None => CreateChatRequest::default(),
    };

    let id = chatlog::create_chat(&state.pool, req.title.as_deref())
        .await
        .map_err(|e| internal_error("Failed to create chat", e))?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({ "id": id }))).into_response())
}

async fn handle_list_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    if !chatlog::chat_exists(&state.pool, &id)
        .await
        .map_err(|e| internal_error("Chat lookup failed", e))?
    {
        return Err(not_found(format!("Chat not found: {}", id)));
    }

    let messages = chatlog::list_messages(&state.pool, &id)
        .await
        .map_err(|e| internal_error("Failed to list messages", e))?;

    Ok(Json(messages).into_response())
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
