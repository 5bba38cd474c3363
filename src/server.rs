//! HTTP API for document management and chat.
//!
//! # Endpoints
//!
//! | Method   | Path                 | Description |
//! |----------|----------------------|-------------|
//! | `POST`   | `/documents`         | Upload files (multipart), ingest into the index |
//! | `GET`    | `/documents`         | List registered documents |
//! | `DELETE` | `/documents/{hash}`  | Remove a document, its stored copies and index rows |
//! | `POST`   | `/chat`              | Answer a question with retrieval context |
//! | `POST`   | `/chat-with-media`   | Answer a question about attached files |
//! | `GET`    | `/health`            | Health check (returns version) |
//!
//! # Error Contract
//!
//! All error responses share one schema:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `provider_error` (502),
//! `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::db;
use crate::extract::describe_file;
use crate::index;
use crate::ingest::{upload_batch, UploadReport};
use crate::models::{RegistryEntry, RetrievedSnippet};
use crate::provider::ProviderError;
use crate::registry::{DeleteError, DocumentRegistry};
use crate::retrieve;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    pool: SqlitePool,
    registry: Arc<DocumentRegistry>,
}

/// Starts the HTTP server on the address from `[server].bind`.
///
/// Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let pool = db::connect(config).await?;
    db::run_migrations(&pool).await?;

    let state = AppState {
        registry: Arc::new(DocumentRegistry::new(&config.storage)),
        config: Arc::new(config.clone()),
        pool,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Leave headroom above the per-file limit for multipart framing and
    // multiple files per request.
    let body_limit = (state.config.upload.max_bytes() as usize).saturating_mul(4);

    let app = Router::new()
        .route("/documents", post(handle_upload).get(handle_list))
        .route("/documents/{hash}", delete(handle_delete))
        .route("/chat", post(handle_chat))
        .route("/chat-with-media", post(handle_chat_with_media))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(state);

    log::info!("listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
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

/// Internal error type that converts into an HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn provider_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_GATEWAY,
        code: "provider_error".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

/// Maps pipeline errors to HTTP errors by downcasting to [`ProviderError`].
/// A disabled provider is a deliberate deployment choice the caller should
/// see as a 400; a missing API key is a server misconfiguration (500);
/// upstream API and network failures surface as 502.
fn classify_pipeline_error(err: anyhow::Error) -> AppError {
    match err.downcast_ref::<ProviderError>() {
        Some(ProviderError::Disabled) => bad_request(format!("{:#}", err)),
        Some(ProviderError::MissingKey) => internal(format!("{:#}", err)),
        Some(ProviderError::Api(_)) | Some(ProviderError::Network(_)) => {
            provider_error(format!("{:#}", err))
        }
        None => internal(format!("{:#}", err)),
    }
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

// ============ POST /documents ============

/// Handler for `POST /documents`.
///
/// Accepts one or more files as multipart parts and runs the full
/// register → store → ingest pipeline per file. Per-file failures are
/// reported in the response, never as an HTTP error, so a mixed batch
/// always returns its counters.
async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadReport>, AppError> {
    let mut files: Vec<(String, Vec<u8>)> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {}", e)))?
    {
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(format!("failed to read part {}: {}", filename, e)))?;
        files.push((filename, bytes.to_vec()));
    }

    if files.is_empty() {
        return Err(bad_request("no files in request"));
    }

    let report = upload_batch(&state.config, &state.pool, &state.registry, files)
        .await
        .map_err(|e| internal(format!("{:#}", e)))?;

    Ok(Json(report))
}

// ============ GET /documents ============

#[derive(Serialize)]
struct DocumentListResponse {
    documents: Vec<RegistryEntry>,
    total: usize,
}

async fn handle_list(State(state): State<AppState>) -> Result<Json<DocumentListResponse>, AppError> {
    let documents = state
        .registry
        .list()
        .map_err(|e| internal(format!("{:#}", e)))?;
    let total = documents.len();
    Ok(Json(DocumentListResponse { documents, total }))
}

// ============ DELETE /documents/{hash} ============

#[derive(Serialize)]
struct DeleteResponse {
    deleted: String,
    removed_files: Vec<String>,
    removed_chunks: u64,
}

/// Handler for `DELETE /documents/{hash}`.
///
/// Removes the registry entry, both stored copies, and the document's rows
/// in the vector index. Missing files on disk are tolerated; an unknown
/// hash is a 404.
async fn handle_delete(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    let report = state.registry.delete(&hash).map_err(|e| match e {
        DeleteError::NotFound => not_found(format!("no document with hash {}", hash)),
        DeleteError::Io(e) => internal(format!("{:#}", e)),
    })?;

    let removed_chunks = index::remove_source(&state.pool, &report.filename)
        .await
        .map_err(|e| internal(format!("{:#}", e)))?;

    Ok(Json(DeleteResponse {
        deleted: report.filename,
        removed_files: report.deleted_files,
        removed_chunks,
    }))
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatRequest {
    query: String,
}

#[derive(Serialize)]
struct ChatResponse {
    query: String,
    answer: String,
    sources: Vec<RetrievedSnippet>,
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }

    let sources = retrieve::retrieve(&state.config, &state.pool, &req.query)
        .await
        .map_err(classify_pipeline_error)?;

    let messages = crate::prompt::build_messages(
        &state.config.prompt.language,
        &req.query,
        &sources,
        "",
    );
    let answer = crate::provider::chat(&state.config.provider, &messages, 1024, 0.2)
        .await
        .map_err(classify_pipeline_error)?;

    Ok(Json(ChatResponse {
        query: req.query,
        answer,
        sources,
    }))
}

// ============ POST /chat-with-media ============

/// Handler for `POST /chat-with-media`.
///
/// Multipart request with a `query` text field and any number of file
/// parts. Files are turned into labeled context parts (transcribed,
/// described, or extracted by kind); when any file context is present the
/// index is not consulted at all.
async fn handle_chat_with_media(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ChatResponse>, AppError> {
    let mut query = String::new();
    let mut parts: Vec<String> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {}", e)))?
    {
        match field.file_name().map(str::to_string) {
            Some(filename) => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(format!("failed to read part {}: {}", filename, e)))?;
                parts.push(describe_file(&state.config, &filename, bytes.to_vec()).await);
            }
            None if field.name() == Some("query") => {
                query = field
                    .text()
                    .await
                    .map_err(|e| bad_request(format!("failed to read query: {}", e)))?;
            }
            None => {}
        }
    }

    if query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }

    let file_context = parts.join("\n---\n");

    let answer = retrieve::answer(&state.config, &state.pool, &query, &file_context)
        .await
        .map_err(classify_pipeline_error)?;

    Ok(Json(ChatResponse {
        query,
        answer,
        sources: Vec::new(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_provider_maps_to_bad_request() {
        let e = classify_pipeline_error(ProviderError::Disabled.into());
        assert_eq!(e.status, StatusCode::BAD_REQUEST);
        assert_eq!(e.code, "bad_request");
    }

    #[test]
    fn missing_key_is_a_server_error() {
        let e = classify_pipeline_error(ProviderError::MissingKey.into());
        assert_eq!(e.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(e.code, "internal");
    }

    #[test]
    fn upstream_failures_map_to_bad_gateway() {
        let e = classify_pipeline_error(ProviderError::Api("chat API error 500".into()).into());
        assert_eq!(e.status, StatusCode::BAD_GATEWAY);
        assert_eq!(e.code, "provider_error");

        let e = classify_pipeline_error(ProviderError::Network("connection refused".into()).into());
        assert_eq!(e.status, StatusCode::BAD_GATEWAY);
        assert_eq!(e.code, "provider_error");
    }

    #[test]
    fn classification_survives_added_context() {
        use anyhow::Context;
        let err = Result::<(), _>::Err(anyhow::Error::from(ProviderError::MissingKey))
            .context("while answering")
            .unwrap_err();
        let e = classify_pipeline_error(err);
        assert_eq!(e.code, "internal");
    }

    #[test]
    fn unclassified_errors_fall_back_to_internal() {
        let e = classify_pipeline_error(anyhow::anyhow!("disk full"));
        assert_eq!(e.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(e.code, "internal");
    }
}
