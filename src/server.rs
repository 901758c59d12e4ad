//! HTTP API for querying course materials.
//!
//! Exposes the question-answering and analytics surface as a JSON API, the
//! same contract the original web frontend consumes.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/query` | Answer a question, with tool-backed search |
//! | `GET`  | `/api/courses` | Indexed course statistics |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "internal", "message": "Anthropic API error ..." } }
//! ```
//!
//! Error codes: `config` (500), `timeout` (408), `internal` (500).
//! Malformed request bodies are rejected by the JSON extractor before a
//! handler runs.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! frontends served from a different host.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::models::Source;
use crate::rag::RagSystem;

/// Shared application state passed to all route handlers via Axum's `State`
/// extractor.
#[derive(Clone)]
struct AppState {
    rag: Arc<RagSystem>,
}

/// Starts the HTTP server.
///
/// Hydrates the process-local index from the configured docs folder, binds
/// to the address in `[server].bind`, and serves until the process is
/// terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let docs_dir = config.ingest.docs_dir.clone();

    let rag = Arc::new(RagSystem::new(config)?);

    // The index is process-lifetime, so load the docs folder up front
    let report = rag.hydrate(&docs_dir).await?;
    println!(
        "loaded {} courses ({} chunks) from {}",
        report.courses_added,
        report.chunks_indexed,
        docs_dir.display()
    );

    let state = AppState { rag };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/query", post(handle_query))
        .route("/api/courses", get(handle_courses))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    println!("lectern listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

/// Inner error detail with a machine-readable code and human-readable message.
#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
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

/// Constructs a 500 error for missing server-side configuration.
fn config_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "config".to_string(),
        message: message.into(),
    }
}

/// Constructs a 408 Request Timeout error.
fn timeout_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::REQUEST_TIMEOUT,
        code: "timeout".to_string(),
        message: message.into(),
    }
}

/// Constructs a 500 error for everything else.
fn internal_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

/// Inspects query failures and maps them to the most appropriate HTTP
/// status code. Everything inside the tool loop already resolves to answer
/// text, so what reaches here is transport or configuration trouble.
fn classify_query_error(err: anyhow::Error) -> AppError {
    let msg = err.to_string();

    if msg.contains("ANTHROPIC_API_KEY") {
        config_error(msg)
    } else if msg.contains("timed out") || msg.contains("timeout") {
        timeout_error(msg)
    } else {
        internal_error(msg)
    }
}

// ============ GET /health ============

/// JSON response body for `GET /health`.
#[derive(Serialize)]
struct HealthResponse {
    /// Always `"ok"` when the server is running.
    status: String,
    /// The crate version from `Cargo.toml`.
    version: String,
}

/// Handler for `GET /health`.
async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /api/query ============

/// JSON request body for `POST /api/query`.
#[derive(Deserialize)]
struct QueryRequest {
    query: String,
    session_id: Option<String>,
}

/// JSON response body for `POST /api/query`.
#[derive(Serialize)]
struct QueryResponse {
    answer: String,
    sources: Vec<Source>,
    session_id: String,
}

/// Handler for `POST /api/query`.
///
/// Answers the question with the search tools available. A request without
/// a `session_id` gets a fresh session, returned in the response so the
/// client can thread follow-ups.
async fn handle_query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, AppError> {
    let outcome = state
        .rag
        .query(&request.query, request.session_id.as_deref())
        .await
        .map_err(classify_query_error)?;

    Ok(Json(QueryResponse {
        answer: outcome.answer,
        sources: outcome.sources,
        session_id: outcome.session_id,
    }))
}

// ============ GET /api/courses ============

/// JSON response body for `GET /api/courses`.
#[derive(Serialize)]
struct CoursesResponse {
    total_courses: usize,
    course_titles: Vec<String>,
}

/// Handler for `GET /api/courses`.
async fn handle_courses(State(state): State<AppState>) -> Json<CoursesResponse> {
    let analytics = state.rag.analytics().await;
    Json(CoursesResponse {
        total_courses: analytics.total_courses,
        course_titles: analytics.course_titles,
    })
}
