//! HTTP chat server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/chat` | Answer `{"query": ...}` with `{"response", "sources"}` |
//! | `GET`  | `/health` | Readiness and version |
//! | `GET`  | `/` | Minimal web chat page |
//!
//! # Error Contract
//!
//! ```json
//! { "detail": "System not initialized. Check server logs.", "code": "not_initialized" }
//! ```
//!
//! `400` for an empty or malformed query, `500` for everything else.
//!
//! # Readiness
//!
//! The query engine is built once at startup. If that fails (missing API
//! key, missing index, embedder mismatch) the server still starts, logs the
//! reason, and answers every `/chat` request with the not-initialized error.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the chat page can be
//! opened from anywhere.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::error::QueryError;
use crate::query::{Answer, QueryEngine};

const CHAT_PAGE: &str = include_str!("../static/chat.html");

/// Whether the server can answer questions.
pub enum ServiceState {
    Ready(QueryEngine),
    NotReady { reason: String },
}

impl ServiceState {
    /// Build the query engine, recording why if it cannot be built.
    pub async fn initialize(config: &Config) -> Self {
        tracing::info!("initializing query engine");
        match QueryEngine::from_config(config).await {
            Ok(engine) => {
                tracing::info!("system ready");
                ServiceState::Ready(engine)
            }
            Err(e) => {
                tracing::error!(kind = ?e.kind(), "startup failed: {}", e);
                ServiceState::NotReady {
                    reason: e.to_string(),
                }
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, ServiceState::Ready(_))
    }
}

/// Build the router over a shared service state.
pub fn router(state: Arc<ServiceState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_index))
        .route("/chat", post(handle_chat))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// `ragchat serve`: initialize, bind to `[server].bind`, and serve until terminated.
pub async fn run_server(config: &Config, bind: Option<&str>) -> anyhow::Result<()> {
    let bind_addr = bind.unwrap_or(&config.server.bind).to_string();
    let state = Arc::new(ServiceState::initialize(config).await);
    if !state.is_ready() {
        println!("warning: query engine not initialized; /chat will return errors (see log)");
    }

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    println!("ragchat listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct ErrorBody {
    pub detail: String,
    pub code: String,
}

struct AppError {
    status: StatusCode,
    body: ErrorBody,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<QueryError> for AppError {
    fn from(err: QueryError) -> Self {
        let status = match err {
            QueryError::EmptyQuery => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(kind = ?err.kind(), code = err.code(), "chat request failed: {}", err);
        }
        AppError {
            status,
            body: ErrorBody {
                detail: err.to_string(),
                code: err.code().to_string(),
            },
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        body: ErrorBody {
            detail: message.into(),
            code: "bad_request".to_string(),
        },
    }
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatRequest {
    query: String,
}

async fn handle_chat(
    State(state): State<Arc<ServiceState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<Answer>, AppError> {
    let engine = match state.as_ref() {
        ServiceState::Ready(engine) => engine,
        ServiceState::NotReady { .. } => return Err(QueryError::NotReady.into()),
    };
    let Json(request) = payload.map_err(|e| bad_request(e.body_text()))?;

    let answer = engine.answer(&request.query).await?;
    Ok(Json(answer))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

async fn handle_health(State(state): State<Arc<ServiceState>>) -> Json<HealthResponse> {
    let (status, detail) = match state.as_ref() {
        ServiceState::Ready(_) => ("ok", None),
        ServiceState::NotReady { reason } => ("not_ready", Some(reason.clone())),
    };
    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        detail,
    })
}

// ============ GET / ============

async fn handle_index() -> Html<&'static str> {
    Html(CHAT_PAGE)
}
