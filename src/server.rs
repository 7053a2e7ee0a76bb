//! HTTP API for UI front ends.
//!
//! Exposes the orchestrator over a JSON API so a browser UI can upload a
//! file, read the derived metadata/context, and drive the conversation.
//!
//! # Endpoints
//!
//! | Method   | Path | Description |
//! |----------|------|-------------|
//! | `GET`    | `/health` | Liveness check (version + active backend kind) |
//! | `POST`   | `/sessions` | Create a session, returns its id |
//! | `POST`   | `/sessions/{id}/load` | Load a file (base64 content) |
//! | `POST`   | `/sessions/{id}/ask` | Ask a question about the loaded data |
//! | `GET`    | `/sessions/{id}` | Source, metadata, context, conversation |
//! | `POST`   | `/sessions/{id}/reset` | Clear conversation (or everything) |
//! | `POST`   | `/sessions/{id}/backend` | Switch backend kind |
//! | `DELETE` | `/sessions/{id}` | Drop the session |
//!
//! # Error Contract
//!
//! All error responses use one envelope:
//!
//! ```json
//! { "error": { "code": "corrupt_file", "message": "..." } }
//! ```
//!
//! # Concurrency
//!
//! Each session is an `Arc<Mutex<Analyst>>`: the per-session mutex
//! serializes `load`/`ask` within one session while operations on different
//! sessions proceed without coordination. The session map itself is locked
//! only for lookup and insertion.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::agent::Analyst;
use crate::config::{BackendKind, Config};
use crate::error::{AgentError, BackendError, IngestionError};

type SessionMap = HashMap<Uuid, Arc<Mutex<Analyst>>>;

#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    sessions: Arc<Mutex<SessionMap>>,
}

/// Start the HTTP API on the configured bind address.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let state = AppState {
        config: Arc::new(config.clone()),
        sessions: Arc::new(Mutex::new(HashMap::new())),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/sessions", post(handle_create_session))
        .route(
            "/sessions/{id}",
            get(handle_get_session).delete(handle_delete_session),
        )
        .route("/sessions/{id}/load", post(handle_load))
        .route("/sessions/{id}/ask", post(handle_ask))
        .route("/sessions/{id}/reset", post(handle_reset))
        .route("/sessions/{id}/backend", post(handle_switch_backend))
        .layer(cors)
        .with_state(state);

    println!("datalyst API listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn error_response(status: StatusCode, code: &str, message: String) -> Response {
    (
        status,
        Json(json!({ "error": { "code": code, "message": message } })),
    )
        .into_response()
}

fn ingestion_error_response(err: IngestionError) -> Response {
    error_response(StatusCode::UNPROCESSABLE_ENTITY, err.code(), err.to_string())
}

fn backend_error_response(err: BackendError) -> Response {
    let status = match err {
        BackendError::AuthenticationFailed => StatusCode::UNAUTHORIZED,
        BackendError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        _ => StatusCode::BAD_GATEWAY,
    };
    error_response(status, err.code(), err.to_string())
}

fn agent_error_response(err: AgentError) -> Response {
    match err {
        AgentError::NoData => {
            error_response(StatusCode::CONFLICT, "no_data", err.to_string())
        }
        AgentError::Ingestion(e) => ingestion_error_response(e),
        AgentError::Backend(e) => backend_error_response(e),
    }
}

async fn lookup(state: &AppState, id: Uuid) -> Result<Arc<Mutex<Analyst>>, Response> {
    state.sessions.lock().await.get(&id).cloned().ok_or_else(|| {
        error_response(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("no session {}", id),
        )
    })
}

async fn handle_health(State(state): State<AppState>) -> Response {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "backend": state.config.backend.kind.as_str(),
    }))
    .into_response()
}

async fn handle_create_session(State(state): State<AppState>) -> Response {
    let analyst = match Analyst::new(&state.config) {
        Ok(a) => a,
        Err(e) => return agent_error_response(e),
    };
    let id = Uuid::new_v4();
    state
        .sessions
        .lock()
        .await
        .insert(id, Arc::new(Mutex::new(analyst)));
    (StatusCode::CREATED, Json(json!({ "id": id }))).into_response()
}

#[derive(Deserialize)]
struct LoadRequest {
    filename: String,
    content_base64: String,
}

async fn handle_load(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<LoadRequest>,
) -> Response {
    let session = match lookup(&state, id).await {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    let bytes = match base64::engine::general_purpose::STANDARD.decode(&request.content_base64) {
        Ok(bytes) => bytes,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "bad_request",
                format!("content_base64 is not valid base64: {}", e),
            )
        }
    };

    let mut analyst = session.lock().await;
    match analyst.load_bytes(&request.filename, &bytes) {
        Ok(loaded) => Json(json!({
            "source": &loaded.source,
            "metadata": &loaded.metadata,
            "context": &loaded.context,
        }))
        .into_response(),
        Err(e) => ingestion_error_response(e),
    }
}

#[derive(Deserialize)]
struct AskRequest {
    question: String,
}

async fn handle_ask(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<AskRequest>,
) -> Response {
    if request.question.trim().is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "bad_request",
            "question must not be empty".to_string(),
        );
    }
    let session = match lookup(&state, id).await {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    let mut analyst = session.lock().await;
    match analyst.ask(&request.question).await {
        Ok(answer) => Json(json!({ "answer": answer })).into_response(),
        Err(e) => agent_error_response(e),
    }
}

async fn handle_get_session(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    let session = match lookup(&state, id).await {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let analyst = session.lock().await;

    let turns: Vec<_> = analyst.conversation().history().cloned().collect();
    let body = match analyst.session() {
        Some(s) => json!({
            "state": "ready",
            "backend": analyst.backend_kind().as_str(),
            "source": &s.source,
            "metadata": &s.metadata,
            "context": &s.context,
            "turns": turns,
            "conversation_summary": analyst.conversation().summary(),
        }),
        None => json!({
            "state": "empty",
            "backend": analyst.backend_kind().as_str(),
            "turns": turns,
        }),
    };
    Json(body).into_response()
}

#[derive(Deserialize)]
struct ResetRequest {
    /// When true, only the conversation is cleared; the loaded data stays.
    #[serde(default)]
    conversation_only: bool,
}

async fn handle_reset(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ResetRequest>,
) -> Response {
    let session = match lookup(&state, id).await {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let mut analyst = session.lock().await;
    if request.conversation_only {
        analyst.reset_conversation();
    } else {
        analyst.clear();
    }
    Json(json!({ "ok": true })).into_response()
}

#[derive(Deserialize)]
struct SwitchBackendRequest {
    kind: String,
}

async fn handle_switch_backend(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<SwitchBackendRequest>,
) -> Response {
    let kind: BackendKind = match request.kind.parse() {
        Ok(kind) => kind,
        Err(e) => {
            return error_response(StatusCode::BAD_REQUEST, "bad_request", e.to_string())
        }
    };
    let session = match lookup(&state, id).await {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let mut analyst = session.lock().await;
    match analyst.switch_backend(kind) {
        Ok(()) => Json(json!({ "ok": true, "backend": kind.as_str() })).into_response(),
        Err(e) => agent_error_response(e),
    }
}

async fn handle_delete_session(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    let removed = state.sessions.lock().await.remove(&id).is_some();
    if removed {
        Json(json!({ "ok": true })).into_response()
    } else {
        error_response(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("no session {}", id),
        )
    }
}
