//! HTTP route handlers for the lab API.
//!
//! Handlers only validate requests and call into [`lab_engine`]. Engine calls
//! touch the filesystem, so they run on the blocking pool.

use axum::Router;
use axum::extract::{Path, State};
use axum::response::Json;
use axum::routing::{get, post};
use lab_engine::core::types::SessionStatus;
use lab_engine::error::LabError;
use lab_engine::io::terminal::TerminalConnection;
use lab_engine::lab::LabDefinition;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::error::ApiError;
use crate::state::AppState;

/// Build the API router.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/labs", get(list_labs))
        .route("/ethics/ack", post(ack_ethics))
        .route("/labs/{lab_id}/start", post(start_lab))
        .route("/labs/{lab_id}/submit", post(submit))
}

/// Run `f` on the blocking pool.
async fn blocking<F, R>(f: F) -> Result<R, ApiError>
where
    F: FnOnce() -> Result<R, ApiError> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|err| ApiError::internal(format!("worker failed: {err}")))?
}

/// Trimmed, non-empty request field.
fn required(value: Option<String>, field: &str) -> Result<String, ApiError> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ApiError::bad_request(format!("{field} is required"))),
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Serialize)]
struct LabsResponse {
    labs: Vec<LabDefinition>,
}

/// GET /api/labs - the catalog, sorted by id.
async fn list_labs(State(state): State<AppState>) -> Result<Json<LabsResponse>, ApiError> {
    let runner = state.runner.clone();
    let labs = blocking(move || Ok(runner.list_labs()?)).await?;
    Ok(Json(LabsResponse { labs }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AckRequest {
    user_id: Option<String>,
}

/// POST /api/ethics/ack - record that a user accepted the ethics module.
async fn ack_ethics(
    State(state): State<AppState>,
    Json(body): Json<AckRequest>,
) -> Result<Json<Value>, ApiError> {
    let user_id = required(body.user_id, "userId")?;
    let ethics = state.ethics.clone();
    blocking(move || Ok(ethics.acknowledge(&user_id)?)).await?;
    Ok(Json(json!({ "acknowledged": true })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartRequest {
    user_id: Option<String>,
}

/// What the client learns about a new session. Seed, parameters and
/// artifacts stay server-side.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionView {
    session_id: String,
    lab_id: String,
    status: SessionStatus,
    terminal: Option<TerminalConnection>,
}

#[derive(Serialize)]
struct StartResponse {
    session: SessionView,
}

/// POST /api/labs/{lab_id}/start
async fn start_lab(
    State(state): State<AppState>,
    Path(lab_id): Path<String>,
    Json(body): Json<StartRequest>,
) -> Result<Json<StartResponse>, ApiError> {
    let user_id = required(body.user_id, "userId")?;
    if !state.ethics.is_acknowledged(&user_id)? {
        return Err(ApiError::forbidden("ethics module not acknowledged"));
    }
    let runner = state.runner.clone();
    let session = blocking(move || Ok(runner.start_lab(&lab_id, &user_id)?)).await?;
    Ok(Json(StartResponse {
        session: SessionView {
            session_id: session.session_id,
            lab_id: session.lab_id,
            status: session.status,
            terminal: session.terminal,
        },
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitRequest {
    session_id: Option<String>,
    submission: Option<String>,
}

/// POST /api/labs/{lab_id}/submit
async fn submit(
    State(state): State<AppState>,
    Path(lab_id): Path<String>,
    Json(body): Json<SubmitRequest>,
) -> Result<Json<Value>, ApiError> {
    let session_id = required(body.session_id, "sessionId")?;
    let submission = match body.submission {
        Some(submission) if !submission.trim().is_empty() => submission,
        _ => return Err(ApiError::bad_request("submission is required")),
    };
    let runner = state.runner.clone();
    let passed = blocking(move || {
        let mut session = runner.load_session(&session_id)?;
        if session.lab_id != lab_id {
            debug!(
                session_id = %session_id,
                lab_id = %lab_id,
                "session belongs to another lab"
            );
            return Err(LabError::SessionNotFound { session_id }.into());
        }
        Ok(runner.submit(&mut session, &submission)?)
    })
    .await?;
    Ok(Json(json!({ "passed": passed })))
}
