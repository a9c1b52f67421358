//! Capture pipeline API handlers
//!
//! POST /capture/trigger, POST /capture/reset, POST /voice/phrase,
//! POST /mode, GET /status
//!
//! Handlers translate HTTP requests into orchestrator commands; the
//! orchestrator task owns all pipeline state. Results flow back to
//! clients over the SSE stream, not over these responses.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{AppMode, CaptureState};
use crate::services::OrchestratorCommand;
use crate::AppState;

/// POST /capture/trigger response
#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub accepted: bool,
    pub mode: AppMode,
}

/// POST /voice/phrase request
#[derive(Debug, Deserialize)]
pub struct PhraseRequest {
    pub phrase: String,
}

/// POST /mode request
#[derive(Debug, Deserialize)]
pub struct SetModeRequest {
    pub mode: AppMode,
}

/// Generic acknowledgement response
#[derive(Debug, Serialize)]
pub struct AckResponse {
    pub accepted: bool,
}

/// GET /status response
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub mode: AppMode,
    pub state: CaptureState,
    pub active_session: Option<Uuid>,
}

/// POST /capture/trigger
///
/// Tap gesture surrogate: start a capture session. Returns 409 when a
/// session is already active; the orchestrator also debounces
/// internally, so a racing trigger is dropped there.
pub async fn trigger_capture(State(state): State<AppState>) -> ApiResult<Json<TriggerResponse>> {
    let status = state.status.borrow().clone();
    if status.state != CaptureState::Idle {
        return Err(ApiError::Conflict(format!(
            "Capture session already active (state: {})",
            status.state
        )));
    }

    state
        .commands
        .send(OrchestratorCommand::Trigger)
        .await
        .map_err(|_| ApiError::Internal("Orchestrator unavailable".to_string()))?;

    Ok(Json(TriggerResponse {
        accepted: true,
        mode: status.mode,
    }))
}

/// POST /capture/reset
///
/// Force the pipeline back to idle from any state. Cancels the active
/// session's pending scheduled steps directly before queueing the
/// reset command: the orchestrator task processes commands
/// sequentially, so the command alone would wait out any in-flight
/// paced delay.
pub async fn reset_capture(State(state): State<AppState>) -> ApiResult<Json<AckResponse>> {
    state.session_cancel.cancel();
    state
        .commands
        .send(OrchestratorCommand::Reset)
        .await
        .map_err(|_| ApiError::Internal("Orchestrator unavailable".to_string()))?;

    Ok(Json(AckResponse { accepted: true }))
}

/// POST /voice/phrase
///
/// Deliver a recognized phrase from the keyword spotting engine.
/// Unknown phrases and phrases received while voice selection is not
/// armed are accepted and silently dropped by the orchestrator.
pub async fn submit_phrase(
    State(state): State<AppState>,
    Json(request): Json<PhraseRequest>,
) -> ApiResult<Json<AckResponse>> {
    if request.phrase.trim().is_empty() {
        return Err(ApiError::BadRequest("Phrase must not be empty".to_string()));
    }

    state
        .commands
        .send(OrchestratorCommand::Phrase(request.phrase))
        .await
        .map_err(|_| ApiError::Internal("Orchestrator unavailable".to_string()))?;

    Ok(Json(AckResponse { accepted: true }))
}

/// POST /mode
///
/// Switch between analysis and training mode. Rejected while a capture
/// session is active.
pub async fn set_mode(
    State(state): State<AppState>,
    Json(request): Json<SetModeRequest>,
) -> ApiResult<Json<AckResponse>> {
    let status = state.status.borrow().clone();
    if status.state != CaptureState::Idle {
        return Err(ApiError::Conflict(format!(
            "Cannot switch mode while session active (state: {})",
            status.state
        )));
    }

    state
        .commands
        .send(OrchestratorCommand::SetMode(request.mode))
        .await
        .map_err(|_| ApiError::Internal("Orchestrator unavailable".to_string()))?;

    Ok(Json(AckResponse { accepted: true }))
}

/// GET /status
///
/// Current orchestrator state snapshot.
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let status = state.status.borrow().clone();
    Json(StatusResponse {
        mode: status.mode,
        state: status.state,
        active_session: status.active_session,
    })
}

/// Build capture pipeline routes
pub fn capture_routes() -> Router<AppState> {
    Router::new()
        .route("/capture/trigger", post(trigger_capture))
        .route("/capture/reset", post(reset_capture))
        .route("/voice/phrase", post(submit_phrase))
        .route("/mode", post(set_mode))
        .route("/status", get(get_status))
}
