//! helmwatch library interface
//!
//! Headset camera pipeline: face-gated image classification and
//! voice-driven model training against remote vision services.
//! Exposes the public APIs for integration testing.

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};

use crate::events::EventBus;
use crate::services::{OrchestratorCommand, OrchestratorStatus, SessionCancelHandle};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Command channel into the orchestrator task
    pub commands: mpsc::Sender<OrchestratorCommand>,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Live orchestrator state for the status endpoint
    pub status: watch::Receiver<OrchestratorStatus>,
    /// Cancel handle for the active capture session; lets the reset
    /// endpoint interrupt a session the orchestrator task is mid-way
    /// through
    pub session_cancel: SessionCancelHandle,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        commands: mpsc::Sender<OrchestratorCommand>,
        event_bus: EventBus,
        status: watch::Receiver<OrchestratorStatus>,
        session_cancel: SessionCancelHandle,
    ) -> Self {
        Self {
            commands,
            event_bus,
            status,
            session_cancel,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::capture_routes())
        .route("/events", get(api::pipeline_event_stream))
        .merge(api::health_routes())
        .with_state(state)
}
