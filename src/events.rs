//! Pipeline event types and broadcast bus
//!
//! The result sink (status text and result labels on the rendering
//! surface) is modeled as a broadcast event stream: the orchestrator and
//! clients emit `PipelineEvent`s, the SSE endpoint forwards them to any
//! connected display client.

use crate::models::AppMode;
use crate::services::prediction_client::Prediction;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Pipeline events published to the result sink
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    /// Status text changed (the camera status indicator)
    StatusChanged {
        text: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Busy indicator toggled (the original's red/green cursor)
    BusyChanged {
        busy: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A capture was accepted and a result label placed
    CaptureStarted {
        session_id: Uuid,
        mode: AppMode,
        sequence: u32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Classification finished; predictions filtered for display
    PredictionsReady {
        session_id: Uuid,
        predictions: Vec<Prediction>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Face gate short-circuited the session: no face in the capture
    NoFaceDetected {
        session_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Training mode: photo taken, voice tag selection requested
    TagSelectionRequested {
        session_id: Uuid,
        options: Vec<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Training image accepted by the remote service
    TrainingImageSubmitted {
        session_id: Uuid,
        tag: String,
        image_id: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Remote training completed, producing a new iteration
    TrainingCompleted {
        session_id: Uuid,
        iteration_id: String,
        iteration_name: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Iteration promoted to project default
    IterationPromoted {
        iteration_id: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Stale iteration deleted from the remote project
    IterationDeleted {
        iteration_id: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Training session cancelled by voice command
    TrainingCancelled {
        session_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A pipeline step failed; the session was reset
    PipelineFailed {
        session_id: Uuid,
        stage: String,
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl PipelineEvent {
    /// Get event type as string for SSE event naming and filtering
    pub fn event_type(&self) -> &str {
        match self {
            PipelineEvent::StatusChanged { .. } => "StatusChanged",
            PipelineEvent::BusyChanged { .. } => "BusyChanged",
            PipelineEvent::CaptureStarted { .. } => "CaptureStarted",
            PipelineEvent::PredictionsReady { .. } => "PredictionsReady",
            PipelineEvent::NoFaceDetected { .. } => "NoFaceDetected",
            PipelineEvent::TagSelectionRequested { .. } => "TagSelectionRequested",
            PipelineEvent::TrainingImageSubmitted { .. } => "TrainingImageSubmitted",
            PipelineEvent::TrainingCompleted { .. } => "TrainingCompleted",
            PipelineEvent::IterationPromoted { .. } => "IterationPromoted",
            PipelineEvent::IterationDeleted { .. } => "IterationDeleted",
            PipelineEvent::TrainingCancelled { .. } => "TrainingCancelled",
            PipelineEvent::PipelineFailed { .. } => "PipelineFailed",
        }
    }
}

/// Broadcast bus for pipeline events
///
/// Wraps `tokio::sync::broadcast`: non-blocking publish, multiple
/// concurrent subscribers, automatic cleanup when subscribers drop.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring the case where no subscriber is listening.
    ///
    /// Display events are non-critical: a headset that is not connected
    /// simply misses them.
    pub fn emit_lossy(&self, event: PipelineEvent) {
        if let Err(e) = self.tx.send(event) {
            tracing::trace!("No subscribers for event: {}", e);
        }
    }
}
