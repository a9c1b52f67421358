//! Capture pipeline state machine
//!
//! One `CaptureSession` represents one end-to-end run of the pipeline,
//! created by a single tap or voice trigger. At most one session is active
//! at a time; triggers received while a session is active are ignored.
//!
//! # State progression
//! Analysis mode:  Idle → Capturing → Processing → Idle
//! Training mode:  Idle → Capturing → AwaitingTagSelection → Processing → Idle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Operating mode of the capture pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppMode {
    /// Captured images are face-gated, then classified
    Analysis,
    /// Captured images are tagged by voice and submitted for training
    Training,
}

impl std::fmt::Display for AppMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppMode::Analysis => write!(f, "analysis"),
            AppMode::Training => write!(f, "training"),
        }
    }
}

/// Capture pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum CaptureState {
    /// Ready for the next trigger
    Idle,
    /// Photo capture in progress
    Capturing,
    /// Remote pipeline steps in progress (gate/classify or submit/train)
    Processing,
    /// Training mode only: photo taken, waiting for a voice-selected tag
    AwaitingTagSelection,
}

impl std::fmt::Display for CaptureState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureState::Idle => write!(f, "Idle"),
            CaptureState::Capturing => write!(f, "Capturing"),
            CaptureState::Processing => write!(f, "Processing"),
            CaptureState::AwaitingTagSelection => write!(f, "AwaitingTagSelection"),
        }
    }
}

/// One end-to-end pipeline run (in-memory state)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureSession {
    /// Unique session identifier
    pub session_id: Uuid,

    /// Mode the session was triggered in
    pub mode: AppMode,

    /// Capture sequence number (names the image file)
    pub sequence: u32,

    /// Path of the captured image asset
    pub image_path: PathBuf,

    /// Session start time
    pub started_at: DateTime<Utc>,
}

impl CaptureSession {
    /// Create a new session for a freshly accepted trigger
    pub fn new(mode: AppMode, sequence: u32, image_path: PathBuf) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            mode,
            sequence,
            image_path,
            started_at: Utc::now(),
        }
    }
}
