//! Capture pipeline orchestrator
//!
//! The top-level state machine tying the camera to the remote services.
//! Runs as a single tokio task consuming a command channel, so no two
//! pipeline runs ever overlap; a trigger received while a session is
//! active is a no-op.
//!
//! # Sequencing
//! Analysis mode:  trigger → capture → face gate → classify → result sink
//! Training mode:  trigger → capture → voice tag selection →
//!                 resolve tag → submit image → train → promote & clean
//!
//! `reset_image_capture` is the only cancellation primitive: safe from
//! any state, it disarms voice listening, cancels pending scheduled
//! delays, clears the busy indicator, and returns to `Idle`.

use crate::config::PacingConfig;
use crate::events::{EventBus, PipelineEvent};
use crate::models::{AppMode, CaptureSession, CaptureState, TrainingTag};
use crate::services::camera::Camera;
use crate::services::face_client::FaceDetector;
use crate::services::image_store::ImageStore;
use crate::services::iteration_manager::{IterationLifecycleManager, LifecycleError};
use crate::services::prediction_client::{filter_for_display, Classifier};
use crate::services::training_client::{resolve_tag_id, TrainingApi};
use crate::services::voice_router::{VoiceCommand, VoiceCommandRouter};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Commands delivered by the outer input surfaces
#[derive(Debug, Clone)]
pub enum OrchestratorCommand {
    /// Tap gesture: start a capture session
    Trigger,
    /// Recognized voice phrase from the keyword spotting engine
    Phrase(String),
    /// Switch operating mode (only honored while idle)
    SetMode(AppMode),
    /// Force a reset to idle
    Reset,
}

/// Shared handle to the active session's cancellation token.
///
/// The orchestrator task processes commands sequentially, so a `Reset`
/// command queues behind whatever the task is currently awaiting. The
/// reset surface therefore cancels through this handle first; the
/// pending paced delay aborts immediately and the queued command only
/// finalizes the state.
#[derive(Clone)]
pub struct SessionCancelHandle {
    token: Arc<Mutex<CancellationToken>>,
}

impl SessionCancelHandle {
    pub fn new() -> Self {
        Self {
            token: Arc::new(Mutex::new(CancellationToken::new())),
        }
    }

    /// Cancel the active session's pending scheduled steps
    pub fn cancel(&self) {
        self.lock().cancel();
    }

    /// Token of the active session
    pub fn current(&self) -> CancellationToken {
        self.lock().clone()
    }

    /// Install a fresh token for a new session
    fn refresh(&self) {
        *self.lock() = CancellationToken::new();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CancellationToken> {
        // A poisoned lock still holds a usable token
        self.token.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for SessionCancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of orchestrator state for the status endpoint
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStatus {
    pub mode: AppMode,
    pub state: CaptureState,
    pub active_session: Option<Uuid>,
}

/// The capture pipeline state machine
pub struct CaptureOrchestrator {
    mode: AppMode,
    state: CaptureState,
    session: Option<CaptureSession>,

    camera: Arc<dyn Camera>,
    store: ImageStore,
    face: Arc<dyn FaceDetector>,
    classifier: Arc<dyn Classifier>,
    training: Arc<dyn TrainingApi>,
    lifecycle: IterationLifecycleManager,
    voice: VoiceCommandRouter,

    event_bus: EventBus,
    pacing: PacingConfig,
    /// Cancels pending scheduled delays of the current session; shared
    /// with the HTTP reset surface
    cancel: SessionCancelHandle,
    status_tx: watch::Sender<OrchestratorStatus>,
}

impl CaptureOrchestrator {
    /// Wire up the orchestrator. Returns the orchestrator, a watch
    /// receiver mirroring its state for the HTTP status endpoint, and
    /// the cancel handle for the HTTP reset surface.
    pub fn new(
        camera: Arc<dyn Camera>,
        store: ImageStore,
        face: Arc<dyn FaceDetector>,
        classifier: Arc<dyn Classifier>,
        training: Arc<dyn TrainingApi>,
        event_bus: EventBus,
        pacing: PacingConfig,
    ) -> (
        Self,
        watch::Receiver<OrchestratorStatus>,
        SessionCancelHandle,
    ) {
        let lifecycle = IterationLifecycleManager::new(
            training.clone(),
            event_bus.clone(),
            pacing.promote_delay(),
            pacing.cleanup_delay(),
        );

        let (status_tx, status_rx) = watch::channel(OrchestratorStatus {
            mode: AppMode::Analysis,
            state: CaptureState::Idle,
            active_session: None,
        });

        let orchestrator = Self {
            mode: AppMode::Analysis,
            state: CaptureState::Idle,
            session: None,
            camera,
            store,
            face,
            classifier,
            training,
            lifecycle,
            voice: VoiceCommandRouter::new(),
            event_bus,
            pacing,
            cancel: SessionCancelHandle::new(),
            status_tx,
        };

        let cancel = orchestrator.cancel.clone();
        (orchestrator, status_rx, cancel)
    }

    /// Consume commands until the channel closes
    pub async fn run(mut self, mut commands: mpsc::Receiver<OrchestratorCommand>) {
        info!("Capture orchestrator started");
        self.set_status("Ready");

        while let Some(command) = commands.recv().await {
            match command {
                OrchestratorCommand::Trigger => self.handle_trigger().await,
                OrchestratorCommand::Phrase(phrase) => self.handle_phrase(&phrase).await,
                OrchestratorCommand::SetMode(mode) => self.set_mode(mode),
                OrchestratorCommand::Reset => self.reset_image_capture(),
            }
        }

        info!("Command channel closed, capture orchestrator stopping");
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn mode(&self) -> AppMode {
        self.mode
    }

    /// Switch operating mode. Ignored while a session is active.
    pub fn set_mode(&mut self, mode: AppMode) {
        if self.state != CaptureState::Idle {
            warn!(state = %self.state, "Mode switch ignored while session active");
            return;
        }
        info!(mode = %mode, "Operating mode changed");
        self.mode = mode;
        self.publish_status();
    }

    /// Tap trigger: start a capture session unless one is active
    pub async fn handle_trigger(&mut self) {
        if self.state != CaptureState::Idle {
            // Re-entrant trigger while busy: silently ignored
            debug!(state = %self.state, "Trigger ignored: session active");
            return;
        }

        // Fresh cancel scope for this session
        self.cancel.refresh();

        self.transition(CaptureState::Capturing);
        self.event_bus.emit_lossy(PipelineEvent::BusyChanged {
            busy: true,
            timestamp: chrono::Utc::now(),
        });
        match self.mode {
            AppMode::Analysis => self.set_status("Saving image"),
            AppMode::Training => self.set_status("Uploading image"),
        }

        let (sequence, image_path) = self.store.next_image_path();
        let session = CaptureSession::new(self.mode, sequence, image_path.clone());

        info!(
            session_id = %session.session_id,
            mode = %session.mode,
            sequence,
            path = %image_path.display(),
            "Capture session started"
        );
        self.event_bus.emit_lossy(PipelineEvent::CaptureStarted {
            session_id: session.session_id,
            mode: session.mode,
            sequence,
            timestamp: chrono::Utc::now(),
        });

        if let Err(e) = self.camera.take_photo(&image_path).await {
            warn!(error = %e, "Photo capture failed");
            self.fail(session.session_id, "capture", &e.to_string());
            self.reset_image_capture();
            return;
        }

        self.session = Some(session);
        self.publish_status();

        match self.mode {
            AppMode::Analysis => {
                self.transition(CaptureState::Processing);
                self.set_status("Analyzing");
                self.run_analysis().await;
                self.reset_image_capture();
            }
            AppMode::Training => self.request_tag_selection(),
        }
    }

    /// Recognized phrase from the spotting engine
    pub async fn handle_phrase(&mut self, phrase: &str) {
        let Some(command) = self.voice.resolve(phrase) else {
            return;
        };
        if self.state != CaptureState::AwaitingTagSelection {
            debug!(state = %self.state, "Phrase ignored outside tag selection");
            return;
        }

        match command {
            VoiceCommand::Cancel => {
                info!("Training capture cancelled by voice");
                self.voice.disarm();
                if let Some(session) = &self.session {
                    self.event_bus.emit_lossy(PipelineEvent::TrainingCancelled {
                        session_id: session.session_id,
                        timestamp: chrono::Utc::now(),
                    });
                }
                self.reset_image_capture();
            }
            VoiceCommand::SelectTag(tag) => {
                info!(tag = %tag, "Training tag selected by voice");
                self.voice.disarm();
                self.transition(CaptureState::Processing);
                self.set_status(&format!("Selected tag: {}", tag));
                self.run_training_chain(tag).await;
                self.reset_image_capture();
            }
        }
    }

    /// Force a return to `Idle` from any state
    pub fn reset_image_capture(&mut self) {
        self.voice.disarm();
        // Stop any pending scheduled delay from firing
        self.cancel.cancel();
        self.session = None;
        self.transition(CaptureState::Idle);
        self.event_bus.emit_lossy(PipelineEvent::BusyChanged {
            busy: false,
            timestamp: chrono::Utc::now(),
        });
        self.set_status("Ready");
    }

    /// Analysis branch: face gate, then classification
    async fn run_analysis(&mut self) {
        let Some(session) = self.session.clone() else {
            return;
        };

        let image = match ImageStore::read_image(&session.image_path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "Cannot read captured image");
                self.fail(session.session_id, "read image", &e.to_string());
                return;
            }
        };

        // Face gate. Transport or parse failures fail closed to "no
        // face" so a questionable capture never spends a prediction call.
        let faces = match self.face.detect_faces(&image).await {
            Ok(faces) => faces,
            Err(e) => {
                warn!(error = %e, "Face detection failed, treating as no face");
                Vec::new()
            }
        };

        if faces.is_empty() {
            info!(session_id = %session.session_id, "No face in capture, skipping classification");
            self.event_bus.emit_lossy(PipelineEvent::NoFaceDetected {
                session_id: session.session_id,
                timestamp: chrono::Utc::now(),
            });
            self.set_status("No face in the captured image");
            return;
        }

        debug!(faces = faces.len(), "Face detected, classifying image");
        match self.classifier.classify(&image).await {
            Ok(predictions) => {
                let shown = filter_for_display(predictions);
                info!(
                    session_id = %session.session_id,
                    count = shown.len(),
                    "Classification complete"
                );
                self.event_bus.emit_lossy(PipelineEvent::PredictionsReady {
                    session_id: session.session_id,
                    predictions: shown,
                    timestamp: chrono::Utc::now(),
                });
            }
            Err(e) => {
                warn!(error = %e, "Classification failed");
                self.fail(session.session_id, "classify", &e.to_string());
            }
        }
    }

    /// Training branch entry: prompt for a voice-selected tag
    fn request_tag_selection(&mut self) {
        let Some(session_id) = self.session.as_ref().map(|s| s.session_id) else {
            return;
        };
        let options: Vec<String> = VoiceCommandRouter::vocabulary()
            .iter()
            .map(|s| s.to_string())
            .collect();

        // Transition before announcing, so a client reacting to the
        // event observes the waiting state
        self.voice.arm();
        self.transition(CaptureState::AwaitingTagSelection);

        self.event_bus.emit_lossy(PipelineEvent::TagSelectionRequested {
            session_id,
            options: options.clone(),
            timestamp: chrono::Utc::now(),
        });
        self.set_status(&format!("Select a tag by voice: {}", options.join(", ")));
    }

    /// Training submission chain: resolve tag → submit image → train →
    /// promote & clean. Paced with fixed settle delays between remote
    /// steps; any failure aborts the chain.
    async fn run_training_chain(&mut self, tag: TrainingTag) {
        let Some(session) = self.session.clone() else {
            return;
        };
        let session_id = session.session_id;

        if !self.paced_delay(self.pacing.submit_delay()).await {
            return;
        }
        self.set_status(&format!("Submitting {} image to the training service", tag));

        // Resolve the tag id against the authoritative remote list. A
        // miss leaves the id empty and the submission fails remotely.
        let tags = match self.training.list_tags().await {
            Ok(tags) => tags,
            Err(e) => {
                self.fail(session_id, "resolve tag", &e.to_string());
                return;
            }
        };
        let tag_id = resolve_tag_id(&tags, tag.name());
        if tag_id.is_empty() {
            warn!(tag = %tag, "Tag not registered on remote project, submission will be rejected");
        }

        let image = match ImageStore::read_image(&session.image_path) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.fail(session_id, "read image", &e.to_string());
                return;
            }
        };

        let image_id = match self.training.submit_image(image, &tag_id).await {
            Ok(id) => id,
            Err(e) => {
                self.fail(session_id, "submit image", &e.to_string());
                return;
            }
        };
        self.event_bus.emit_lossy(PipelineEvent::TrainingImageSubmitted {
            session_id,
            tag: tag.name().to_string(),
            image_id,
            timestamp: chrono::Utc::now(),
        });
        self.set_status("Image submitted to the training service");

        if !self.paced_delay(self.pacing.train_delay()).await {
            return;
        }
        self.set_status("Training in progress");

        let iteration = match self.training.train().await {
            Ok(iteration) => iteration,
            Err(e) => {
                self.fail(session_id, "train", &e.to_string());
                return;
            }
        };
        self.set_status("Training completed");
        self.event_bus.emit_lossy(PipelineEvent::TrainingCompleted {
            session_id,
            iteration_id: iteration.id.clone(),
            iteration_name: iteration.name.clone(),
            timestamp: chrono::Utc::now(),
        });

        match self
            .lifecycle
            .promote_and_clean(iteration, &self.cancel.current())
            .await
        {
            Ok(()) => self.set_status("Stale model iteration cleaned up"),
            Err(LifecycleError::Cancelled) => {
                debug!("Iteration lifecycle cancelled by reset");
            }
            Err(LifecycleError::Api(e)) => {
                self.fail(session_id, "promote iteration", &e.to_string());
            }
        }
    }

    /// Fixed settle delay; `false` when cancelled by a reset
    async fn paced_delay(&self, delay: Duration) -> bool {
        let cancelled = self.cancel.current();
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = cancelled.cancelled() => false,
        }
    }

    fn fail(&self, session_id: Uuid, stage: &str, message: &str) {
        self.event_bus.emit_lossy(PipelineEvent::PipelineFailed {
            session_id,
            stage: stage.to_string(),
            message: message.to_string(),
            timestamp: chrono::Utc::now(),
        });
        self.set_status(&format!("Pipeline step failed: {}", stage));
    }

    fn set_status(&self, text: &str) {
        self.event_bus.emit_lossy(PipelineEvent::StatusChanged {
            text: text.to_string(),
            timestamp: chrono::Utc::now(),
        });
    }

    fn transition(&mut self, new_state: CaptureState) {
        if self.state != new_state {
            debug!(from = %self.state, to = %new_state, "State transition");
        }
        self.state = new_state;
        self.publish_status();
    }

    fn publish_status(&self) {
        let _ = self.status_tx.send(OrchestratorStatus {
            mode: self.mode,
            state: self.state,
            active_session: self.session.as_ref().map(|s| s.session_id),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::camera::CameraError;
    use crate::services::face_client::{DetectedFace, FaceError, FaceRectangle};
    use crate::services::prediction_client::{Prediction, PredictionError};
    use crate::services::training_client::{
        Iteration, ProjectTag, TrainingError,
    };
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FakeCamera {
        calls: AtomicUsize,
    }

    impl FakeCamera {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Camera for FakeCamera {
        fn resolution(&self) -> (u32, u32) {
            (1280, 720)
        }

        async fn take_photo(&self, dest: &Path) -> Result<(), CameraError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::fs::write(dest, b"captured jpeg")?;
            Ok(())
        }
    }

    struct FakeFaceDetector {
        faces: usize,
        fail: bool,
        calls: AtomicUsize,
    }

    impl FakeFaceDetector {
        fn with_faces(faces: usize) -> Arc<Self> {
            Arc::new(Self {
                faces,
                fail: false,
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                faces: 0,
                fail: true,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl FaceDetector for FakeFaceDetector {
        async fn detect_faces(&self, _image: &[u8]) -> Result<Vec<DetectedFace>, FaceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(FaceError::ApiError(500, "boom".to_string()));
            }
            Ok((0..self.faces)
                .map(|i| DetectedFace {
                    face_id: format!("face-{}", i),
                    face_rectangle: FaceRectangle {
                        top: 0,
                        left: 0,
                        width: 10,
                        height: 10,
                    },
                })
                .collect())
        }
    }

    struct FakeClassifier {
        predictions: Vec<Prediction>,
        calls: AtomicUsize,
    }

    impl FakeClassifier {
        fn with(predictions: Vec<Prediction>) -> Arc<Self> {
            Arc::new(Self {
                predictions,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Classifier for FakeClassifier {
        async fn classify(&self, _image: &[u8]) -> Result<Vec<Prediction>, PredictionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.predictions.clone())
        }
    }

    #[derive(Default)]
    struct FakeTraining {
        tags: Vec<ProjectTag>,
        iterations: Mutex<Vec<Iteration>>,
        submitted: Mutex<Vec<String>>,
        trained: AtomicUsize,
        deleted: Mutex<Vec<String>>,
        fail_submit: bool,
    }

    impl FakeTraining {
        fn with_tags(tags: Vec<(&str, &str)>) -> Arc<Self> {
            Arc::new(Self {
                tags: tags
                    .into_iter()
                    .map(|(id, name)| ProjectTag {
                        id: id.to_string(),
                        name: name.to_string(),
                    })
                    .collect(),
                iterations: Mutex::new(vec![Iteration {
                    id: "it-old".to_string(),
                    name: "Iteration old".to_string(),
                    is_default: true,
                }]),
                ..Default::default()
            })
        }

        fn failing_submit(tags: Vec<(&str, &str)>) -> Arc<Self> {
            Arc::new(Self {
                tags: tags
                    .into_iter()
                    .map(|(id, name)| ProjectTag {
                        id: id.to_string(),
                        name: name.to_string(),
                    })
                    .collect(),
                fail_submit: true,
                ..Default::default()
            })
        }
    }

    #[async_trait]
    impl TrainingApi for FakeTraining {
        async fn list_tags(&self) -> Result<Vec<ProjectTag>, TrainingError> {
            Ok(self.tags.clone())
        }

        async fn submit_image(&self, _image: Vec<u8>, tag_id: &str) -> Result<String, TrainingError> {
            if self.fail_submit {
                return Err(TrainingError::ApiError(400, "rejected".to_string()));
            }
            self.submitted.lock().unwrap().push(tag_id.to_string());
            Ok("img-1".to_string())
        }

        async fn train(&self) -> Result<Iteration, TrainingError> {
            self.trained.fetch_add(1, Ordering::SeqCst);
            let iteration = Iteration {
                id: "it-new".to_string(),
                name: "Iteration new".to_string(),
                is_default: false,
            };
            self.iterations.lock().unwrap().push(iteration.clone());
            Ok(iteration)
        }

        async fn set_default_iteration(&self, iteration: &Iteration) -> Result<(), TrainingError> {
            let mut list = self.iterations.lock().unwrap();
            for it in list.iter_mut() {
                it.is_default = it.id == iteration.id;
            }
            Ok(())
        }

        async fn list_iterations(&self) -> Result<Vec<Iteration>, TrainingError> {
            Ok(self.iterations.lock().unwrap().clone())
        }

        async fn delete_iteration(&self, iteration_id: &str) -> Result<(), TrainingError> {
            self.iterations.lock().unwrap().retain(|i| i.id != iteration_id);
            self.deleted.lock().unwrap().push(iteration_id.to_string());
            Ok(())
        }
    }

    struct Harness {
        orchestrator: CaptureOrchestrator,
        events: tokio::sync::broadcast::Receiver<PipelineEvent>,
        _capture_dir: tempfile::TempDir,
    }

    fn harness(
        camera: Arc<FakeCamera>,
        face: Arc<FakeFaceDetector>,
        classifier: Arc<FakeClassifier>,
        training: Arc<FakeTraining>,
    ) -> Harness {
        let capture_dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(capture_dir.path()).unwrap();
        let event_bus = EventBus::new(64);
        let events = event_bus.subscribe();

        let (orchestrator, _status, _cancel) = CaptureOrchestrator::new(
            camera,
            store,
            face,
            classifier,
            training,
            event_bus,
            PacingConfig::immediate(),
        );

        Harness {
            orchestrator,
            events,
            _capture_dir: capture_dir,
        }
    }

    fn collect_events(rx: &mut tokio::sync::broadcast::Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn prediction(tag: &str, probability: f64) -> Prediction {
        Prediction {
            tag_name: tag.to_string(),
            probability,
        }
    }

    #[tokio::test]
    async fn test_no_face_short_circuits_classifier() {
        let classifier = FakeClassifier::with(vec![prediction("helmet on", 0.9)]);
        let mut h = harness(
            FakeCamera::new(),
            FakeFaceDetector::with_faces(0),
            classifier.clone(),
            FakeTraining::with_tags(vec![]),
        );

        h.orchestrator.handle_trigger().await;

        assert_eq!(h.orchestrator.state(), CaptureState::Idle);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);

        let events = collect_events(&mut h.events);
        let no_face = events
            .iter()
            .filter(|e| matches!(e, PipelineEvent::NoFaceDetected { .. }))
            .count();
        assert_eq!(no_face, 1);
        assert!(!events.iter().any(|e| matches!(e, PipelineEvent::PredictionsReady { .. })));
    }

    #[tokio::test]
    async fn test_face_gate_fails_closed_on_error() {
        let classifier = FakeClassifier::with(vec![prediction("helmet on", 0.9)]);
        let mut h = harness(
            FakeCamera::new(),
            FakeFaceDetector::failing(),
            classifier.clone(),
            FakeTraining::with_tags(vec![]),
        );

        h.orchestrator.handle_trigger().await;

        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
        let events = collect_events(&mut h.events);
        assert!(events.iter().any(|e| matches!(e, PipelineEvent::NoFaceDetected { .. })));
    }

    #[tokio::test]
    async fn test_predictions_filtered_and_ordered() {
        let classifier = FakeClassifier::with(vec![
            prediction("low", 0.03),
            prediction("high", 0.95),
            prediction("floor", 0.02),
            prediction("noise", 0.001),
        ]);
        let mut h = harness(
            FakeCamera::new(),
            FakeFaceDetector::with_faces(1),
            classifier,
            FakeTraining::with_tags(vec![]),
        );

        h.orchestrator.handle_trigger().await;

        let events = collect_events(&mut h.events);
        let shown = events
            .iter()
            .find_map(|e| match e {
                PipelineEvent::PredictionsReady { predictions, .. } => Some(predictions.clone()),
                _ => None,
            })
            .expect("PredictionsReady emitted");

        let names: Vec<&str> = shown.iter().map(|p| p.tag_name.as_str()).collect();
        assert_eq!(names, vec!["low", "high"]);
        assert_eq!(h.orchestrator.state(), CaptureState::Idle);
    }

    #[tokio::test]
    async fn test_trigger_debounced_while_awaiting_tag() {
        let camera = FakeCamera::new();
        let mut h = harness(
            camera.clone(),
            FakeFaceDetector::with_faces(1),
            FakeClassifier::with(vec![]),
            FakeTraining::with_tags(vec![("1", "helmet on")]),
        );

        h.orchestrator.set_mode(AppMode::Training);
        h.orchestrator.handle_trigger().await;
        assert_eq!(h.orchestrator.state(), CaptureState::AwaitingTagSelection);

        // Re-entrant triggers are no-ops: no second capture
        h.orchestrator.handle_trigger().await;
        h.orchestrator.handle_trigger().await;
        assert_eq!(camera.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.orchestrator.state(), CaptureState::AwaitingTagSelection);

        let events = collect_events(&mut h.events);
        let started = events
            .iter()
            .filter(|e| matches!(e, PipelineEvent::CaptureStarted { .. }))
            .count();
        assert_eq!(started, 1);
    }

    #[tokio::test]
    async fn test_cancel_phrase_resets_without_submission() {
        let training = FakeTraining::with_tags(vec![("1", "helmet on")]);
        let mut h = harness(
            FakeCamera::new(),
            FakeFaceDetector::with_faces(1),
            FakeClassifier::with(vec![]),
            training.clone(),
        );

        h.orchestrator.set_mode(AppMode::Training);
        h.orchestrator.handle_trigger().await;
        h.orchestrator.handle_phrase("cancel").await;

        assert_eq!(h.orchestrator.state(), CaptureState::Idle);
        assert!(!h.orchestrator.voice.is_armed());
        assert!(training.submitted.lock().unwrap().is_empty());
        assert_eq!(training.trained.load(Ordering::SeqCst), 0);

        let events = collect_events(&mut h.events);
        assert!(events.iter().any(|e| matches!(e, PipelineEvent::TrainingCancelled { .. })));
    }

    #[tokio::test]
    async fn test_tag_phrase_resolves_remote_tag_id() {
        let training = FakeTraining::with_tags(vec![("1", "helmet on"), ("2", "helmet off")]);
        let mut h = harness(
            FakeCamera::new(),
            FakeFaceDetector::with_faces(1),
            FakeClassifier::with(vec![]),
            training.clone(),
        );

        h.orchestrator.set_mode(AppMode::Training);
        h.orchestrator.handle_trigger().await;
        h.orchestrator.handle_phrase("helmet on").await;

        let submitted = training.submitted.lock().unwrap().clone();
        assert_eq!(submitted, vec!["1".to_string()]);
        assert_eq!(training.trained.load(Ordering::SeqCst), 1);
        assert_eq!(h.orchestrator.state(), CaptureState::Idle);
    }

    #[tokio::test]
    async fn test_unknown_phrase_keeps_waiting() {
        let mut h = harness(
            FakeCamera::new(),
            FakeFaceDetector::with_faces(1),
            FakeClassifier::with(vec![]),
            FakeTraining::with_tags(vec![("1", "helmet on")]),
        );

        h.orchestrator.set_mode(AppMode::Training);
        h.orchestrator.handle_trigger().await;
        h.orchestrator.handle_phrase("take photo").await;

        assert_eq!(h.orchestrator.state(), CaptureState::AwaitingTagSelection);
    }

    #[tokio::test]
    async fn test_full_training_chain_promotes_and_cleans() {
        let training = FakeTraining::with_tags(vec![("1", "helmet on")]);
        let mut h = harness(
            FakeCamera::new(),
            FakeFaceDetector::with_faces(1),
            FakeClassifier::with(vec![]),
            training.clone(),
        );

        h.orchestrator.set_mode(AppMode::Training);
        h.orchestrator.handle_trigger().await;
        h.orchestrator.handle_phrase("helmet on").await;

        // Exactly one default afterwards, and it is the new iteration
        let iterations = training.iterations.lock().unwrap().clone();
        let defaults: Vec<&Iteration> = iterations.iter().filter(|i| i.is_default).collect();
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].id, "it-new");

        // The superseded iteration was deleted, never the promoted one
        let deleted = training.deleted.lock().unwrap().clone();
        assert_eq!(deleted, vec!["it-old".to_string()]);

        let events = collect_events(&mut h.events);
        assert!(events.iter().any(|e| matches!(e, PipelineEvent::TrainingImageSubmitted { .. })));
        assert!(events.iter().any(|e| matches!(e, PipelineEvent::TrainingCompleted { .. })));
        assert!(events.iter().any(|e| matches!(e, PipelineEvent::IterationPromoted { .. })));
        assert!(events.iter().any(|e| matches!(e, PipelineEvent::IterationDeleted { .. })));
    }

    #[tokio::test]
    async fn test_submission_failure_aborts_chain() {
        let training = FakeTraining::failing_submit(vec![("1", "helmet on")]);
        let mut h = harness(
            FakeCamera::new(),
            FakeFaceDetector::with_faces(1),
            FakeClassifier::with(vec![]),
            training.clone(),
        );

        h.orchestrator.set_mode(AppMode::Training);
        h.orchestrator.handle_trigger().await;
        h.orchestrator.handle_phrase("helmet on").await;

        // Chain aborted before training, orchestrator back to idle
        assert_eq!(training.trained.load(Ordering::SeqCst), 0);
        assert_eq!(h.orchestrator.state(), CaptureState::Idle);

        let events = collect_events(&mut h.events);
        let failed = events.iter().find_map(|e| match e {
            PipelineEvent::PipelineFailed { stage, .. } => Some(stage.clone()),
            _ => None,
        });
        assert_eq!(failed.as_deref(), Some("submit image"));
    }

    #[tokio::test]
    async fn test_mode_switch_ignored_while_busy() {
        let mut h = harness(
            FakeCamera::new(),
            FakeFaceDetector::with_faces(1),
            FakeClassifier::with(vec![]),
            FakeTraining::with_tags(vec![("1", "helmet on")]),
        );

        h.orchestrator.set_mode(AppMode::Training);
        h.orchestrator.handle_trigger().await;
        assert_eq!(h.orchestrator.state(), CaptureState::AwaitingTagSelection);

        h.orchestrator.set_mode(AppMode::Analysis);
        assert_eq!(h.orchestrator.mode(), AppMode::Training);

        h.orchestrator.reset_image_capture();
        h.orchestrator.set_mode(AppMode::Analysis);
        assert_eq!(h.orchestrator.mode(), AppMode::Analysis);
    }

    #[tokio::test]
    async fn test_cancel_handle_scopes_to_current_session() {
        let handle = SessionCancelHandle::new();
        let first = handle.current();

        handle.cancel();
        assert!(first.is_cancelled());

        // A new session gets a fresh token; the stale one stays cancelled
        handle.refresh();
        let second = handle.current();
        assert!(!second.is_cancelled());
        assert!(first.is_cancelled());

        handle.cancel();
        assert!(second.is_cancelled());
    }

    /// Reset arriving while the orchestrator task is awaiting a paced
    /// delay must abort the chain. The command loop is sequential, so
    /// the cancel has to act through the shared handle, not the queued
    /// command.
    #[tokio::test]
    async fn test_reset_during_paced_delay_aborts_chain() {
        let capture_dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(capture_dir.path()).unwrap();
        let training = FakeTraining::with_tags(vec![("1", "helmet on")]);
        let event_bus = EventBus::new(64);
        let mut events = event_bus.subscribe();

        let pacing = PacingConfig {
            submit_delay_secs: 1,
            train_delay_secs: 1,
            promote_delay_secs: 1,
            cleanup_delay_secs: 1,
        };
        let (orchestrator, _status, cancel) = CaptureOrchestrator::new(
            FakeCamera::new(),
            store,
            FakeFaceDetector::with_faces(1),
            FakeClassifier::with(vec![]),
            training.clone(),
            event_bus,
            pacing,
        );

        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(orchestrator.run(rx));

        tx.send(OrchestratorCommand::SetMode(AppMode::Training))
            .await
            .unwrap();
        tx.send(OrchestratorCommand::Trigger).await.unwrap();
        loop {
            let event = events.recv().await.unwrap();
            if matches!(event, PipelineEvent::TagSelectionRequested { .. }) {
                break;
            }
        }

        // Enter the training chain, then reset 100ms into the 1s
        // submit delay
        tx.send(OrchestratorCommand::Phrase("helmet on".to_string()))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        tx.send(OrchestratorCommand::Reset).await.unwrap();

        // The chain unwinds and the pipeline returns to idle
        loop {
            let event = events.recv().await.unwrap();
            if matches!(event, PipelineEvent::BusyChanged { busy: false, .. }) {
                break;
            }
        }

        // Wait past the delay window: nothing may have been submitted
        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert!(training.submitted.lock().unwrap().is_empty());
        assert_eq!(training.trained.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reset_is_safe_from_idle() {
        let mut h = harness(
            FakeCamera::new(),
            FakeFaceDetector::with_faces(0),
            FakeClassifier::with(vec![]),
            FakeTraining::with_tags(vec![]),
        );

        // Must be invokable from any state, including Idle
        h.orchestrator.reset_image_capture();
        h.orchestrator.reset_image_capture();
        assert_eq!(h.orchestrator.state(), CaptureState::Idle);
    }
}
