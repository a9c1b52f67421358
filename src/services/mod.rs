//! Pipeline services
//!
//! Remote API clients, the local capture plumbing, and the orchestrator
//! that sequences them.

pub mod camera;
pub mod face_client;
pub mod image_store;
pub mod iteration_manager;
pub mod orchestrator;
pub mod prediction_client;
pub mod training_client;
pub mod voice_router;

pub use camera::{Camera, FolderCamera};
pub use face_client::{FaceClient, FaceDetector};
pub use image_store::ImageStore;
pub use iteration_manager::IterationLifecycleManager;
pub use orchestrator::{
    CaptureOrchestrator, OrchestratorCommand, OrchestratorStatus, SessionCancelHandle,
};
pub use prediction_client::{Classifier, PredictionClient};
pub use training_client::{TrainingApi, TrainingClient};
pub use voice_router::VoiceCommandRouter;
