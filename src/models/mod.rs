//! Data models for helmwatch

pub mod capture_session;
pub mod tags;

pub use capture_session::{AppMode, CaptureSession, CaptureState};
pub use tags::TrainingTag;
