//! Camera capture surface
//!
//! The pipeline only needs a "take photo" primitive that produces a stored
//! image asset at a requested path, plus the capture resolution capability.
//! The `Camera` trait is that seam; `FolderCamera` is the headless
//! implementation used in deployment, serving the newest frame dropped
//! into a feed directory by the device's capture process.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Camera capture errors
#[derive(Debug, Error)]
pub enum CameraError {
    /// No frame available to capture
    #[error("No frame available in {0}")]
    NoFrame(PathBuf),

    /// Frame could not be stored at the requested path
    #[error("Cannot store captured frame: {0}")]
    Store(#[from] std::io::Error),
}

/// Photo capture primitive
#[async_trait]
pub trait Camera: Send + Sync {
    /// Best supported capture resolution (width, height)
    fn resolution(&self) -> (u32, u32);

    /// Capture one photo and store it at `dest`
    async fn take_photo(&self, dest: &Path) -> Result<(), CameraError>;
}

/// Camera backed by a frame feed directory.
///
/// The device-side capture process writes frames into the feed directory;
/// taking a photo copies the most recently modified frame to the capture
/// path.
pub struct FolderCamera {
    feed_dir: PathBuf,
    resolution: (u32, u32),
}

impl FolderCamera {
    pub fn new(feed_dir: impl Into<PathBuf>, resolution: (u32, u32)) -> Self {
        Self {
            feed_dir: feed_dir.into(),
            resolution,
        }
    }

    /// Most recently modified file in the feed directory
    fn newest_frame(&self) -> Result<PathBuf, CameraError> {
        let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;

        for entry in std::fs::read_dir(&self.feed_dir)?.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let modified = entry.metadata()?.modified()?;
            match &newest {
                Some((best, _)) if *best >= modified => {}
                _ => newest = Some((modified, path)),
            }
        }

        newest
            .map(|(_, path)| path)
            .ok_or_else(|| CameraError::NoFrame(self.feed_dir.clone()))
    }
}

#[async_trait]
impl Camera for FolderCamera {
    fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    async fn take_photo(&self, dest: &Path) -> Result<(), CameraError> {
        let frame = self.newest_frame()?;
        let dest = dest.to_path_buf();

        debug!(frame = %frame.display(), dest = %dest.display(), "Capturing photo");

        // Blocking copy kept off the async executor
        tokio::task::spawn_blocking(move || std::fs::copy(&frame, &dest).map(|_| ()))
            .await
            .map_err(|e| CameraError::Store(std::io::Error::new(std::io::ErrorKind::Other, e)))??;

        Ok(())
    }
}
