//! Capture image storage
//!
//! Captured images are written under the application's private capture
//! directory as sequentially numbered JPEG files. The directory is cleared
//! at process start; individual deletion failures are logged and skipped.
//!
//! Also provides the byte-payload read used by every network-facing
//! component: an image asset is read exactly once into an owned buffer and
//! never mutated afterwards.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Image storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Capture directory cannot be created
    #[error("Cannot create capture directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    /// Image asset cannot be read
    #[error("Cannot read image {0}: {1}")]
    ReadImage(PathBuf, std::io::Error),
}

/// Sequentially numbered capture storage
pub struct ImageStore {
    dir: PathBuf,
    sequence: u32,
}

impl ImageStore {
    /// Open capture storage under `dir`, creating the directory if missing
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| StoreError::CreateDir(dir.clone(), e))?;
        Ok(Self { dir, sequence: 0 })
    }

    /// Capture directory path
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Delete all files left over from previous runs.
    ///
    /// Files that cannot be deleted are skipped with a warning, matching
    /// the tolerant cleanup the capture surface has always done.
    pub fn clear(&self) {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %self.dir.display(), "Cannot list capture directory: {}", e);
                return;
            }
        };

        let mut removed = 0usize;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() {
                match std::fs::remove_file(&path) {
                    Ok(()) => removed += 1,
                    Err(e) => warn!(file = %path.display(), "Cannot delete file: {}", e),
                }
            }
        }
        debug!(dir = %self.dir.display(), removed, "Cleared capture storage");
    }

    /// Reserve the path for the next capture and advance the sequence
    pub fn next_image_path(&mut self) -> (u32, PathBuf) {
        let sequence = self.sequence;
        self.sequence += 1;
        let path = self.dir.join(format!("CapturedImage{}.jpg", sequence));
        (sequence, path)
    }

    /// Read a stored image asset into a byte payload
    pub fn read_image(path: &Path) -> Result<Vec<u8>, StoreError> {
        std::fs::read(path).map_err(|e| StoreError::ReadImage(path.to_path_buf(), e))
    }
}
