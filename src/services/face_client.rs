//! Face detection API client
//!
//! Posts raw image bytes to the remote face detection endpoint and parses
//! the detected face records. The gate decision itself (proceed to
//! classification vs short-circuit to "no face") belongs to the capture
//! orchestrator; transport and parse failures are reported as errors and
//! the orchestrator fails closed on them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Face detection client errors
#[derive(Debug, Error)]
pub enum FaceError {
    /// Network communication error
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Detection API returned error response
    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    /// Failed to parse API response JSON
    #[error("Parse error: {0}")]
    ParseError(String),
}

/// One detected face record
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DetectedFace {
    /// Service-assigned face identifier
    #[serde(rename = "faceId")]
    pub face_id: String,
    /// Bounding box of the face within the image
    #[serde(rename = "faceRectangle")]
    pub face_rectangle: FaceRectangle,
}

/// Face bounding box (pixels)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FaceRectangle {
    pub top: i32,
    pub left: i32,
    pub width: i32,
    pub height: i32,
}

/// Face presence detection seam
#[async_trait]
pub trait FaceDetector: Send + Sync {
    /// Detect faces in raw image bytes; possibly-empty list on success
    async fn detect_faces(&self, image: &[u8]) -> Result<Vec<DetectedFace>, FaceError>;
}

/// HTTP client for the remote face detection endpoint
pub struct FaceClient {
    http_client: reqwest::Client,
    endpoint: String,
    subscription_key: String,
}

impl FaceClient {
    pub fn new(endpoint: impl Into<String>, subscription_key: impl Into<String>) -> Result<Self, FaceError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| FaceError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: endpoint.into(),
            subscription_key: subscription_key.into(),
        })
    }
}

#[async_trait]
impl FaceDetector for FaceClient {
    async fn detect_faces(&self, image: &[u8]) -> Result<Vec<DetectedFace>, FaceError> {
        let url = format!("{}/detect", self.endpoint.trim_end_matches('/'));

        tracing::debug!(url = %url, bytes = image.len(), "Posting image for face detection");

        let response = self
            .http_client
            .post(&url)
            .header(SUBSCRIPTION_KEY_HEADER, &self.subscription_key)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(image.to_vec())
            .send()
            .await
            .map_err(|e| FaceError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(FaceError::ApiError(status.as_u16(), error_text));
        }

        let faces: Vec<DetectedFace> = response
            .json()
            .await
            .map_err(|e| FaceError::ParseError(e.to_string()))?;

        tracing::info!(count = faces.len(), "Face detection response received");
        for face in &faces {
            tracing::debug!(
                face_id = %face.face_id,
                top = face.face_rectangle.top,
                left = face.face_rectangle.left,
                width = face.face_rectangle.width,
                height = face.face_rectangle.height,
                "Detected face"
            );
        }

        Ok(faces)
    }
}
