//! Classification (prediction) API client
//!
//! Posts raw image bytes to the prediction endpoint of the remote vision
//! project and parses the returned predictions. Prediction order from the
//! remote service is preserved.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const PREDICTION_KEY_HEADER: &str = "Prediction-Key";
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Display filter floor: predictions at or below this probability are not
/// surfaced. Deliberately inclusive; stricter decision thresholds belong
/// to the display layer.
pub const DISPLAY_PROBABILITY_FLOOR: f64 = 0.02;

/// Prediction client errors
#[derive(Debug, Error)]
pub enum PredictionError {
    /// Network communication error
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Prediction API returned error response
    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    /// Failed to parse API response JSON
    #[error("Parse error: {0}")]
    ParseError(String),
}

/// One tag/probability prediction
///
/// Field aliases accept the PascalCase spelling some service versions
/// emit.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Prediction {
    /// Predicted tag name
    #[serde(rename = "tagName", alias = "TagName")]
    pub tag_name: String,
    /// Confidence in [0, 1]
    #[serde(alias = "Probability")]
    pub probability: f64,
}

/// Prediction endpoint response envelope
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PredictionResponse {
    #[serde(alias = "Predictions")]
    pub predictions: Vec<Prediction>,
}

/// Image classification seam
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classify raw image bytes; predictions in remote response order
    async fn classify(&self, image: &[u8]) -> Result<Vec<Prediction>, PredictionError>;
}

/// HTTP client for the remote prediction endpoint
pub struct PredictionClient {
    http_client: reqwest::Client,
    endpoint: String,
    prediction_key: String,
}

impl PredictionClient {
    pub fn new(endpoint: impl Into<String>, prediction_key: impl Into<String>) -> Result<Self, PredictionError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| PredictionError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: endpoint.into(),
            prediction_key: prediction_key.into(),
        })
    }
}

#[async_trait]
impl Classifier for PredictionClient {
    async fn classify(&self, image: &[u8]) -> Result<Vec<Prediction>, PredictionError> {
        tracing::debug!(url = %self.endpoint, bytes = image.len(), "Posting image for classification");

        let response = self
            .http_client
            .post(&self.endpoint)
            .header(PREDICTION_KEY_HEADER, &self.prediction_key)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(image.to_vec())
            .send()
            .await
            .map_err(|e| PredictionError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(PredictionError::ApiError(status.as_u16(), error_text));
        }

        let parsed: PredictionResponse = response
            .json()
            .await
            .map_err(|e| PredictionError::ParseError(e.to_string()))?;

        tracing::info!(count = parsed.predictions.len(), "Classification response received");

        Ok(parsed.predictions)
    }
}

/// Keep only predictions worth surfacing, preserving response order
pub fn filter_for_display(predictions: Vec<Prediction>) -> Vec<Prediction> {
    predictions
        .into_iter()
        .filter(|p| p.probability > DISPLAY_PROBABILITY_FLOOR)
        .collect()
}
