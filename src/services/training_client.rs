//! Training API client
//!
//! Remote operations against the vision project's training endpoint:
//! tag listing, multipart image submission, train trigger, and the
//! iteration operations the lifecycle manager builds on (patch default,
//! list, delete).
//!
//! Tag resolution is a linear scan of the freshly fetched remote tag
//! list — the remote service is authoritative, nothing is cached. A tag
//! name with no remote match resolves to an empty id; the submission call
//! then fails remotely rather than being pre-validated here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const TRAINING_KEY_HEADER: &str = "Training-Key";
const TRAINING_API_PATH: &str = "customvision/v2.2/Training/projects";
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Training client errors
#[derive(Debug, Error)]
pub enum TrainingError {
    /// Network communication error
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Training API returned error response
    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    /// Failed to parse API response JSON
    #[error("Parse error: {0}")]
    ParseError(String),
}

/// A tag registered on the remote training project
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProjectTag {
    #[serde(alias = "Id")]
    pub id: String,
    #[serde(alias = "Name")]
    pub name: String,
}

/// A trained model version on the remote project
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Iteration {
    #[serde(alias = "Id")]
    pub id: String,
    #[serde(alias = "Name")]
    pub name: String,
    #[serde(rename = "isDefault", alias = "IsDefault", default)]
    pub is_default: bool,
}

/// Image submission response envelope: `{images: [{image: {id}}]}`
#[derive(Debug, Clone, Deserialize)]
pub struct ImageCreateResponse {
    #[serde(alias = "Images", default)]
    pub images: Vec<ImageCreateEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageCreateEntry {
    #[serde(alias = "Image")]
    pub image: CreatedImage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatedImage {
    #[serde(alias = "Id")]
    pub id: String,
}

/// Training endpoint seam
#[async_trait]
pub trait TrainingApi: Send + Sync {
    /// Fetch the project's registered tags
    async fn list_tags(&self) -> Result<Vec<ProjectTag>, TrainingError>;

    /// Submit one image tagged with `tag_id`; returns the created image id
    async fn submit_image(&self, image: Vec<u8>, tag_id: &str) -> Result<String, TrainingError>;

    /// Trigger project training; returns the iteration just created
    async fn train(&self) -> Result<Iteration, TrainingError>;

    /// Patch an iteration record back to the service (promote to default)
    async fn set_default_iteration(&self, iteration: &Iteration) -> Result<(), TrainingError>;

    /// Fetch all iterations of the project
    async fn list_iterations(&self) -> Result<Vec<Iteration>, TrainingError>;

    /// Delete an iteration by id
    async fn delete_iteration(&self, iteration_id: &str) -> Result<(), TrainingError>;
}

/// Resolve a tag name against a remote tag list (linear scan, exact match)
pub fn resolve_tag_id(tags: &[ProjectTag], tag_name: &str) -> String {
    tags.iter()
        .find(|t| t.name == tag_name)
        .map(|t| t.id.clone())
        .unwrap_or_default()
}

/// HTTP client for the remote training endpoint
pub struct TrainingClient {
    http_client: reqwest::Client,
    base_url: String,
    training_key: String,
}

impl TrainingClient {
    pub fn new(
        endpoint: impl Into<String>,
        project_id: impl Into<String>,
        training_key: impl Into<String>,
    ) -> Result<Self, TrainingError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| TrainingError::NetworkError(e.to_string()))?;

        let base_url = format!(
            "{}/{}/{}",
            endpoint.into().trim_end_matches('/'),
            TRAINING_API_PATH,
            project_id.into()
        );

        Ok(Self {
            http_client,
            base_url,
            training_key: training_key.into(),
        })
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, TrainingError> {
        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(TrainingError::ApiError(status.as_u16(), error_text));
        }
        Ok(response)
    }
}

#[async_trait]
impl TrainingApi for TrainingClient {
    async fn list_tags(&self) -> Result<Vec<ProjectTag>, TrainingError> {
        let url = format!("{}/tags", self.base_url);
        tracing::debug!(url = %url, "Fetching project tags");

        let response = self
            .http_client
            .get(&url)
            .header(TRAINING_KEY_HEADER, &self.training_key)
            .send()
            .await
            .map_err(|e| TrainingError::NetworkError(e.to_string()))?;

        let tags: Vec<ProjectTag> = Self::check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| TrainingError::ParseError(e.to_string()))?;

        tracing::info!(count = tags.len(), "Project tag list received");
        Ok(tags)
    }

    async fn submit_image(&self, image: Vec<u8>, tag_id: &str) -> Result<String, TrainingError> {
        let url = format!("{}/images?tagIds={}", self.base_url, tag_id);
        tracing::debug!(url = %url, bytes = image.len(), "Submitting training image");

        let part = reqwest::multipart::Part::bytes(image)
            .file_name("")
            .mime_str("application/octet-stream")
            .map_err(|e| TrainingError::NetworkError(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("imageData", part);

        let response = self
            .http_client
            .post(&url)
            .header(TRAINING_KEY_HEADER, &self.training_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| TrainingError::NetworkError(e.to_string()))?;

        let parsed: ImageCreateResponse = Self::check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| TrainingError::ParseError(e.to_string()))?;

        // The created image id confirms the submission succeeded
        let image_id = parsed
            .images
            .first()
            .map(|entry| entry.image.id.clone())
            .ok_or_else(|| TrainingError::ParseError("No image in submission response".to_string()))?;

        tracing::info!(image_id = %image_id, "Training image accepted");
        Ok(image_id)
    }

    async fn train(&self) -> Result<Iteration, TrainingError> {
        let url = format!("{}/train", self.base_url);
        tracing::debug!(url = %url, "Triggering project training");

        let response = self
            .http_client
            .post(&url)
            .header(TRAINING_KEY_HEADER, &self.training_key)
            // The train endpoint expects an empty form body
            .form(&Vec::<(String, String)>::new())
            .send()
            .await
            .map_err(|e| TrainingError::NetworkError(e.to_string()))?;

        let iteration: Iteration = Self::check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| TrainingError::ParseError(e.to_string()))?;

        tracing::info!(
            iteration_id = %iteration.id,
            iteration_name = %iteration.name,
            "Training produced new iteration"
        );
        Ok(iteration)
    }

    async fn set_default_iteration(&self, iteration: &Iteration) -> Result<(), TrainingError> {
        let url = format!("{}/iterations/{}", self.base_url, iteration.id);
        tracing::debug!(url = %url, "Patching iteration to default");

        let response = self
            .http_client
            .patch(&url)
            .header(TRAINING_KEY_HEADER, &self.training_key)
            .json(iteration)
            .send()
            .await
            .map_err(|e| TrainingError::NetworkError(e.to_string()))?;

        Self::check_status(response).await?;
        Ok(())
    }

    async fn list_iterations(&self) -> Result<Vec<Iteration>, TrainingError> {
        let url = format!("{}/iterations", self.base_url);
        tracing::debug!(url = %url, "Fetching iteration list");

        let response = self
            .http_client
            .get(&url)
            .header(TRAINING_KEY_HEADER, &self.training_key)
            .send()
            .await
            .map_err(|e| TrainingError::NetworkError(e.to_string()))?;

        let iterations: Vec<Iteration> = Self::check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| TrainingError::ParseError(e.to_string()))?;

        tracing::info!(count = iterations.len(), "Iteration list received");
        Ok(iterations)
    }

    async fn delete_iteration(&self, iteration_id: &str) -> Result<(), TrainingError> {
        let url = format!("{}/iterations/{}", self.base_url, iteration_id);
        tracing::debug!(url = %url, "Deleting iteration");

        let response = self
            .http_client
            .delete(&url)
            .header(TRAINING_KEY_HEADER, &self.training_key)
            .send()
            .await
            .map_err(|e| TrainingError::NetworkError(e.to_string()))?;

        Self::check_status(response).await?;
        Ok(())
    }
}
