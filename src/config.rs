//! Configuration loading
//!
//! Two-tier resolution with ENV → TOML priority: every secret and
//! endpoint can come from a `HELMWATCH_*` environment variable, with a
//! TOML config file as the fallback. Non-secret knobs (paths, pacing)
//! live in the TOML file only.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Fixed settle delays between remote pipeline steps, in seconds.
///
/// The remote project needs time to register a submitted image before
/// training, and to finish training before an iteration can be
/// promoted; these delays pace the chain accordingly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    pub submit_delay_secs: u64,
    pub train_delay_secs: u64,
    pub promote_delay_secs: u64,
    pub cleanup_delay_secs: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            submit_delay_secs: 2,
            train_delay_secs: 2,
            promote_delay_secs: 5,
            cleanup_delay_secs: 5,
        }
    }
}

impl PacingConfig {
    /// Zero-delay pacing for tests
    pub fn immediate() -> Self {
        Self {
            submit_delay_secs: 0,
            train_delay_secs: 0,
            promote_delay_secs: 0,
            cleanup_delay_secs: 0,
        }
    }

    pub fn submit_delay(&self) -> Duration {
        Duration::from_secs(self.submit_delay_secs)
    }

    pub fn train_delay(&self) -> Duration {
        Duration::from_secs(self.train_delay_secs)
    }

    pub fn promote_delay(&self) -> Duration {
        Duration::from_secs(self.promote_delay_secs)
    }

    pub fn cleanup_delay(&self) -> Duration {
        Duration::from_secs(self.cleanup_delay_secs)
    }
}

/// Face API connection settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FaceConfig {
    pub endpoint: Option<String>,
    pub subscription_key: Option<String>,
}

/// Prediction endpoint connection settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    pub endpoint: Option<String>,
    pub prediction_key: Option<String>,
}

/// Training API connection settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub endpoint: Option<String>,
    pub training_key: Option<String>,
    pub project_id: Option<String>,
}

/// Raw TOML config file contents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Directory for sequentially numbered captured images
    pub capture_dir: Option<String>,
    /// Directory the folder-backed camera draws frames from
    pub camera_feed_dir: Option<String>,
    pub camera_width: Option<u32>,
    pub camera_height: Option<u32>,
    pub listen_host: Option<String>,
    pub listen_port: Option<u16>,
    pub face: FaceConfig,
    pub prediction: PredictionConfig,
    pub training: TrainingConfig,
    pub pacing: PacingConfig,
}

/// Fully resolved runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub capture_dir: PathBuf,
    pub camera_feed_dir: PathBuf,
    pub camera_resolution: (u32, u32),
    pub listen_host: String,
    pub listen_port: u16,
    pub face_endpoint: String,
    pub face_subscription_key: String,
    pub prediction_endpoint: String,
    pub prediction_key: String,
    pub training_endpoint: String,
    pub training_key: String,
    pub training_project_id: String,
    pub pacing: PacingConfig,
}

impl Config {
    /// Load the TOML config file (if any) and resolve every setting
    /// with ENV → TOML priority.
    pub fn load() -> Result<Self> {
        let toml_config = load_toml_config()?;

        let capture_dir = resolve_optional("HELMWATCH_CAPTURE_DIR", toml_config.capture_dir.clone())
            .map(PathBuf::from)
            .unwrap_or_else(default_capture_dir);
        let camera_feed_dir =
            resolve_optional("HELMWATCH_CAMERA_FEED_DIR", toml_config.camera_feed_dir.clone())
                .map(PathBuf::from)
                .unwrap_or_else(|| capture_dir.join("feed"));

        Ok(Self {
            capture_dir,
            camera_feed_dir,
            camera_resolution: (
                toml_config.camera_width.unwrap_or(1280),
                toml_config.camera_height.unwrap_or(720),
            ),
            listen_host: resolve_optional("HELMWATCH_LISTEN_HOST", toml_config.listen_host.clone())
                .unwrap_or_else(|| "127.0.0.1".to_string()),
            listen_port: std::env::var("HELMWATCH_LISTEN_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .or(toml_config.listen_port)
                .unwrap_or(5780),
            face_endpoint: resolve_required(
                "HELMWATCH_FACE_ENDPOINT",
                toml_config.face.endpoint.clone(),
                "face.endpoint",
            )?,
            face_subscription_key: resolve_required(
                "HELMWATCH_FACE_KEY",
                toml_config.face.subscription_key.clone(),
                "face.subscription_key",
            )?,
            prediction_endpoint: resolve_required(
                "HELMWATCH_PREDICTION_ENDPOINT",
                toml_config.prediction.endpoint.clone(),
                "prediction.endpoint",
            )?,
            prediction_key: resolve_required(
                "HELMWATCH_PREDICTION_KEY",
                toml_config.prediction.prediction_key.clone(),
                "prediction.prediction_key",
            )?,
            training_endpoint: resolve_required(
                "HELMWATCH_TRAINING_ENDPOINT",
                toml_config.training.endpoint.clone(),
                "training.endpoint",
            )?,
            training_key: resolve_required(
                "HELMWATCH_TRAINING_KEY",
                toml_config.training.training_key.clone(),
                "training.training_key",
            )?,
            training_project_id: resolve_required(
                "HELMWATCH_TRAINING_PROJECT_ID",
                toml_config.training.project_id.clone(),
                "training.project_id",
            )?,
            pacing: toml_config.pacing,
        })
    }
}

/// Resolve a required setting with ENV → TOML priority
fn resolve_required(env_var: &str, toml_value: Option<String>, toml_key: &str) -> Result<String> {
    let env_value = std::env::var(env_var).ok().filter(|v| is_valid_value(v));
    let toml_value = toml_value.filter(|v| is_valid_value(v));

    if env_value.is_some() && toml_value.is_some() {
        warn!(
            "{} set in both environment and TOML config. Using environment (highest priority).",
            toml_key
        );
    }

    if let Some(value) = env_value {
        info!("{} loaded from environment variable {}", toml_key, env_var);
        return Ok(value);
    }
    if let Some(value) = toml_value {
        info!("{} loaded from TOML config", toml_key);
        return Ok(value);
    }

    Err(Error::Config(format!(
        "{} not configured. Set the {} environment variable or add {} to the config file.",
        toml_key, env_var, toml_key
    )))
}

fn resolve_optional(env_var: &str, toml_value: Option<String>) -> Option<String> {
    std::env::var(env_var)
        .ok()
        .filter(|v| is_valid_value(v))
        .or(toml_value.filter(|v| is_valid_value(v)))
}

/// Validate a setting value (non-empty, non-whitespace)
pub fn is_valid_value(value: &str) -> bool {
    !value.trim().is_empty()
}

/// Locate and parse the TOML config file. A missing file is not an
/// error; every setting then resolves from the environment or defaults.
fn load_toml_config() -> Result<TomlConfig> {
    let Some(path) = find_config_file() else {
        info!("No config file found, using environment and defaults");
        return Ok(TomlConfig::default());
    };

    let content = std::fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("Read config file failed: {}", e)))?;
    let config = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse config file failed: {}", e)))?;
    info!("Config file loaded from {}", path.display());
    Ok(config)
}

/// Config file search order:
/// 1. `HELMWATCH_CONFIG` environment variable
/// 2. `~/.config/helmwatch/config.toml`
/// 3. `/etc/helmwatch/config.toml` (Linux)
fn find_config_file() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("HELMWATCH_CONFIG") {
        return Some(PathBuf::from(path));
    }

    if let Some(path) = dirs::config_dir().map(|d| d.join("helmwatch").join("config.toml")) {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/helmwatch/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

fn default_capture_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("helmwatch").join("captures"))
        .unwrap_or_else(|| PathBuf::from("./helmwatch_captures"))
}
