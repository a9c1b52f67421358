//! helmwatch - headset capture pipeline service
//!
//! Sequences camera captures through a face gate into remote image
//! classification, and drives the voice-selected training loop that
//! keeps the remote model's newest iteration promoted and its stale
//! iterations cleaned up.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use helmwatch::config::Config;
use helmwatch::events::EventBus;
use helmwatch::services::{
    CaptureOrchestrator, FaceClient, FolderCamera, ImageStore, PredictionClient, TrainingClient,
};
use helmwatch::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing, RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting helmwatch capture pipeline service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;

    // Capture store starts from a clean slate each run; image numbering
    // restarts at CapturedImage0.jpg
    let mut store = ImageStore::new(&config.capture_dir)?;
    store.clear();
    info!("Capture store: {}", config.capture_dir.display());

    std::fs::create_dir_all(&config.camera_feed_dir)?;
    let camera = Arc::new(FolderCamera::new(
        &config.camera_feed_dir,
        config.camera_resolution,
    ));
    info!(
        "Camera feed: {} ({}x{})",
        config.camera_feed_dir.display(),
        config.camera_resolution.0,
        config.camera_resolution.1
    );

    let face = Arc::new(FaceClient::new(
        &config.face_endpoint,
        &config.face_subscription_key,
    )?);
    let classifier = Arc::new(PredictionClient::new(
        &config.prediction_endpoint,
        &config.prediction_key,
    )?);
    let training = Arc::new(TrainingClient::new(
        &config.training_endpoint,
        &config.training_project_id,
        &config.training_key,
    )?);

    // Event bus for SSE broadcasting
    let event_bus = EventBus::new(100);

    let (command_tx, command_rx) = mpsc::channel(32);
    let (orchestrator, status_rx, session_cancel) = CaptureOrchestrator::new(
        camera,
        store,
        face,
        classifier,
        training,
        event_bus.clone(),
        config.pacing.clone(),
    );
    tokio::spawn(orchestrator.run(command_rx));

    let state = AppState::new(command_tx, event_bus, status_rx, session_cancel);
    let app = helmwatch::build_router(state);

    let addr = format!("{}:{}", config.listen_host, config.listen_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
