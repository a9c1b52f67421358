//! Iteration lifecycle manager
//!
//! The remote project holds a limited number of trained iterations, so
//! after each successful training run the freshly trained iteration is
//! promoted to project default and one stale iteration is retired.
//!
//! Each step follows a fixed settle delay: the remote training job is
//! eventually consistent and patches issued too early are rejected.
//!
//! Retention policy: the cleanup scan deletes the *first* iteration whose
//! `is_default` is false — not necessarily the one just superseded — and
//! deletes at most one per cycle. With one training run producing one
//! stale iteration this keeps the count stable; if quota pressure ever
//! produces more than one stale iteration per cycle, cleanup falls
//! behind. Preserved as observed behavior rather than redesigned.

use crate::events::{EventBus, PipelineEvent};
use crate::services::training_client::{Iteration, TrainingApi, TrainingError};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Lifecycle manager errors
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// Underlying training API call failed
    #[error(transparent)]
    Api(#[from] TrainingError),

    /// The pending delay was cancelled by a session reset
    #[error("Lifecycle step cancelled")]
    Cancelled,
}

/// Promotes the newest iteration and retires one stale iteration per cycle
pub struct IterationLifecycleManager {
    api: Arc<dyn TrainingApi>,
    event_bus: EventBus,
    /// Settle delay before the promote PATCH
    promote_delay: Duration,
    /// Settle delay before the cleanup scan
    cleanup_delay: Duration,
}

impl IterationLifecycleManager {
    pub fn new(
        api: Arc<dyn TrainingApi>,
        event_bus: EventBus,
        promote_delay: Duration,
        cleanup_delay: Duration,
    ) -> Self {
        Self {
            api,
            event_bus,
            promote_delay,
            cleanup_delay,
        }
    }

    /// Promote `iteration` to default, then delete the first stale
    /// iteration. Both settle delays honor the session cancel token.
    pub async fn promote_and_clean(
        &self,
        iteration: Iteration,
        cancel: &CancellationToken,
    ) -> Result<(), LifecycleError> {
        self.settle(self.promote_delay, cancel).await?;

        // Promote: mark default and patch the record back
        let mut promoted = iteration;
        promoted.is_default = true;
        self.api.set_default_iteration(&promoted).await?;

        info!(iteration_id = %promoted.id, "Iteration promoted to default");
        self.event_bus.emit_lossy(PipelineEvent::IterationPromoted {
            iteration_id: promoted.id.clone(),
            timestamp: chrono::Utc::now(),
        });

        self.settle(self.cleanup_delay, cancel).await?;

        // Clean: first non-default iteration, one deletion per cycle.
        // The just-promoted id is excluded in case the remote list is
        // stale within the consistency window.
        let iterations = self.api.list_iterations().await?;
        let stale = iterations
            .iter()
            .find(|i| !i.is_default && i.id != promoted.id);

        match stale {
            Some(stale) => {
                info!(
                    iteration_id = %stale.id,
                    iteration_name = %stale.name,
                    "Deleting stale iteration"
                );
                self.api.delete_iteration(&stale.id).await?;
                self.event_bus.emit_lossy(PipelineEvent::IterationDeleted {
                    iteration_id: stale.id.clone(),
                    timestamp: chrono::Utc::now(),
                });
            }
            None => {
                warn!("No stale iteration to delete");
            }
        }

        Ok(())
    }

    /// Cancellable fixed delay (eventual-consistency settle window)
    async fn settle(&self, delay: Duration, cancel: &CancellationToken) -> Result<(), LifecycleError> {
        tokio::select! {
            _ = tokio::time::sleep(delay) => Ok(()),
            _ = cancel.cancelled() => Err(LifecycleError::Cancelled),
        }
    }
}
