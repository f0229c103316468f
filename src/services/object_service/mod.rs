use crate::models::StagedObject;
use crate::services::{staging::StagingStore, storage::DurableStore, transcoder::Transcoder};
use std::sync::Arc;
use tokio_util::task::TaskTracker;

mod background;
pub mod put;
pub mod types;

pub use types::PutObjectOutcome;

/// Write orchestrator: stages, deduplicates and persists uploaded objects.
///
/// Durable writes and transcode requests run as detached continuations on
/// `background`; callers never wait for them.
pub struct ObjectService {
    staging: Arc<dyn StagingStore>,
    durable: Arc<dyn DurableStore>,
    transcoder: Arc<dyn Transcoder>,
    background: TaskTracker,
}

impl ObjectService {
    pub fn new(
        staging: Arc<dyn StagingStore>,
        durable: Arc<dyn DurableStore>,
        transcoder: Arc<dyn Transcoder>,
    ) -> Self {
        Self {
            staging,
            durable,
            transcoder,
            background: TaskTracker::new(),
        }
    }

    pub fn durable(&self) -> &Arc<dyn DurableStore> {
        &self.durable
    }

    /// Number of background continuations still running.
    pub fn pending_background(&self) -> usize {
        self.background.len()
    }

    /// Waits until every background continuation spawned so far has finished.
    pub async fn wait_for_background(&self) {
        self.background.close();
        self.background.wait().await;
        self.background.reopen();
    }

    async fn discard(&self, staged: &StagedObject) {
        discard_staged(self.staging.as_ref(), staged).await;
    }
}

/// Best-effort removal of a staged file. Failures are logged, never propagated.
async fn discard_staged(staging: &dyn StagingStore, staged: &StagedObject) {
    if let Err(e) = staging.remove(staged).await {
        tracing::warn!(
            scope_id = %staged.scope_id,
            staged_id = %staged.id,
            "Failed to remove staged file: {:#}",
            e
        );
    }
}
