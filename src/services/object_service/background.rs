use super::{ObjectService, discard_staged};
use crate::models::{DurableObject, StagedObject, ValidatedVideoParams};
use crate::services::{staging::StagingStore, storage::DurableStore, transcoder::Transcoder};
use anyhow::{Context, Result};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use tracing::Instrument;

impl ObjectService {
    /// Detach the durable write (and transcode, when requested) from the request.
    ///
    /// Failures are logged inside the task and never reach the caller. The
    /// staged file is removed as the last step whatever the outcome.
    pub(super) fn spawn_persist(
        &self,
        staged: StagedObject,
        object: DurableObject,
        transcode: Option<ValidatedVideoParams>,
    ) {
        let staging = self.staging.clone();
        let durable = self.durable.clone();
        let transcoder = self.transcoder.clone();
        let span = tracing::info_span!(
            "persist",
            scope_id = %object.scope_id,
            object_id = %staged.id,
            key = %object.key,
        );

        self.background.spawn(
            async move {
                let outcome = AssertUnwindSafe(persist(
                    staging.as_ref(),
                    durable.as_ref(),
                    transcoder.as_ref(),
                    &staged,
                    &object,
                    transcode.as_ref(),
                ))
                .catch_unwind()
                .await;

                match outcome {
                    Ok(Ok(stored)) => tracing::info!(
                        "✅ Persisted (version {})",
                        stored.version.as_deref().unwrap_or("-")
                    ),
                    Ok(Err(e)) => tracing::error!("❌ Background write failed: {:#}", e),
                    Err(_) => tracing::error!("❌ Background write panicked"),
                }

                discard_staged(staging.as_ref(), &staged).await;
            }
            .instrument(span),
        );
    }
}

async fn persist(
    staging: &dyn StagingStore,
    durable: &dyn DurableStore,
    transcoder: &dyn Transcoder,
    staged: &StagedObject,
    object: &DurableObject,
    transcode: Option<&ValidatedVideoParams>,
) -> Result<DurableObject> {
    let content = staging.open_for_read(staged).await?;
    let stored = durable
        .put(object, content)
        .await
        .context("Durable write failed")?;

    if let Some(params) = transcode {
        let job = transcoder
            .create_job(&stored, params)
            .await
            .context("Transcode request failed")?;
        tracing::info!("🎬 Transcode job {} submitted", job.job_id);
    }

    Ok(stored)
}
