use super::{ObjectService, PutObjectOutcome};
use crate::api::error::AppError;
use crate::models::{DurableObject, PutObjectRequest, Scope, StorageClass};
use crate::utils::validation::{
    looks_like_video, validate_for_write, validate_key, validate_video_params,
};

impl ObjectService {
    /// Stage, deduplicate and schedule the durable write of one object.
    ///
    /// Returns `200` with the stored object when identical content already
    /// exists under the key, otherwise `201` with the merged object while the
    /// durable write (and optional transcode) continues in the background.
    /// The staged file is removed on every path that creates one.
    pub async fn put_object(
        &self,
        scope: &Scope,
        request: PutObjectRequest,
    ) -> Result<PutObjectOutcome, AppError> {
        let PutObjectRequest {
            key,
            content_type,
            storage_class,
            video_processing_params,
            read_stream,
        } = request;

        let provisional = DurableObject::provisional(scope, &key, &content_type);
        validate_key(&provisional.key)?;

        let video = video_processing_params
            .as_ref()
            .map(validate_video_params)
            .transpose()?;

        // Both are polled together; a failure in one does not cancel the other.
        let (probed, staged) = tokio::join!(
            self.durable.probe(&provisional),
            self.staging.stage(&scope.id, read_stream),
        );

        let staged = staged.map_err(AppError::staging_failed)?;
        let probed = match probed {
            Ok(probed) => probed,
            Err(e) => {
                self.discard(&staged).await;
                return Err(AppError::operational(
                    "Failed to probe durable store",
                    "PROBE_FAILED",
                    e,
                ));
            }
        };

        if let Some(existing) = probed
            .as_ref()
            .filter(|found| found.content_hash.as_deref() == Some(staged.content_hash.as_str()))
        {
            tracing::info!(
                "♻️ Identical content already stored at {}/{}, skipping write",
                scope.id,
                key
            );
            self.discard(&staged).await;
            return Ok(PutObjectOutcome::unchanged(existing.clone()));
        }

        let merged = probed.unwrap_or(provisional).with_staged(&staged);
        let wants_transcode = looks_like_video(&content_type) && video.is_some();

        let storage_class = match validate_for_write(&merged, &storage_class) {
            Ok(class) => class,
            Err(errors) => {
                self.discard(&staged).await;
                return Err(errors.into());
            }
        };
        if wants_transcode && storage_class != StorageClass::FastAccess {
            self.discard(&staged).await;
            return Err(AppError::Unprocessable(format!(
                "Video processing requires storage class {}, got {}",
                StorageClass::FastAccess,
                storage_class
            )));
        }

        let merged = merged.with_storage_class(storage_class);
        let transcode = if wants_transcode { video } else { None };

        tracing::info!(
            "📥 Accepted {} ({} bytes) for {}/{}",
            staged.id,
            staged.size,
            scope.id,
            key
        );
        self.spawn_persist(staged, merged.clone(), transcode);

        Ok(PutObjectOutcome::created(merged))
    }
}
