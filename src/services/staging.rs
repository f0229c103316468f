use crate::models::{ObjectReader, StagedObject};
use crate::utils::hash::hash_and_copy;
use crate::utils::validation::is_valid_key_segment;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use std::path::PathBuf;
use uuid::Uuid;

/// Local scratch storage for uploads in flight.
#[async_trait]
pub trait StagingStore: Send + Sync {
    /// Streams `source` to a fresh scratch file while hashing it.
    async fn stage(&self, scope_id: &str, source: ObjectReader) -> Result<StagedObject>;

    /// Reopens a staged file for re-upload.
    async fn open_for_read(&self, obj: &StagedObject) -> Result<ObjectReader>;

    /// Deletes a staged file.
    async fn remove(&self, obj: &StagedObject) -> Result<()>;
}

/// Stages uploads as `<root>/<scope_id>/<id>` on the local filesystem.
pub struct LocalStagingStore {
    root: PathBuf,
}

impl LocalStagingStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl StagingStore for LocalStagingStore {
    async fn stage(&self, scope_id: &str, mut source: ObjectReader) -> Result<StagedObject> {
        if !is_valid_key_segment(scope_id) {
            return Err(anyhow!("Invalid scope id for staging: '{}'", scope_id));
        }

        let id = Uuid::new_v4().to_string();
        let dir = self.root.join(scope_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create staging directory {}", dir.display()))?;

        let local_path = dir.join(&id);
        let mut file = tokio::fs::File::create(&local_path)
            .await
            .with_context(|| format!("Failed to create staged file {}", local_path.display()))?;

        match hash_and_copy(&mut source, &mut file).await {
            Ok((content_hash, size)) => {
                tracing::debug!(
                    "Staged {} bytes for scope {} at {}",
                    size,
                    scope_id,
                    local_path.display()
                );
                Ok(StagedObject {
                    id,
                    scope_id: scope_id.to_string(),
                    local_path,
                    content_hash,
                    size,
                })
            }
            Err(e) => {
                // Never leave a partial file behind: no StagedObject exists for anyone else to clean up.
                drop(file);
                if let Err(rm) = tokio::fs::remove_file(&local_path).await {
                    tracing::warn!(
                        "Failed to remove partial staged file {}: {}",
                        local_path.display(),
                        rm
                    );
                }
                Err(e)
            }
        }
    }

    async fn open_for_read(&self, obj: &StagedObject) -> Result<ObjectReader> {
        let file = tokio::fs::File::open(&obj.local_path)
            .await
            .with_context(|| format!("Failed to open staged file {}", obj.local_path.display()))?;
        Ok(Box::new(file))
    }

    async fn remove(&self, obj: &StagedObject) -> Result<()> {
        tokio::fs::remove_file(&obj.local_path)
            .await
            .with_context(|| format!("Failed to remove staged file {}", obj.local_path.display()))
    }
}
