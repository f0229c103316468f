use crate::config::IngestConfig;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tokio::time::sleep;

/// Files and directories removed by one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub removed_files: usize,
    pub removed_dirs: usize,
}

/// Periodically removes staged files left behind by failed cleanups.
pub struct StagingSweeper {
    root: PathBuf,
    max_age: Duration,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl StagingSweeper {
    pub fn new(
        root: impl Into<PathBuf>,
        max_age: Duration,
        interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            root: root.into(),
            max_age,
            interval,
            shutdown,
        }
    }

    pub fn from_config(config: &IngestConfig, shutdown: watch::Receiver<bool>) -> Self {
        Self::new(
            &config.staging_root,
            Duration::from_secs(config.staging_cleanup_age_hours * 3600),
            Duration::from_secs(config.staging_sweep_interval_secs),
            shutdown,
        )
    }

    pub async fn run(mut self) {
        tracing::info!("🚀 Staging sweeper started for {}", self.root.display());

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    tracing::info!("🛑 Staging sweeper shutting down");
                    break;
                }
                _ = sleep(self.interval) => {
                    match self.sweep().await {
                        Ok(stats) if stats == SweepStats::default() => {}
                        Ok(stats) => tracing::info!(
                            "🧹 Swept {} orphaned staged file(s) and {} empty dir(s)",
                            stats.removed_files,
                            stats.removed_dirs
                        ),
                        Err(e) => tracing::error!("Staging sweep failed: {:#}", e),
                    }
                }
            }
        }
    }

    /// Remove staged files older than `max_age`, then empty scope directories
    /// that are themselves older than `max_age`.
    pub async fn sweep(&self) -> Result<SweepStats> {
        let mut stats = SweepStats::default();

        let mut scopes = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(stats),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read staging root {}", self.root.display())
                });
            }
        };

        while let Some(scope) = scopes.next_entry().await? {
            if !scope.file_type().await?.is_dir() {
                continue;
            }
            let dir = scope.path();
            stats.removed_files += self.sweep_scope(&dir).await?;

            // A fresh directory may be about to receive its first staged file.
            if self.is_expired(&dir).await && tokio::fs::remove_dir(&dir).await.is_ok() {
                stats.removed_dirs += 1;
            }
        }

        Ok(stats)
    }

    async fn sweep_scope(&self, dir: &Path) -> Result<usize> {
        let mut removed = 0;
        let mut files = tokio::fs::read_dir(dir)
            .await
            .with_context(|| format!("Failed to read staging directory {}", dir.display()))?;

        while let Some(file) = files.next_entry().await? {
            let path = file.path();
            if !file.file_type().await?.is_file() || !self.is_expired(&path).await {
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    tracing::debug!("Removed orphaned staged file {}", path.display());
                    removed += 1;
                }
                // Cleaned up concurrently by its owning request
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("Failed to remove {}: {}", path.display(), e),
            }
        }

        Ok(removed)
    }

    async fn is_expired(&self, path: &Path) -> bool {
        let Ok(modified) = tokio::fs::metadata(path).await.and_then(|m| m.modified()) else {
            return false;
        };
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);
        age >= self.max_age
    }
}
