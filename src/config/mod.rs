use std::env;
use std::path::PathBuf;

/// Runtime configuration for the ingestion service
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Deployment environment, first segment of every durable key (default: "development")
    pub environment: String,

    /// Root directory for staged uploads (default: <tmp>/object-ingest-staging)
    pub staging_root: PathBuf,

    /// Part size for streaming durable writes in bytes (default: 10 MB)
    pub upload_part_size: usize,

    /// Transcoder type: "http" or "noop" (default: "noop")
    pub transcoder_type: String,

    /// Base URL of the transcoding service
    pub transcoder_url: Option<String>,

    /// Staged files older than this are swept (default: 24)
    pub staging_cleanup_age_hours: u64,

    /// Interval between staging sweeps in seconds (default: 3600)
    pub staging_sweep_interval_secs: u64,

    /// Maximum accepted request body in bytes (default: 5 GB)
    pub max_request_bytes: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            staging_root: env::temp_dir().join("object-ingest-staging"),
            upload_part_size: 10 * 1024 * 1024, // 10 MB
            transcoder_type: "noop".to_string(),
            transcoder_url: None,
            staging_cleanup_age_hours: 24,
            staging_sweep_interval_secs: 3600,
            max_request_bytes: 5 * 1024 * 1024 * 1024, // 5 GB
        }
    }
}

impl IngestConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            environment: env::var("INGEST_ENVIRONMENT").unwrap_or(default.environment),

            staging_root: env::var("STAGING_ROOT")
                .map(PathBuf::from)
                .unwrap_or(default.staging_root),

            upload_part_size: env::var("UPLOAD_PART_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                // S3 rejects non-final parts under 5 MB
                .filter(|size| *size >= 5 * 1024 * 1024)
                .unwrap_or(default.upload_part_size),

            transcoder_type: env::var("TRANSCODER_TYPE").unwrap_or(default.transcoder_type),

            transcoder_url: env::var("TRANSCODER_URL")
                .ok()
                .filter(|v| !v.trim().is_empty()),

            staging_cleanup_age_hours: env::var("STAGING_CLEANUP_AGE_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.staging_cleanup_age_hours),

            staging_sweep_interval_secs: env::var("STAGING_SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|secs| *secs > 0)
                .unwrap_or(default.staging_sweep_interval_secs),

            max_request_bytes: env::var("MAX_REQUEST_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_request_bytes),
        }
    }

    /// Config for local development and tests (no transcoder, staging under the given root)
    pub fn development(staging_root: impl Into<PathBuf>) -> Self {
        Self {
            environment: "test".to_string(),
            staging_root: staging_root.into(),
            upload_part_size: 5 * 1024 * 1024,
            transcoder_type: "noop".to_string(),
            transcoder_url: None,
            staging_cleanup_age_hours: 1,
            staging_sweep_interval_secs: 60,
            max_request_bytes: 64 * 1024 * 1024,
        }
    }
}
