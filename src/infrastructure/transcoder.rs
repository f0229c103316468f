use crate::config::IngestConfig;
use crate::services::transcoder::{HttpTranscoder, NoOpTranscoder, Transcoder};
use anyhow::{Result, bail};
use std::sync::Arc;
use tracing::{info, warn};

pub fn setup_transcoder(config: &IngestConfig) -> Result<Arc<dyn Transcoder>> {
    match config.transcoder_type.as_str() {
        "http" => {
            let Some(url) = config.transcoder_url.clone() else {
                bail!("TRANSCODER_URL must be set when TRANSCODER_TYPE=http");
            };
            info!("🎬 Transcoder: HTTP ({})", url);
            Ok(Arc::new(HttpTranscoder::new(url)))
        }
        "noop" => {
            warn!("🎬 Transcoder: no-op, video processing requests will be logged only");
            Ok(Arc::new(NoOpTranscoder))
        }
        other => bail!("Unknown TRANSCODER_TYPE '{}', expected 'http' or 'noop'", other),
    }
}
