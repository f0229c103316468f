use crate::models::{DurableObject, ValidatedVideoParams};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Handle of a transcoding job accepted by the transcode service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscodeJob {
    pub job_id: String,
}

/// Trait for transcode service implementations
#[async_trait::async_trait]
pub trait Transcoder: Send + Sync {
    /// Submit a job for an object that is already durable
    async fn create_job(
        &self,
        obj: &DurableObject,
        params: &ValidatedVideoParams,
    ) -> Result<TranscodeJob>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateJobRequest<'a> {
    scope_id: &'a str,
    object_id: Option<&'a str>,
    key: &'a str,
    version: Option<&'a str>,
    content_type: &'a str,
    params: &'a ValidatedVideoParams,
}

impl<'a> CreateJobRequest<'a> {
    fn new(obj: &'a DurableObject, params: &'a ValidatedVideoParams) -> Self {
        Self {
            scope_id: &obj.scope_id,
            object_id: obj.id.as_deref(),
            key: &obj.key,
            version: obj.version.as_deref(),
            content_type: &obj.content_type,
            params,
        }
    }
}

/// Transcode service reached over HTTP (`POST <base_url>/jobs`)
pub struct HttpTranscoder {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTranscoder {
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait::async_trait]
impl Transcoder for HttpTranscoder {
    async fn create_job(
        &self,
        obj: &DurableObject,
        params: &ValidatedVideoParams,
    ) -> Result<TranscodeJob> {
        let url = format!("{}/jobs", self.base_url);
        let job = self
            .client
            .post(&url)
            .json(&CreateJobRequest::new(obj, params))
            .send()
            .await
            .with_context(|| format!("Failed to reach transcoder at {}", url))?
            .error_for_status()
            .context("Transcoder rejected job")?
            .json::<TranscodeJob>()
            .await
            .context("Malformed transcoder response")?;

        tracing::info!("Transcode job {} created for {}/{}", job.job_id, obj.scope_id, obj.key);
        Ok(job)
    }
}

/// No-op transcoder (for development/testing)
pub struct NoOpTranscoder;

#[async_trait::async_trait]
impl Transcoder for NoOpTranscoder {
    async fn create_job(
        &self,
        obj: &DurableObject,
        _params: &ValidatedVideoParams,
    ) -> Result<TranscodeJob> {
        tracing::warn!(
            "NoOpTranscoder: Skipping transcode of {}/{} (development mode)",
            obj.scope_id,
            obj.key
        );
        Ok(TranscodeJob {
            job_id: format!("noop-{}", Uuid::new_v4()),
        })
    }
}
