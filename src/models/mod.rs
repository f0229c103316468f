use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use tokio::io::AsyncRead;
use utoipa::ToSchema;
use validator::Validate;

/// Inbound or outbound object content, read incrementally.
pub type ObjectReader = Box<dyn AsyncRead + Unpin + Send>;

/// The only transcoding pipeline currently supported.
pub const MP4_H264_AAC: &str = "MP4_H264_AAC";

pub const DEFAULT_VIDEO_HEIGHT: u32 = 480;
pub const DEFAULT_QUALITY_LEVEL: u8 = 7;

/// Tenant boundary under which object keys are namespaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub id: String,
}

impl Scope {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Local scratch copy of an upload, owned by a single write run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedObject {
    pub id: String,
    pub scope_id: String,
    pub local_path: PathBuf,
    pub content_hash: String,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StorageClass {
    FastAccess,
    Archival,
}

impl StorageClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageClass::FastAccess => "FAST_ACCESS",
            StorageClass::Archival => "ARCHIVAL",
        }
    }
}

impl std::fmt::Display for StorageClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown storage class '{0}'")]
pub struct UnknownStorageClass(pub String);

impl FromStr for StorageClass {
    type Err = UnknownStorageClass;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FAST_ACCESS" => Ok(StorageClass::FastAccess),
            "ARCHIVAL" => Ok(StorageClass::Archival),
            other => Err(UnknownStorageClass(other.to_string())),
        }
    }
}

/// Backend-resident representation of an object, addressable by scope + key.
///
/// Built provisionally from request data (no id, hash, version or modification
/// date) and completed once a probe or write merges backend-reported fields in.
/// `storage_class` is never read back from the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DurableObject {
    pub id: Option<String>,
    pub scope_id: String,
    pub key: String,
    pub content_type: String,
    pub storage_class: Option<StorageClass>,
    pub content_hash: Option<String>,
    pub version: Option<String>,
    pub last_modified_date: Option<DateTime<Utc>>,
}

impl DurableObject {
    pub fn provisional(scope: &Scope, key: &str, content_type: &str) -> Self {
        Self {
            id: None,
            scope_id: scope.id.clone(),
            key: key.to_string(),
            content_type: content_type.to_string(),
            storage_class: None,
            content_hash: None,
            version: None,
            last_modified_date: None,
        }
    }

    /// Key split on `/` with empty segments dropped.
    pub fn key_parts(&self) -> Vec<&str> {
        self.key.split('/').filter(|part| !part.is_empty()).collect()
    }

    /// Attach the identity and hash of the staged copy that will back this object.
    pub fn with_staged(mut self, staged: &StagedObject) -> Self {
        self.id = Some(staged.id.clone());
        self.content_hash = Some(staged.content_hash.clone());
        self
    }

    pub fn with_storage_class(mut self, storage_class: StorageClass) -> Self {
        self.storage_class = Some(storage_class);
        self
    }
}

/// Processing params exactly as the caller sent them, before defaulting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct VideoProcessingParams {
    #[serde(rename = "type", default)]
    #[validate(custom(function = "crate::utils::validation::validate_pipeline"))]
    pub kind: String,
    #[serde(default)]
    #[validate(nested)]
    pub video: Option<VideoSettingsInput>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VideoSettingsInput {
    #[serde(default)]
    #[validate(range(
        min = 360,
        max = 2160,
        code = "OUT_OF_RANGE",
        message = "height must be between 360 and 2160"
    ))]
    pub height: Option<i64>,
    #[serde(default)]
    #[validate(range(
        min = 1,
        max = 10,
        code = "OUT_OF_RANGE",
        message = "qualityLevel must be between 1 and 10"
    ))]
    pub quality_level: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProcessingPipeline {
    #[serde(rename = "MP4_H264_AAC")]
    Mp4H264Aac,
}

impl ProcessingPipeline {
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            MP4_H264_AAC => Some(ProcessingPipeline::Mp4H264Aac),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_level: Option<u8>,
}

impl Default for VideoOutput {
    fn default() -> Self {
        Self {
            height: Some(DEFAULT_VIDEO_HEIGHT),
            quality_level: Some(DEFAULT_QUALITY_LEVEL),
        }
    }
}

/// Processing params after validation and defaulting. Never mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedVideoParams {
    #[serde(rename = "type")]
    pub pipeline: ProcessingPipeline,
    pub video: VideoOutput,
}

/// Everything the upstream caller supplies for one write.
pub struct PutObjectRequest {
    pub key: String,
    pub content_type: String,
    pub storage_class: String,
    pub video_processing_params: Option<VideoProcessingParams>,
    pub read_stream: ObjectReader,
}

impl std::fmt::Debug for PutObjectRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PutObjectRequest")
            .field("key", &self.key)
            .field("content_type", &self.content_type)
            .field("storage_class", &self.storage_class)
            .field("video_processing_params", &self.video_processing_params)
            .finish_non_exhaustive()
    }
}
