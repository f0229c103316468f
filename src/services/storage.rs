use crate::models::{DurableObject, ObjectReader, StorageClass};
use crate::utils::hash::ContentHasher;
use crate::utils::validation::is_valid_key_segment;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use chrono::{DateTime, Utc};
use tokio::io::AsyncReadExt;

/// User metadata entry cross-referencing the durable copy with the upload id.
pub const ID_METADATA: &str = "id";
/// User metadata entry carrying the hex SHA-256 of the object content.
pub const HASH_METADATA: &str = "content-sha256";

/// Raised when an object reaching the durable store was not validated upstream.
#[derive(Debug, thiserror::Error)]
#[error("INVALID_OBJECT: {0}")]
pub struct InvalidObject(pub String);

/// Fields the backend reports about a stored object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportedFields {
    pub id: Option<String>,
    pub content_hash: Option<String>,
    pub version: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

impl ReportedFields {
    /// Returns a copy of `obj` completed with whatever the backend reported.
    /// `storage_class` is left alone: metadata-only responses never carry it.
    pub fn merge_into(self, obj: &DurableObject) -> DurableObject {
        let mut merged = obj.clone();
        if self.id.is_some() {
            merged.id = self.id;
        }
        if self.content_hash.is_some() {
            merged.content_hash = self.content_hash;
        }
        if self.version.is_some() {
            merged.version = self.version;
        }
        if self.last_modified.is_some() {
            merged.last_modified_date = self.last_modified;
        }
        merged
    }
}

/// Durable blob backend holding the authoritative copy of every object.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Metadata-only existence check. `None` when the object is absent.
    async fn probe(&self, obj: &DurableObject) -> Result<Option<DurableObject>>;

    /// Writes `content` under the object's key and returns it completed with
    /// backend-confirmed fields.
    async fn put(&self, obj: &DurableObject, content: ObjectReader) -> Result<DurableObject>;

    /// Check if the backend is reachable
    async fn health_check(&self) -> bool;
}

/// Backend key: `<environment>/<scope_id>/<key parts>`, every segment validated.
pub fn durable_key(environment: &str, obj: &DurableObject) -> Result<String> {
    let parts = obj.key_parts();
    if parts.is_empty() {
        return Err(InvalidObject(format!("empty key for scope {}", obj.scope_id)).into());
    }

    let prefix = [environment, obj.scope_id.as_str()];
    if let Some(bad) = prefix
        .iter()
        .chain(parts.iter())
        .find(|segment| !is_valid_key_segment(segment))
    {
        return Err(InvalidObject(format!("malformed key segment '{}'", bad)).into());
    }

    Ok(format!("{}/{}/{}", environment, obj.scope_id, parts.join("/")))
}

/// Checks the invariants a write relies on, returning the id and storage class.
pub fn check_writable(obj: &DurableObject) -> Result<(&str, StorageClass)> {
    let id = obj
        .id
        .as_deref()
        .filter(|id| is_valid_key_segment(id))
        .ok_or_else(|| InvalidObject(format!("missing or malformed id for key {}", obj.key)))?;

    obj.content_type
        .parse::<mime::Mime>()
        .map_err(|_| InvalidObject(format!("malformed content type '{}'", obj.content_type)))?;

    let class = obj
        .storage_class
        .ok_or_else(|| InvalidObject(format!("no storage class for key {}", obj.key)))?;

    Ok((id, class))
}

pub fn strip_quotes(etag: &str) -> String {
    etag.trim_matches('"').to_string()
}

/// HEAD statuses that mean "nothing usable stored here". Access denied counts as absent.
pub fn is_absent_status(status: u16) -> bool {
    matches!(status, 403 | 404)
}

/// Fails unless the bytes fed to `hasher` match the hash recorded at staging time.
fn verify_hash(key: &str, expected_hash: &str, hasher: ContentHasher) -> Result<()> {
    let actual_hash = hasher.finalize();
    if actual_hash != expected_hash {
        return Err(anyhow!(
            "Content hash mismatch for {}: expected {}, got {}",
            key,
            expected_hash,
            actual_hash
        ));
    }
    Ok(())
}

fn backend_storage_class(class: StorageClass) -> aws_sdk_s3::types::StorageClass {
    match class {
        StorageClass::FastAccess => aws_sdk_s3::types::StorageClass::Standard,
        StorageClass::Archival => aws_sdk_s3::types::StorageClass::GlacierIr,
    }
}

pub struct S3DurableStore {
    client: Client,
    bucket: String,
    environment: String,
    part_size: usize,
}

impl S3DurableStore {
    pub fn new(client: Client, bucket: String, environment: String, part_size: usize) -> Self {
        Self {
            client,
            bucket,
            environment,
            part_size,
        }
    }

    async fn head(&self, key: &str) -> Result<Option<ReportedFields>> {
        let res = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match res {
            Ok(head) => {
                let metadata = head.metadata();
                let etag = head.e_tag().map(strip_quotes);
                Ok(Some(ReportedFields {
                    id: metadata.and_then(|m| m.get(ID_METADATA)).cloned(),
                    content_hash: metadata
                        .and_then(|m| m.get(HASH_METADATA))
                        .cloned()
                        .or_else(|| etag.clone()),
                    version: head.version_id().map(str::to_string).or(etag),
                    last_modified: head.last_modified().and_then(|d| {
                        DateTime::from_timestamp(d.secs(), d.subsec_nanos())
                    }),
                }))
            }
            Err(e) => {
                if let SdkError::ServiceError(ref service_err) = e {
                    let status = service_err.raw().status().as_u16();
                    if is_absent_status(status) {
                        tracing::debug!("HEAD {} returned {}, treating as not found", key, status);
                        return Ok(None);
                    }
                }
                Err(anyhow!(e).context(format!("HEAD {} failed", key)))
            }
        }
    }

    /// Fills `buffer` from `reader` until it is full or the reader is exhausted.
    async fn read_chunk(reader: &mut ObjectReader, buffer: &mut [u8]) -> Result<usize> {
        let mut n = 0;
        while n < buffer.len() {
            let read = reader
                .read(&mut buffer[n..])
                .await
                .context("Failed to read object content")?;
            if read == 0 {
                break;
            }
            n += read;
        }
        Ok(n)
    }

    async fn put_single(
        &self,
        key: &str,
        obj: &DurableObject,
        id: &str,
        class: StorageClass,
        expected_hash: &str,
        body: Vec<u8>,
    ) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(&obj.content_type)
            .storage_class(backend_storage_class(class))
            .metadata(ID_METADATA, id)
            .metadata(HASH_METADATA, expected_hash)
            .body(ByteStream::from(body))
            .send()
            .await
            .with_context(|| format!("PUT {} failed", key))?;
        Ok(())
    }

    /// Streams the content as a multipart upload; `buffer` holds the first full part.
    #[allow(clippy::too_many_arguments)]
    async fn put_multipart(
        &self,
        key: &str,
        obj: &DurableObject,
        id: &str,
        class: StorageClass,
        expected_hash: &str,
        mut hasher: ContentHasher,
        mut buffer: Vec<u8>,
        content: &mut ObjectReader,
    ) -> Result<()> {
        let multipart_upload_res = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(&obj.content_type)
            .storage_class(backend_storage_class(class))
            .metadata(ID_METADATA, id)
            .metadata(HASH_METADATA, expected_hash)
            .send()
            .await
            .with_context(|| format!("Failed to start multipart upload for {}", key))?;

        let upload_id = multipart_upload_res
            .upload_id()
            .ok_or_else(|| anyhow!("No upload ID"))?
            .to_string();

        let uploaded = async {
            let mut completed_parts = Vec::new();
            let mut chunk_index = 1;
            // The first part is already in the buffer.
            let mut n = buffer.len();
            buffer.resize(self.part_size, 0);

            while n > 0 {
                let upload_part_res = self
                    .client
                    .upload_part()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .body(ByteStream::from(buffer[..n].to_vec()))
                    .part_number(chunk_index)
                    .send()
                    .await
                    .with_context(|| format!("Failed to upload part {} of {}", chunk_index, key))?;

                completed_parts.push(
                    CompletedPart::builder()
                        .e_tag(upload_part_res.e_tag().unwrap_or_default())
                        .part_number(chunk_index)
                        .build(),
                );
                chunk_index += 1;

                n = Self::read_chunk(content, &mut buffer).await?;
                hasher.update(&buffer[..n]);
            }

            verify_hash(key, expected_hash, hasher)?;

            self.client
                .complete_multipart_upload()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(&upload_id)
                .multipart_upload(
                    CompletedMultipartUpload::builder()
                        .set_parts(Some(completed_parts))
                        .build(),
                )
                .send()
                .await
                .with_context(|| format!("Failed to complete multipart upload for {}", key))?;

            Ok::<(), anyhow::Error>(())
        }
        .await;

        if uploaded.is_err() {
            if let Err(e) = self
                .client
                .abort_multipart_upload()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(&upload_id)
                .send()
                .await
            {
                tracing::warn!("Failed to abort multipart upload {} for {}: {}", upload_id, key, e);
            }
        }

        uploaded
    }
}

#[async_trait]
impl DurableStore for S3DurableStore {
    async fn probe(&self, obj: &DurableObject) -> Result<Option<DurableObject>> {
        let key = durable_key(&self.environment, obj)?;
        Ok(self.head(&key).await?.map(|reported| reported.merge_into(obj)))
    }

    async fn put(&self, obj: &DurableObject, mut content: ObjectReader) -> Result<DurableObject> {
        let key = durable_key(&self.environment, obj)?;
        let (id, class) = check_writable(obj)?;
        let expected_hash = obj
            .content_hash
            .as_deref()
            .ok_or_else(|| InvalidObject(format!("no content hash for key {}", obj.key)))?;

        let mut buffer = vec![0u8; self.part_size];
        let n = Self::read_chunk(&mut content, &mut buffer).await?;
        let mut hasher = ContentHasher::new();
        hasher.update(&buffer[..n]);
        buffer.truncate(n);

        if n < self.part_size {
            verify_hash(&key, expected_hash, hasher)?;
            self.put_single(&key, obj, id, class, expected_hash, buffer)
                .await?;
        } else {
            self.put_multipart(&key, obj, id, class, expected_hash, hasher, buffer, &mut content)
                .await?;
        }

        let reported = self
            .head(&key)
            .await?
            .ok_or_else(|| anyhow!("{} not visible after write", key))?;

        tracing::info!(
            "Stored {} ({}) as {} [{}]",
            obj.key,
            id,
            key,
            class
        );

        Ok(reported.merge_into(obj))
    }

    async fn health_check(&self) -> bool {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Scope;

    fn object(key: &str) -> DurableObject {
        DurableObject::provisional(&Scope::new("tenant-a"), key, "video/mp4")
    }

    #[test]
    fn test_durable_key_namespaces_by_environment_and_scope() {
        assert_eq!(
            durable_key("prod", &object("/videos//a.mov")).unwrap(),
            "prod/tenant-a/videos/a.mov"
        );
    }

    #[test]
    fn test_durable_key_rejects_malformed_segments() {
        assert!(durable_key("prod", &object("bad key")).is_err());
        assert!(durable_key("prod", &object("///")).is_err());
        assert!(durable_key("../prod", &object("a.mov")).is_err());

        let err = durable_key("prod", &object(".hidden")).unwrap_err();
        assert!(err.downcast_ref::<InvalidObject>().is_some());
    }

    #[test]
    fn test_check_writable() {
        let obj = object("a.mov");
        assert!(check_writable(&obj).is_err());

        let mut obj = obj.with_storage_class(StorageClass::FastAccess);
        obj.id = Some("0b6f3a8e-7d2c-4a8e-9f7e-3c1a2b4d5e6f".to_string());
        let (id, class) = check_writable(&obj).unwrap();
        assert_eq!(id, "0b6f3a8e-7d2c-4a8e-9f7e-3c1a2b4d5e6f");
        assert_eq!(class, StorageClass::FastAccess);

        obj.content_type = "not a content type".to_string();
        assert!(check_writable(&obj).is_err());
    }

    #[test]
    fn test_merge_keeps_storage_class_and_missing_fields() {
        let obj = object("a.mov").with_storage_class(StorageClass::Archival);
        let merged = ReportedFields {
            id: None,
            content_hash: Some("abc".to_string()),
            version: Some("v1".to_string()),
            last_modified: None,
        }
        .merge_into(&obj);

        assert_eq!(merged.storage_class, Some(StorageClass::Archival));
        assert_eq!(merged.content_hash.as_deref(), Some("abc"));
        assert_eq!(merged.version.as_deref(), Some("v1"));
        assert!(merged.id.is_none());
        assert_eq!(merged.last_modified_date, None);
    }

    #[test]
    fn test_absent_statuses() {
        assert!(is_absent_status(404));
        assert!(is_absent_status(403));
        assert!(!is_absent_status(500));
        assert!(!is_absent_status(400));
    }

    #[test]
    fn test_verify_hash() {
        let mut hasher = ContentHasher::new();
        hasher.update(b"hello world");
        assert!(verify_hash("k", &crate::utils::hash::calculate_hash(b"hello world"), hasher.clone()).is_ok());

        let err = verify_hash("k", "deadbeef", hasher).unwrap_err();
        assert!(err.to_string().contains("Content hash mismatch for k"));
    }

    #[test]
    fn test_strip_quotes() {
        assert_eq!(strip_quotes("\"d41d8cd98f00b204\""), "d41d8cd98f00b204");
        assert_eq!(strip_quotes("plain"), "plain");
    }
}
