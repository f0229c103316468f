#![allow(dead_code)]

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use rust_object_ingest::config::IngestConfig;
use rust_object_ingest::models::{
    DurableObject, ObjectReader, PutObjectRequest, StagedObject, ValidatedVideoParams,
    VideoProcessingParams,
};
use rust_object_ingest::services::object_service::ObjectService;
use rust_object_ingest::services::staging::{LocalStagingStore, StagingStore};
use rust_object_ingest::services::storage::{DurableStore, check_writable, durable_key};
use rust_object_ingest::services::transcoder::{TranscodeJob, Transcoder};
use rust_object_ingest::utils::hash::calculate_hash;
use rust_object_ingest::{AppState, create_app};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::io::AsyncReadExt;

pub const ENVIRONMENT: &str = "test";

/// Shared, ordered log of collaborator calls.
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn record(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn position(&self, event: &str) -> usize {
        self.events()
            .iter()
            .position(|e| e == event)
            .unwrap_or_else(|| panic!("event '{}' not recorded", event))
    }
}

/// In-memory durable backend. Probes never report a storage class.
#[derive(Default)]
pub struct MemoryDurableStore {
    objects: Mutex<HashMap<String, (DurableObject, Vec<u8>)>>,
    puts: AtomicUsize,
    probes: AtomicUsize,
    fail_puts: AtomicBool,
    fail_probes: AtomicBool,
    events: EventLog,
}

impl MemoryDurableStore {
    pub fn with_events(events: EventLog) -> Self {
        Self {
            events,
            ..Default::default()
        }
    }

    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_probes(&self, fail: bool) {
        self.fail_probes.store(fail, Ordering::SeqCst);
    }

    /// Seed an object as if it had been written earlier.
    pub fn insert(&self, obj: DurableObject, content: &[u8]) {
        let key = durable_key(ENVIRONMENT, &obj).unwrap();
        let mut stored = obj;
        stored.content_hash = Some(calculate_hash(content));
        stored.version.get_or_insert_with(|| "seed".to_string());
        self.objects
            .lock()
            .unwrap()
            .insert(key, (stored, content.to_vec()));
    }

    pub fn content(&self, obj: &DurableObject) -> Option<Vec<u8>> {
        let key = durable_key(ENVIRONMENT, obj).ok()?;
        self.objects
            .lock()
            .unwrap()
            .get(&key)
            .map(|(_, content)| content.clone())
    }
}

#[async_trait]
impl DurableStore for MemoryDurableStore {
    async fn probe(&self, obj: &DurableObject) -> Result<Option<DurableObject>> {
        self.events.record("probe:start");
        self.probes.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;

        let result = if self.fail_probes.load(Ordering::SeqCst) {
            Err(anyhow!("backend unavailable"))
        } else {
            let key = durable_key(ENVIRONMENT, obj)?;
            Ok(self.objects.lock().unwrap().get(&key).map(|(stored, _)| {
                let mut found = stored.clone();
                found.storage_class = None;
                found
            }))
        };
        self.events.record("probe:end");
        result
    }

    async fn put(&self, obj: &DurableObject, mut content: ObjectReader) -> Result<DurableObject> {
        self.events.record("put");
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(anyhow!("simulated durable write failure"));
        }

        check_writable(obj)?;
        let key = durable_key(ENVIRONMENT, obj)?;
        let mut bytes = Vec::new();
        content.read_to_end(&mut bytes).await?;

        let mut stored = obj.clone();
        stored.content_hash = Some(calculate_hash(&bytes));
        stored.version = Some(format!("v{}", self.put_count()));
        stored.last_modified_date = Some(Utc::now());

        self.objects
            .lock()
            .unwrap()
            .insert(key, (stored.clone(), bytes));
        Ok(stored)
    }

    async fn health_check(&self) -> bool {
        true
    }
}

/// Transcoder that remembers every job it was asked to create.
#[derive(Default)]
pub struct RecordingTranscoder {
    jobs: Mutex<Vec<(DurableObject, ValidatedVideoParams)>>,
    fail: AtomicBool,
    events: EventLog,
}

impl RecordingTranscoder {
    pub fn with_events(events: EventLog) -> Self {
        Self {
            events,
            ..Default::default()
        }
    }

    pub fn jobs(&self) -> Vec<(DurableObject, ValidatedVideoParams)> {
        self.jobs.lock().unwrap().clone()
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transcoder for RecordingTranscoder {
    async fn create_job(
        &self,
        obj: &DurableObject,
        params: &ValidatedVideoParams,
    ) -> Result<TranscodeJob> {
        self.events.record("transcode");
        self.jobs.lock().unwrap().push((obj.clone(), *params));
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("transcoder rejected job"));
        }
        Ok(TranscodeJob {
            job_id: format!("job-{}", self.jobs.lock().unwrap().len()),
        })
    }
}

/// Local staging store that records calls and remembers every staged file.
pub struct RecordingStaging {
    inner: LocalStagingStore,
    staged: Mutex<Vec<StagedObject>>,
    removes: AtomicUsize,
    events: EventLog,
}

impl RecordingStaging {
    pub fn new(root: &Path, events: EventLog) -> Self {
        Self {
            inner: LocalStagingStore::new(root),
            staged: Mutex::new(Vec::new()),
            removes: AtomicUsize::new(0),
            events,
        }
    }

    pub fn stage_count(&self) -> usize {
        self.staged.lock().unwrap().len()
    }

    pub fn remove_count(&self) -> usize {
        self.removes.load(Ordering::SeqCst)
    }

    pub fn staged(&self) -> Vec<StagedObject> {
        self.staged.lock().unwrap().clone()
    }

    /// True when no staged file is left on disk.
    pub fn all_removed(&self) -> bool {
        self.staged().iter().all(|s| !s.local_path.exists())
    }
}

#[async_trait]
impl StagingStore for RecordingStaging {
    async fn stage(&self, scope_id: &str, source: ObjectReader) -> Result<StagedObject> {
        self.events.record("stage:start");
        tokio::task::yield_now().await;
        let staged = self.inner.stage(scope_id, source).await;
        self.events.record("stage:end");

        let staged = staged?;
        self.staged.lock().unwrap().push(staged.clone());
        Ok(staged)
    }

    async fn open_for_read(&self, obj: &StagedObject) -> Result<ObjectReader> {
        self.inner.open_for_read(obj).await
    }

    async fn remove(&self, obj: &StagedObject) -> Result<()> {
        self.events.record("remove");
        self.removes.fetch_add(1, Ordering::SeqCst);
        self.inner.remove(obj).await
    }
}

/// A fully wired `ObjectService` over in-memory collaborators.
pub struct TestContext {
    pub dir: TempDir,
    pub events: EventLog,
    pub staging: Arc<RecordingStaging>,
    pub durable: Arc<MemoryDurableStore>,
    pub transcoder: Arc<RecordingTranscoder>,
    pub service: Arc<ObjectService>,
}

impl TestContext {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let events = EventLog::default();
        let staging = Arc::new(RecordingStaging::new(dir.path(), events.clone()));
        let durable = Arc::new(MemoryDurableStore::with_events(events.clone()));
        let transcoder = Arc::new(RecordingTranscoder::with_events(events.clone()));
        let service = Arc::new(ObjectService::new(
            staging.clone(),
            durable.clone(),
            transcoder.clone(),
        ));

        Self {
            dir,
            events,
            staging,
            durable,
            transcoder,
            service,
        }
    }

    pub fn app(&self) -> axum::Router {
        create_app(AppState {
            object_service: self.service.clone(),
            config: IngestConfig::development(self.dir.path()),
        })
    }

    /// Same app with a request body cap of `max_request_bytes`.
    pub fn app_with_limit(&self, max_request_bytes: usize) -> axum::Router {
        let mut config = IngestConfig::development(self.dir.path());
        config.max_request_bytes = max_request_bytes;
        create_app(AppState {
            object_service: self.service.clone(),
            config,
        })
    }
}

pub fn put_request(
    key: &str,
    content_type: &str,
    storage_class: &str,
    body: &[u8],
) -> PutObjectRequest {
    PutObjectRequest {
        key: key.to_string(),
        content_type: content_type.to_string(),
        storage_class: storage_class.to_string(),
        video_processing_params: None,
        read_stream: Box::new(std::io::Cursor::new(body.to_vec())),
    }
}

pub fn video_params(value: serde_json::Value) -> Option<VideoProcessingParams> {
    Some(serde_json::from_value(value).unwrap())
}
