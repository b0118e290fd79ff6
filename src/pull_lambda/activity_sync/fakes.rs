use async_trait::async_trait;
use garmin_drivetrain::common::activity::ActivitySummary;
use garmin_drivetrain::common::blob_store::BlobStore;
use garmin_drivetrain::common::garmin_client::{SourceApi, SourceError, original_archive_path};
use garmin_drivetrain::common::types::{PipelineError, PipelineResult};
use reqwest::StatusCode;
use serde_json::json;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Write;
use std::sync::Mutex;

pub fn summary(id: u64, name: &str) -> ActivitySummary {
    ActivitySummary::try_from(json!({
        "activityId": id,
        "activityName": name,
        "distance": 1000.0,
        "activityType": {"typeKey": "running"}
    }))
    .unwrap()
}

pub fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, data) in entries {
        writer
            .start_file(*name, zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(data.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

#[derive(Default)]
pub struct FakeSource {
    summaries: Option<Vec<ActivitySummary>>,
    binaries: Mutex<HashMap<String, Vec<u8>>>,
    searches: Mutex<Vec<(u32, u32)>>,
    binary_fetches: Mutex<Vec<String>>,
}

impl FakeSource {
    pub fn with_summaries(summaries: Vec<ActivitySummary>) -> Self {
        Self {
            summaries: Some(summaries),
            ..Self::default()
        }
    }

    /// Every search fails.
    pub fn failing() -> Self {
        Self::default()
    }

    pub fn add_binary(&self, activity_id: u64, data: Vec<u8>) {
        self.binaries
            .lock()
            .unwrap()
            .insert(original_archive_path(activity_id), data);
    }

    pub fn searches(&self) -> Vec<(u32, u32)> {
        self.searches.lock().unwrap().clone()
    }

    pub fn binary_fetches(&self) -> Vec<String> {
        self.binary_fetches.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceApi for FakeSource {
    async fn search_activities(
        &self,
        start: u32,
        limit: u32,
    ) -> Result<Vec<ActivitySummary>, SourceError> {
        self.searches.lock().unwrap().push((start, limit));
        match &self.summaries {
            Some(summaries) => Ok(summaries
                .iter()
                .skip(start as usize)
                .take(limit as usize)
                .cloned()
                .collect()),
            None => Err(SourceError::Http(StatusCode::SERVICE_UNAVAILABLE)),
        }
    }

    async fn fetch_binary(&self, path: &str) -> Result<Vec<u8>, SourceError> {
        self.binary_fetches.lock().unwrap().push(path.to_string());
        self.binaries
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or(SourceError::Http(StatusCode::NOT_FOUND))
    }
}

#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, (Vec<u8>, String)>>,
    failing_puts: Mutex<HashSet<String>>,
    fail_exists: Mutex<bool>,
    put_count: Mutex<usize>,
    exists_count: Mutex<usize>,
}

impl MemoryStore {
    pub fn insert(&self, key: &str, body: Vec<u8>) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (body, "application/json".to_string()));
    }

    pub fn fail_put(&self, key: &str) {
        self.failing_puts.lock().unwrap().insert(key.to_string());
    }

    pub fn fail_exists(&self) {
        *self.fail_exists.lock().unwrap() = true;
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).map(|(body, _)| body.clone())
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|(_, content_type)| content_type.clone())
    }

    pub fn put_count(&self) -> usize {
        *self.put_count.lock().unwrap()
    }

    pub fn exists_count(&self) -> usize {
        *self.exists_count.lock().unwrap()
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn exists(&self, key: &str) -> PipelineResult<bool> {
        *self.exists_count.lock().unwrap() += 1;
        if *self.fail_exists.lock().unwrap() {
            return Err(PipelineError::Store("head_object failed".to_string()));
        }
        Ok(self.objects.lock().unwrap().contains_key(key))
    }

    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> PipelineResult<()> {
        if self.failing_puts.lock().unwrap().contains(key) {
            return Err(PipelineError::Store(format!("put {key} rejected")));
        }
        *self.put_count.lock().unwrap() += 1;
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (body, content_type.to_string()));
        Ok(())
    }

    async fn get(&self, key: &str) -> PipelineResult<Vec<u8>> {
        self.object(key)
            .ok_or_else(|| PipelineError::Store(format!("{key} not found")))
    }
}
