//! Store health probes
//!
//! Two checks against a live endpoint:
//! - a connectivity smoke test that exercises every primitive once with a
//!   throwaway object, and
//! - a persistence probe split across processes: `write` stores
//!   deterministic objects and records them in a local state file, `verify`
//!   (typically after a server restart) regenerates the expected bytes and
//!   compares, `clear` removes both.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::config::{config_dir, write_private};
use crate::error::{Error, Result};
use crate::traits::{DEFAULT_CONTENT_TYPE, ListOptions, ObjectStore};

/// Key prefix of smoke test objects
pub const SMOKE_PREFIX: &str = "_bp_smoke/";

/// Key prefix of persistence probe objects
pub const PERSIST_PREFIX: &str = "_bp_persist/";

/// Default number of persistence probe objects
pub const DEFAULT_PROBE_OBJECTS: usize = 10;

/// Default size of each persistence probe object
pub const DEFAULT_PROBE_SIZE: usize = 1024;

/// File name of the probe state under the config directory
pub const PROBE_STATE_FILE: &str = "probe-state.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Passed,
    Failed,
    Skipped,
}

/// One step of the smoke test
#[derive(Debug, Clone, Serialize)]
pub struct SmokeStep {
    pub name: &'static str,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of [`run_smoke_test`]
#[derive(Debug, Clone, Serialize)]
pub struct SmokeReport {
    pub bucket: String,
    pub key: String,
    pub steps: Vec<SmokeStep>,
}

impl SmokeReport {
    pub fn passed(&self) -> bool {
        self.steps.iter().all(|s| s.status != StepStatus::Failed)
    }

    fn pass(&mut self, name: &'static str) {
        self.steps.push(SmokeStep {
            name,
            status: StepStatus::Passed,
            error: None,
        });
    }

    fn fail(&mut self, name: &'static str, error: impl ToString) {
        self.steps.push(SmokeStep {
            name,
            status: StepStatus::Failed,
            error: Some(error.to_string()),
        });
    }

    fn skip(&mut self, name: &'static str) {
        self.steps.push(SmokeStep {
            name,
            status: StepStatus::Skipped,
            error: None,
        });
    }

    fn record(&mut self, name: &'static str, outcome: Result<()>) -> bool {
        match outcome {
            Ok(()) => {
                self.pass(name);
                true
            }
            Err(e) => {
                tracing::warn!(step = name, error = %e, "smoke test step failed");
                self.fail(name, e);
                false
            }
        }
    }
}

/// Exercise bucket check, put, get, list and delete with one test object
///
/// A missing bucket is created first. Steps that need the test object are
/// skipped when the upload failed.
pub async fn run_smoke_test(store: &dyn ObjectStore, bucket: &str) -> SmokeReport {
    let key = format!("{SMOKE_PREFIX}{}", Timestamp::now().as_millisecond());
    let content = format!("bucketport smoke test {key}").into_bytes();
    let mut report = SmokeReport {
        bucket: bucket.to_string(),
        key: key.clone(),
        steps: Vec::new(),
    };
    tracing::info!(bucket, %key, "starting smoke test");

    match store.bucket_exists(bucket).await {
        Ok(true) => report.pass("bucket_exists"),
        Ok(false) => {
            report.pass("bucket_exists");
            let created = store.create_bucket(bucket).await;
            report.record("create_bucket", created);
        }
        Err(e) => report.fail("bucket_exists", e),
    }

    let put = store
        .put_object(bucket, &key, content.clone(), "text/plain", &BTreeMap::new())
        .await
        .map(|_| ());
    if !report.record("put_object", put) {
        for name in ["get_object", "list_objects", "delete_object"] {
            report.skip(name);
        }
        return report;
    }

    let get = match store.get_object(bucket, &key).await {
        Ok(payload) if payload.data == content => Ok(()),
        Ok(payload) => Err(Error::General(format!(
            "content mismatch: wrote {} bytes, read {}",
            content.len(),
            payload.data.len()
        ))),
        Err(e) => Err(e),
    };
    report.record("get_object", get);

    let options = ListOptions {
        prefix: Some(key.clone()),
        max_keys: Some(10),
        continuation_token: None,
    };
    let list = match store.list_objects(bucket, options).await {
        Ok(page) if page.objects.iter().any(|o| o.key == key) => Ok(()),
        Ok(_) => Err(Error::General("test object missing from listing".into())),
        Err(e) => Err(e),
    };
    report.record("list_objects", list);

    let delete = store.delete_object(bucket, &key).await;
    report.record("delete_object", delete);

    tracing::info!(bucket, passed = report.passed(), "smoke test complete");
    report
}

/// One object written by the persistence probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeObject {
    pub key: String,
    pub size: u64,
    pub etag: String,
}

/// What `probe write` left behind, persisted between processes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeState {
    pub bucket: String,
    pub run_id: String,
    pub created_at: Timestamp,
    pub objects: Vec<ProbeObject>,
}

/// Result of comparing stored probe objects against expected content
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProbeVerification {
    pub checked: u64,
    pub missing: Vec<String>,
    pub corrupt: Vec<String>,
}

impl ProbeVerification {
    pub fn is_intact(&self) -> bool {
        self.missing.is_empty() && self.corrupt.is_empty()
    }
}

/// Deterministic content of probe object `index` in run `run_id`
pub fn probe_content(run_id: &str, index: usize, size: usize) -> Vec<u8> {
    let seed = format!("{run_id}:{index:04}:");
    seed.bytes().cycle().take(size).collect()
}

fn probe_key(index: usize) -> String {
    format!("{PERSIST_PREFIX}obj-{index:04}")
}

/// Upload `count` probe objects of `size` bytes
///
/// Any failed upload aborts the probe; a partial state would make a later
/// verify report false losses.
pub async fn write_probe(
    store: &dyn ObjectStore,
    bucket: &str,
    count: usize,
    size: usize,
) -> Result<ProbeState> {
    if !store.bucket_exists(bucket).await? {
        tracing::info!(bucket, "creating bucket for persistence probe");
        store.create_bucket(bucket).await?;
    }

    let created_at = Timestamp::now();
    let run_id = format!("{:x}", created_at.as_nanosecond());
    let mut objects = Vec::with_capacity(count);

    for index in 0..count {
        let key = probe_key(index);
        let data = probe_content(&run_id, index, size);
        let etag = store
            .put_object(bucket, &key, data, DEFAULT_CONTENT_TYPE, &BTreeMap::new())
            .await
            .map_err(|e| Error::transfer(&key, e))?;
        tracing::debug!(%key, "probe object written");
        objects.push(ProbeObject {
            key,
            size: size as u64,
            etag,
        });
    }

    tracing::info!(bucket, %run_id, objects = count, "persistence probe written");
    Ok(ProbeState {
        bucket: bucket.to_string(),
        run_id,
        created_at,
        objects,
    })
}

/// Fetch every recorded probe object and compare against expected bytes
pub async fn verify_probe(store: &dyn ObjectStore, state: &ProbeState) -> Result<ProbeVerification> {
    let mut verification = ProbeVerification::default();

    for (index, object) in state.objects.iter().enumerate() {
        verification.checked += 1;
        let expected = probe_content(&state.run_id, index, object.size as usize);
        match store.get_object(&state.bucket, &object.key).await {
            Ok(payload) if payload.data == expected => {}
            Ok(_) => {
                tracing::error!(key = %object.key, "probe object corrupt");
                verification.corrupt.push(object.key.clone());
            }
            Err(Error::NotFound(_)) => {
                tracing::error!(key = %object.key, "probe object missing");
                verification.missing.push(object.key.clone());
            }
            Err(e) => return Err(e),
        }
    }

    tracing::info!(
        bucket = %state.bucket,
        checked = verification.checked,
        missing = verification.missing.len(),
        corrupt = verification.corrupt.len(),
        "persistence probe verified"
    );
    Ok(verification)
}

/// Delete every recorded probe object, returning how many were removed
pub async fn clear_probe(store: &dyn ObjectStore, state: &ProbeState) -> Result<u64> {
    let mut removed = 0;
    for object in &state.objects {
        store
            .delete_object(&state.bucket, &object.key)
            .await
            .map_err(|e| Error::transfer(&object.key, e))?;
        removed += 1;
    }
    Ok(removed)
}

/// Location of the persisted [`ProbeState`]
#[derive(Debug, Clone)]
pub struct ProbeStateFile {
    path: PathBuf,
}

impl ProbeStateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/probe-state.json`
    pub fn default_location() -> Result<Self> {
        Ok(Self::new(config_dir()?.join(PROBE_STATE_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the state, or `None` when no probe has been written
    pub fn load(&self) -> Result<Option<ProbeState>> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Save the state with owner-only permissions
    pub fn save(&self, state: &ProbeState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        write_private(&self.path, &serde_json::to_vec_pretty(state)?)
    }

    /// Remove the state file; returns whether one existed
    pub fn clear(&self) -> Result<bool> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
