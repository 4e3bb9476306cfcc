//! In-process ObjectStore
//!
//! Buckets live in a `BTreeMap`, so listings come back in key order like
//! they do from S3. Faults can be injected per key or per bucket, and call
//! counters let tests assert how many bytes actually moved.

use std::collections::{BTreeMap, BTreeSet};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use jiff::Timestamp;

use crate::enumerate::DEFAULT_PAGE_SIZE;
use crate::error::{Error, Result};
use crate::traits::{
    DEFAULT_CONTENT_TYPE, ListOptions, ListPage, ObjectDescriptor, ObjectPayload, ObjectStore,
};

/// An object held by [`MemoryStore`]
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub content_type: String,
    pub metadata: BTreeMap<String, String>,
    pub etag: String,
    pub last_modified: Timestamp,
}

#[derive(Debug, Default)]
struct Faults {
    get: BTreeSet<String>,
    put: BTreeSet<String>,
    delete: BTreeSet<String>,
    head: BTreeSet<String>,
    list: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct Calls {
    get: u64,
    put: u64,
    delete: u64,
}

#[derive(Debug, Default)]
struct State {
    buckets: BTreeMap<String, BTreeMap<String, StoredObject>>,
    faults: Faults,
    calls: Calls,
}

/// Thread-safe in-memory object store
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

/// Entity tag derived from content, so equal bytes give equal tags
pub fn content_etag(data: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    data.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already contains the given empty buckets
    pub fn with_buckets(names: &[&str]) -> Self {
        let store = Self::new();
        {
            let mut state = store.lock();
            for name in names {
                state.buckets.entry((*name).to_string()).or_default();
            }
        }
        store
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert an object directly, bypassing faults and counters
    pub fn insert(&self, bucket: &str, key: &str, data: impl Into<Vec<u8>>) -> String {
        self.insert_with(bucket, key, data, DEFAULT_CONTENT_TYPE, BTreeMap::new())
    }

    /// Insert an object with explicit content type and metadata
    pub fn insert_with(
        &self,
        bucket: &str,
        key: &str,
        data: impl Into<Vec<u8>>,
        content_type: &str,
        metadata: BTreeMap<String, String>,
    ) -> String {
        let data = data.into();
        let etag = content_etag(&data);
        self.lock().buckets.entry(bucket.to_string()).or_default().insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
                metadata,
                etag: etag.clone(),
                last_modified: Timestamp::now(),
            },
        );
        etag
    }

    /// Overwrite the entity tag of a stored object
    pub fn set_etag(&self, bucket: &str, key: &str, etag: &str) {
        if let Some(object) = self
            .lock()
            .buckets
            .get_mut(bucket)
            .and_then(|objects| objects.get_mut(key))
        {
            object.etag = etag.to_string();
        }
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.lock().buckets.get(bucket)?.get(key).cloned()
    }

    /// Keys of a bucket in order (empty for a missing bucket)
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.lock()
            .buckets
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn fail_get(&self, key: &str) {
        self.lock().faults.get.insert(key.to_string());
    }

    pub fn fail_put(&self, key: &str) {
        self.lock().faults.put.insert(key.to_string());
    }

    pub fn fail_delete(&self, key: &str) {
        self.lock().faults.delete.insert(key.to_string());
    }

    pub fn fail_head(&self, key: &str) {
        self.lock().faults.head.insert(key.to_string());
    }

    pub fn fail_list(&self, bucket: &str) {
        self.lock().faults.list.insert(bucket.to_string());
    }

    pub fn get_calls(&self) -> u64 {
        self.lock().calls.get
    }

    pub fn put_calls(&self) -> u64 {
        self.lock().calls.put
    }

    pub fn delete_calls(&self) -> u64 {
        self.lock().calls.delete
    }
}

fn no_such_bucket(bucket: &str) -> Error {
    Error::NotFound(format!("bucket '{bucket}'"))
}

fn injected(op: &str, target: &str) -> Error {
    Error::General(format!("injected {op} failure for '{target}'"))
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list_buckets(&self) -> Result<Vec<String>> {
        Ok(self.lock().buckets.keys().cloned().collect())
    }

    async fn list_objects(&self, bucket: &str, options: ListOptions) -> Result<ListPage> {
        let state = self.lock();
        if state.faults.list.contains(bucket) {
            return Err(injected("list", bucket));
        }
        let objects = state.buckets.get(bucket).ok_or_else(|| no_such_bucket(bucket))?;

        let prefix = options.prefix.unwrap_or_default();
        let limit = options.max_keys.unwrap_or(DEFAULT_PAGE_SIZE).max(1) as usize;
        let after = options.continuation_token;

        let mut matching = objects
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .filter(|(key, _)| after.as_deref().is_none_or(|token| key.as_str() > token));

        let page: Vec<ObjectDescriptor> = matching
            .by_ref()
            .take(limit)
            .map(|(key, object)| ObjectDescriptor {
                key: key.clone(),
                size: object.data.len() as u64,
                etag: object.etag.clone(),
                last_modified: Some(object.last_modified),
            })
            .collect();
        let truncated = matching.next().is_some();

        Ok(ListPage {
            continuation_token: truncated
                .then(|| page.last().map(|d| d.key.clone()))
                .flatten(),
            objects: page,
            truncated,
        })
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectPayload> {
        let mut state = self.lock();
        state.calls.get += 1;
        if state.faults.get.contains(key) {
            return Err(injected("get", key));
        }
        let object = state
            .buckets
            .get(bucket)
            .ok_or_else(|| no_such_bucket(bucket))?
            .get(key)
            .ok_or_else(|| Error::NotFound(format!("{bucket}/{key}")))?;
        Ok(ObjectPayload {
            data: object.data.clone(),
            content_type: object.content_type.clone(),
            metadata: object.metadata.clone(),
            etag: object.etag.clone(),
        })
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<String> {
        let mut state = self.lock();
        state.calls.put += 1;
        if state.faults.put.contains(key) {
            return Err(injected("put", key));
        }
        let objects = state
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| no_such_bucket(bucket))?;
        let etag = content_etag(&data);
        objects.insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
                metadata: metadata.clone(),
                etag: etag.clone(),
                last_modified: Timestamp::now(),
            },
        );
        Ok(etag)
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        let mut state = self.lock();
        state.calls.delete += 1;
        if state.faults.delete.contains(key) {
            return Err(injected("delete", key));
        }
        state
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| no_such_bucket(bucket))?
            .remove(key);
        Ok(())
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<bool> {
        let state = self.lock();
        if state.faults.head.contains(key) {
            return Err(injected("head", key));
        }
        Ok(state
            .buckets
            .get(bucket)
            .is_some_and(|objects| objects.contains_key(key)))
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        Ok(self.lock().buckets.contains_key(bucket))
    }

    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        let mut state = self.lock();
        if state.buckets.contains_key(bucket) {
            return Err(Error::Conflict(format!("bucket '{bucket}' already exists")));
        }
        state.buckets.insert(bucket.to_string(), BTreeMap::new());
        Ok(())
    }
}
