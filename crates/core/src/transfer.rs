//! Transfer orchestrator
//!
//! [`Transfer`] is the public entry point of the engine. It owns one object
//! store client and the tuning knobs, and dispatches to the archive codec,
//! the directory codec and the sync engine.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::archive;
use crate::directory;
use crate::enumerate::DEFAULT_PAGE_SIZE;
use crate::error::{Error, Result};
use crate::report::{ExportReport, Progress, TransferResult};
use crate::sync::{self, SyncPlan};
use crate::traits::{DEFAULT_CONTENT_TYPE, ObjectStore};

/// Default number of objects in flight at once
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Tuning for transfer operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOptions {
    /// Keys requested per list call
    #[serde(default = "default_page_size")]
    pub page_size: i32,

    /// Upper bound on concurrent per-object fetch/put work
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
}

fn default_page_size() -> i32 {
    DEFAULT_PAGE_SIZE
}

fn default_max_workers() -> usize {
    DEFAULT_MAX_WORKERS
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_workers: default_max_workers(),
        }
    }
}

impl TransferOptions {
    /// Effective worker count (never zero)
    pub fn workers(&self) -> usize {
        self.max_workers.max(1)
    }
}

/// What happened to one imported object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ImportOutcome {
    Uploaded,
    Skipped,
}

/// Upload one object unless `overwrite` is off and the key already exists
///
/// `load` is only awaited when the object is actually uploaded. Every error
/// comes back as [`Error::ObjectTransfer`].
pub(crate) async fn import_object<F>(
    store: &dyn ObjectStore,
    bucket: &str,
    key: &str,
    overwrite: bool,
    content_type: Option<String>,
    metadata: BTreeMap<String, String>,
    load: F,
) -> Result<ImportOutcome>
where
    F: Future<Output = Result<Vec<u8>>>,
{
    if !overwrite {
        let exists = store
            .head_object(bucket, key)
            .await
            .map_err(|e| Error::transfer(key, format!("existence check failed: {e}")))?;
        if exists {
            return Ok(ImportOutcome::Skipped);
        }
    }

    let data = load.await.map_err(|e| Error::transfer(key, e))?;
    let content_type = content_type.unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
    store
        .put_object(bucket, key, data, &content_type, &metadata)
        .await
        .map_err(|e| Error::transfer(key, e))?;
    Ok(ImportOutcome::Uploaded)
}

/// Backup, restore and sync over one object store
#[derive(Clone)]
pub struct Transfer {
    store: Arc<dyn ObjectStore>,
    options: TransferOptions,
}

impl std::fmt::Debug for Transfer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transfer")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Transfer {
    pub fn new(store: Arc<dyn ObjectStore>, options: TransferOptions) -> Self {
        Self { store, options }
    }

    /// The underlying object store
    pub fn store(&self) -> &dyn ObjectStore {
        self.store.as_ref()
    }

    pub fn options(&self) -> &TransferOptions {
        &self.options
    }

    /// List bucket names
    pub async fn list_buckets(&self) -> Result<Vec<String>> {
        self.store.list_buckets().await
    }

    /// Export a bucket to a gzip-compressed tar archive
    ///
    /// Objects that cannot be fetched or written are skipped and recorded
    /// in the report; the manifest lists only the objects that made it.
    pub async fn export_bucket(
        &self,
        bucket: &str,
        output_path: &Path,
        prefix: &str,
        progress: Option<Progress<'_>>,
    ) -> Result<ExportReport> {
        archive::export_archive(
            self.store(),
            bucket,
            output_path,
            prefix,
            &self.options,
            progress,
        )
        .await
    }

    /// Import an archive produced by [`Transfer::export_bucket`]
    pub async fn import_bucket(
        &self,
        bucket: &str,
        input_path: &Path,
        overwrite: bool,
        progress: Option<Progress<'_>>,
    ) -> Result<TransferResult> {
        archive::import_archive(
            self.store(),
            bucket,
            input_path,
            overwrite,
            &self.options,
            progress,
        )
        .await
    }

    /// Mirror a bucket into a local directory
    pub async fn export_to_directory(
        &self,
        bucket: &str,
        output_dir: &Path,
        prefix: &str,
        progress: Option<Progress<'_>>,
    ) -> Result<ExportReport> {
        directory::export_directory(
            self.store(),
            bucket,
            output_dir,
            prefix,
            &self.options,
            progress,
        )
        .await
    }

    /// Upload a local directory tree, keys prefixed with `prefix`
    pub async fn import_from_directory(
        &self,
        bucket: &str,
        input_dir: &Path,
        prefix: &str,
        overwrite: bool,
        progress: Option<Progress<'_>>,
    ) -> Result<TransferResult> {
        directory::import_directory(
            self.store(),
            bucket,
            input_dir,
            prefix,
            overwrite,
            &self.options,
            progress,
        )
        .await
    }

    /// Compute what [`Transfer::sync_buckets`] would do, without doing it
    pub async fn plan_sync(
        &self,
        source_bucket: &str,
        dest_bucket: &str,
        prefix: &str,
        delete_orphans: bool,
    ) -> Result<SyncPlan> {
        sync::plan(
            self.store(),
            source_bucket,
            dest_bucket,
            prefix,
            delete_orphans,
            &self.options,
        )
        .await
    }

    /// Make `dest_bucket` match `source_bucket` under `prefix`
    ///
    /// `succeeded` in the result counts copied objects.
    pub async fn sync_buckets(
        &self,
        source_bucket: &str,
        dest_bucket: &str,
        prefix: &str,
        delete_orphans: bool,
        progress: Option<Progress<'_>>,
    ) -> Result<TransferResult> {
        let plan = self
            .plan_sync(source_bucket, dest_bucket, prefix, delete_orphans)
            .await?;
        Ok(sync::execute(
            self.store(),
            source_bucket,
            dest_bucket,
            &plan,
            &self.options,
            progress,
        )
        .await)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::memory::MemoryStore;

    #[test]
    fn test_options_defaults() {
        let options = TransferOptions::default();
        assert_eq!(options.page_size, 1000);
        assert_eq!(options.max_workers, 4);
    }

    #[test]
    fn test_zero_workers_clamped() {
        let options = TransferOptions {
            max_workers: 0,
            ..Default::default()
        };
        assert_eq!(options.workers(), 1);
    }

    #[tokio::test]
    async fn test_import_object_skips_existing_without_loading() {
        let store = MemoryStore::with_buckets(&["b"]);
        store.insert("b", "k", "old");

        let loaded = AtomicBool::new(false);

        let outcome = import_object(&store, "b", "k", false, None, BTreeMap::new(), async {
            loaded.store(true, Ordering::SeqCst);
            Ok(b"new".to_vec())
        })
        .await
        .unwrap();

        assert_eq!(outcome, ImportOutcome::Skipped);
        assert!(!loaded.load(Ordering::SeqCst));
        assert_eq!(store.object("b", "k").unwrap().data, b"old");
    }

    #[tokio::test]
    async fn test_import_object_overwrites_by_default() {
        let store = MemoryStore::with_buckets(&["b"]);
        store.insert("b", "k", "old");

        let outcome = import_object(&store, "b", "k", true, None, BTreeMap::new(), async {
            Ok(b"new".to_vec())
        })
        .await
        .unwrap();

        assert_eq!(outcome, ImportOutcome::Uploaded);
        let object = store.object("b", "k").unwrap();
        assert_eq!(object.data, b"new");
        assert_eq!(object.content_type, DEFAULT_CONTENT_TYPE);
    }

    #[tokio::test]
    async fn test_import_object_head_failure_is_transfer_error() {
        let store = MemoryStore::with_buckets(&["b"]);
        store.fail_head("k");

        let err = import_object(&store, "b", "k", false, None, BTreeMap::new(), async {
            Ok(Vec::new())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, Error::ObjectTransfer { .. }));
    }

    #[tokio::test]
    async fn test_transfer_lists_buckets() {
        let store = Arc::new(MemoryStore::with_buckets(&["a", "b"]));
        let transfer = Transfer::new(store, TransferOptions::default());
        assert_eq!(transfer.list_buckets().await.unwrap(), vec!["a", "b"]);
    }
}
