//! Bucket-to-bucket sync
//!
//! A sync is planned from two complete listings and then executed. Objects
//! are compared by entity tag only; sizes and timestamps are not consulted.

use std::collections::BTreeMap;

use futures::stream::{self, StreamExt};
use serde::Serialize;

use crate::enumerate::collect_objects;
use crate::error::{Error, Result};
use crate::report::{Progress, ProgressTracker, TransferResult};
use crate::traits::{ObjectDescriptor, ObjectStore};
use crate::transfer::TransferOptions;

/// What a sync will do, key by key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncPlan {
    /// Source objects missing from the destination or with a different etag
    pub copy: Vec<ObjectDescriptor>,
    /// Source keys whose destination copy already has the same etag
    pub skip: Vec<String>,
    /// Destination-only keys (only populated when deleting orphans)
    pub delete: Vec<String>,
}

impl SyncPlan {
    /// Classify every source key, and every orphan when `delete_orphans`
    pub fn build(
        source: &BTreeMap<String, ObjectDescriptor>,
        dest: &BTreeMap<String, ObjectDescriptor>,
        delete_orphans: bool,
    ) -> Self {
        let mut plan = SyncPlan::default();
        for (key, object) in source {
            match dest.get(key) {
                Some(existing) if existing.etag == object.etag => plan.skip.push(key.clone()),
                _ => plan.copy.push(object.clone()),
            }
        }
        if delete_orphans {
            plan.delete = dest
                .keys()
                .filter(|key| !source.contains_key(*key))
                .cloned()
                .collect();
        }
        plan
    }

    /// Number of source keys the plan covers
    pub fn source_total(&self) -> u64 {
        (self.copy.len() + self.skip.len()) as u64
    }

    /// True when executing the plan would change nothing
    pub fn is_noop(&self) -> bool {
        self.copy.is_empty() && self.delete.is_empty()
    }
}

/// List both buckets completely and build the plan
pub(crate) async fn plan(
    store: &dyn ObjectStore,
    source_bucket: &str,
    dest_bucket: &str,
    prefix: &str,
    delete_orphans: bool,
    options: &TransferOptions,
) -> Result<SyncPlan> {
    let source = index(store, source_bucket, prefix, options.page_size).await?;
    let dest = index(store, dest_bucket, prefix, options.page_size).await?;
    let plan = SyncPlan::build(&source, &dest, delete_orphans);
    tracing::info!(
        source = source_bucket,
        dest = dest_bucket,
        prefix,
        copy = plan.copy.len(),
        skip = plan.skip.len(),
        delete = plan.delete.len(),
        "sync planned"
    );
    Ok(plan)
}

async fn index(
    store: &dyn ObjectStore,
    bucket: &str,
    prefix: &str,
    page_size: i32,
) -> Result<BTreeMap<String, ObjectDescriptor>> {
    Ok(collect_objects(store, bucket, prefix, page_size)
        .await?
        .into_iter()
        .map(|object| (object.key.clone(), object))
        .collect())
}

/// Carry out `plan`: copies first, then orphan deletions
pub(crate) async fn execute(
    store: &dyn ObjectStore,
    source_bucket: &str,
    dest_bucket: &str,
    plan: &SyncPlan,
    options: &TransferOptions,
    progress: Option<Progress<'_>>,
) -> TransferResult {
    let mut result = TransferResult::default();
    let mut tracker = ProgressTracker::new(progress, plan.source_total());

    for key in &plan.skip {
        tracing::debug!(%key, "unchanged, skipped");
        result.record_skip();
        tracker.tick();
    }

    let mut copies = stream::iter(&plan.copy)
        .map(move |object| async move {
            let copied = copy_object(store, source_bucket, dest_bucket, &object.key).await;
            (object.key.as_str(), copied)
        })
        .buffer_unordered(options.workers());

    while let Some((key, copied)) = copies.next().await {
        match copied {
            Ok(()) => {
                tracing::debug!(%key, "copied");
                result.record_success();
            }
            Err(e) => {
                tracing::error!(%key, error = %e, "failed to copy object");
                result.record_failure(key, &e);
            }
        }
        tracker.tick();
    }

    let mut deletions = stream::iter(&plan.delete)
        .map(move |key| async move {
            let deleted = store
                .delete_object(dest_bucket, key)
                .await
                .map_err(|e| Error::transfer(key, e));
            (key.as_str(), deleted)
        })
        .buffer_unordered(options.workers());

    while let Some((key, deleted)) = deletions.next().await {
        match deleted {
            Ok(()) => {
                tracing::debug!(%key, "deleted orphan");
                result.record_delete();
            }
            Err(e) => {
                tracing::error!(%key, error = %e, "failed to delete orphan");
                result.record_failure(key, &e);
            }
        }
    }

    tracing::info!(
        source = source_bucket,
        dest = dest_bucket,
        copied = result.succeeded,
        skipped = result.skipped,
        deleted = result.deleted,
        failed = result.failed,
        "sync complete"
    );
    result
}

async fn copy_object(
    store: &dyn ObjectStore,
    source_bucket: &str,
    dest_bucket: &str,
    key: &str,
) -> Result<()> {
    let payload = store
        .get_object(source_bucket, key)
        .await
        .map_err(|e| Error::transfer(key, e))?;
    store
        .put_object(
            dest_bucket,
            key,
            payload.data,
            &payload.content_type,
            &payload.metadata,
        )
        .await
        .map_err(|e| Error::transfer(key, e))?;
    Ok(())
}
