//! Directory codec
//!
//! A bucket mirrored to a local tree: one file per object at its key path,
//! plus `_manifest.json` at the root, written after every object.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use futures::stream::{self, StreamExt};
use walkdir::WalkDir;

use crate::enumerate::collect_objects;
use crate::error::{Error, Result};
use crate::manifest::{MANIFEST_NAME, ManifestBuilder, ManifestEntry, TransferManifest};
use crate::path::{key_to_path, relative_path_to_key};
use crate::report::{ExportReport, Progress, ProgressTracker, TransferResult};
use crate::traits::{DEFAULT_CONTENT_TYPE, ObjectPayload, ObjectStore};
use crate::transfer::{ImportOutcome, TransferOptions, import_object};

/// A file found under an import root
#[derive(Debug)]
enum LocalEntry {
    File { relative: String, path: PathBuf },
    Unreadable { name: String, error: Error },
}

/// Export `bucket` (restricted to `prefix`) into `output_dir`
pub(crate) async fn export_directory(
    store: &dyn ObjectStore,
    bucket: &str,
    output_dir: &Path,
    prefix: &str,
    options: &TransferOptions,
    progress: Option<Progress<'_>>,
) -> Result<ExportReport> {
    tracing::info!(bucket, prefix, dir = %output_dir.display(), "starting directory export");

    let objects = collect_objects(store, bucket, prefix, options.page_size).await?;
    let total = objects.len() as u64;
    tracing::info!(bucket, objects = total, "found objects to export");

    tokio::fs::create_dir_all(output_dir).await?;

    let mut manifest = ManifestBuilder::new(bucket);
    let mut result = TransferResult::default();
    let mut tracker = ProgressTracker::new(progress, total);

    let mut writes = stream::iter(objects)
        .map(move |object| async move {
            let written = write_object(store, bucket, output_dir, &object.key).await;
            (object, written)
        })
        .buffered(options.workers());

    while let Some((object, written)) = writes.next().await {
        match written {
            Ok(payload) => {
                tracing::debug!(key = %object.key, size = payload.data.len(), "exported");
                manifest.record(ManifestEntry {
                    key: object.key,
                    size: payload.data.len() as u64,
                    etag: if payload.etag.is_empty() {
                        object.etag
                    } else {
                        payload.etag
                    },
                    content_type: payload.content_type,
                    metadata: payload.metadata,
                });
                result.record_success();
            }
            Err(e) => {
                tracing::error!(key = %object.key, error = %e, "failed to export object");
                result.record_failure(&object.key, &e);
            }
        }
        tracker.tick();
    }

    let manifest = manifest.finish();
    tokio::fs::write(output_dir.join(MANIFEST_NAME), manifest.to_json()?).await?;

    tracing::info!(
        bucket,
        exported = result.succeeded,
        failed = result.failed,
        total,
        "directory export complete"
    );
    Ok(ExportReport { manifest, result })
}

/// Upload every regular file under `input_dir` into `bucket`
pub(crate) async fn import_directory(
    store: &dyn ObjectStore,
    bucket: &str,
    input_dir: &Path,
    prefix: &str,
    overwrite: bool,
    options: &TransferOptions,
    progress: Option<Progress<'_>>,
) -> Result<TransferResult> {
    tracing::info!(bucket, prefix, dir = %input_dir.display(), overwrite, "starting directory import");

    match tokio::fs::metadata(input_dir).await {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => {
            return Err(Error::InvalidPath(format!(
                "{} is not a directory",
                input_dir.display()
            )));
        }
        Err(e) => {
            return Err(Error::InvalidPath(format!("{}: {e}", input_dir.display())));
        }
    }

    let manifest = load_sidecar_manifest(input_dir).await;
    let lookup: BTreeMap<String, ManifestEntry> = manifest
        .map(|m| m.objects.into_iter().map(|e| (e.key.clone(), e)).collect())
        .unwrap_or_default();

    let root = input_dir.to_path_buf();
    let entries = tokio::task::spawn_blocking(move || walk_files(&root))
        .await
        .map_err(|e| Error::General(format!("directory walk task failed: {e}")))?;
    let total = entries.len() as u64;
    tracing::info!(files = total, "found files to import");

    let lookup = &lookup;
    let mut uploads = stream::iter(entries)
        .map(move |entry| async move {
            let (relative, path) = match entry {
                LocalEntry::File { relative, path } => (relative, path),
                LocalEntry::Unreadable { name, error } => {
                    return (name.clone(), Err(Error::transfer(name, error)));
                }
            };
            let key = format!("{prefix}{relative}");
            let (content_type, metadata) = match lookup.get(&relative) {
                Some(entry) => (entry.content_type.clone(), entry.metadata.clone()),
                None => (guess_content_type(&path), BTreeMap::new()),
            };
            let outcome = import_object(
                store,
                bucket,
                &key,
                overwrite,
                Some(content_type),
                metadata,
                async move { tokio::fs::read(&path).await.map_err(Error::from) },
            )
            .await;
            (key, outcome)
        })
        .buffer_unordered(options.workers());

    let mut result = TransferResult::default();
    let mut tracker = ProgressTracker::new(progress, total);

    while let Some((key, outcome)) = uploads.next().await {
        match outcome {
            Ok(ImportOutcome::Uploaded) => {
                tracing::debug!(%key, "imported");
                result.record_success();
            }
            Ok(ImportOutcome::Skipped) => {
                tracing::debug!(%key, "exists, skipped");
                result.record_skip();
            }
            Err(e) => {
                tracing::error!(%key, error = %e, "failed to import file");
                result.record_failure(key, &e);
            }
        }
        tracker.tick();
    }

    tracing::info!(
        bucket,
        imported = result.succeeded,
        skipped = result.skipped,
        failed = result.failed,
        "directory import complete"
    );
    Ok(result)
}

async fn write_object(
    store: &dyn ObjectStore,
    bucket: &str,
    output_dir: &Path,
    key: &str,
) -> Result<ObjectPayload> {
    let path = key_to_path(output_dir, key)?;
    let payload = store
        .get_object(bucket, key)
        .await
        .map_err(|e| Error::transfer(key, e))?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::transfer(key, e))?;
    }
    tokio::fs::write(&path, &payload.data)
        .await
        .map_err(|e| Error::transfer(key, e))?;
    Ok(payload)
}

async fn load_sidecar_manifest(dir: &Path) -> Option<TransferManifest> {
    let path = dir.join(MANIFEST_NAME);
    let loaded = match tokio::fs::read(&path).await {
        Ok(bytes) => TransferManifest::from_json(&bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(Error::ManifestMissing(dir.display().to_string()))
        }
        Err(e) => Err(e.into()),
    };
    match loaded {
        Ok(manifest) => Some(manifest),
        Err(e) => {
            tracing::warn!(error = %e, "no usable manifest; guessing content types from file names");
            None
        }
    }
}

fn guess_content_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string()
}

/// Regular files under `root`, sorted by name, symlinks not followed
fn walk_files(root: &Path) -> Vec<LocalEntry> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let name = e
                    .path()
                    .unwrap_or(root)
                    .display()
                    .to_string();
                entries.push(LocalEntry::Unreadable {
                    name,
                    error: Error::Io(e.into()),
                });
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        if relative == Path::new(MANIFEST_NAME) {
            continue;
        }
        match relative_path_to_key(relative) {
            Ok(relative) => entries.push(LocalEntry::File {
                relative,
                path: entry.path().to_path_buf(),
            }),
            Err(error) => entries.push(LocalEntry::Unreadable {
                name: relative.display().to_string(),
                error,
            }),
        }
    }
    entries
}
