//! Archive codec
//!
//! Exports a bucket into a gzip-compressed tar archive and imports such an
//! archive back into a bucket. Each object becomes one regular-file member
//! named by its key, folder markers (`photos/`) become directory members,
//! and `_manifest.json` is always the last member.
//!
//! Tar and gzip work is blocking, so it runs on the blocking pool: export
//! hands payloads to a writer task over a channel, import reads members on
//! a reader task.
//!
//! Import reads the archive twice: a gzip stream cannot seek, and the
//! manifest that carries content types and user metadata sits at the end.
//! The first pass validates every member and loads the manifest; nothing
//! is uploaded unless the whole archive is well-formed.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use futures::stream::{self, StreamExt};
use jiff::Timestamp;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::enumerate::collect_objects;
use crate::error::{Error, Result};
use crate::manifest::{MANIFEST_NAME, ManifestBuilder, ManifestEntry, TransferManifest};
use crate::path::{is_folder_marker, validate_key};
use crate::report::{ExportReport, Progress, ProgressTracker, TransferResult};
use crate::traits::{ObjectDescriptor, ObjectPayload, ObjectStore};
use crate::transfer::{ImportOutcome, TransferOptions, import_object};

/// An object member read from an archive
#[derive(Debug)]
struct ArchiveMember {
    key: String,
    data: Vec<u8>,
}

/// What the validation pass learned about an archive
#[derive(Debug, Default)]
struct ArchiveScan {
    manifest: Option<TransferManifest>,
    /// Directory members the manifest lists as folder-marker objects
    markers: BTreeSet<String>,
    object_members: u64,
}

/// Work for the blocking archive writer
enum WriteRequest {
    Object {
        key: String,
        mtime: Option<Timestamp>,
        data: Vec<u8>,
        done: oneshot::Sender<Result<()>>,
    },
    Manifest(TransferManifest),
}

/// Handle to the writer task that owns the tar builder
struct ArchiveWriter {
    tx: mpsc::Sender<WriteRequest>,
    task: JoinHandle<Result<()>>,
}

impl ArchiveWriter {
    async fn create(path: &Path) -> Result<Self> {
        let path = path.to_path_buf();
        let file = tokio::task::spawn_blocking(move || File::create(path))
            .await
            .map_err(|e| Error::General(format!("archive create task failed: {e}")))??;

        let (tx, rx) = mpsc::channel(1);
        let task = tokio::task::spawn_blocking(move || write_members(file, rx));
        Ok(Self { tx, task })
    }

    /// Append one object member and wait until it is written
    async fn append(&self, object: &ObjectDescriptor, data: Vec<u8>) -> Result<()> {
        let (done, written) = oneshot::channel();
        let request = WriteRequest::Object {
            key: object.key.clone(),
            mtime: object.last_modified,
            data,
            done,
        };
        self.tx.send(request).await.map_err(|_| writer_stopped())?;
        written.await.map_err(|_| writer_stopped())?
    }

    /// Append the manifest, then finish and flush the archive
    async fn finish(self, manifest: TransferManifest) -> Result<()> {
        let sent = self.tx.send(WriteRequest::Manifest(manifest)).await;
        drop(self.tx);
        self.task
            .await
            .map_err(|e| Error::General(format!("archive writer task failed: {e}")))??;
        sent.map_err(|_| writer_stopped())
    }
}

fn writer_stopped() -> Error {
    Error::General("archive writer stopped unexpectedly".into())
}

/// Export `bucket` (restricted to `prefix`) into a `.tar.gz` at `output_path`
pub(crate) async fn export_archive(
    store: &dyn ObjectStore,
    bucket: &str,
    output_path: &Path,
    prefix: &str,
    options: &TransferOptions,
    progress: Option<Progress<'_>>,
) -> Result<ExportReport> {
    tracing::info!(bucket, prefix, path = %output_path.display(), "starting archive export");

    let objects = collect_objects(store, bucket, prefix, options.page_size).await?;
    let total = objects.len() as u64;
    tracing::info!(bucket, objects = total, "found objects to export");

    let writer = ArchiveWriter::create(output_path).await?;
    let mut manifest = ManifestBuilder::new(bucket);
    let mut result = TransferResult::default();
    let mut tracker = ProgressTracker::new(progress, total);

    let mut fetches = stream::iter(objects)
        .map(move |object| async move {
            let payload = fetch_for_export(store, bucket, &object.key).await;
            (object, payload)
        })
        .buffered(options.workers());

    while let Some((object, fetched)) = fetches.next().await {
        let written = match fetched {
            Ok(mut payload) => {
                let data = std::mem::take(&mut payload.data);
                let size = data.len() as u64;
                writer
                    .append(&object, data)
                    .await
                    .map(|()| (payload, size))
            }
            Err(e) => Err(e),
        };

        match written {
            Ok((payload, size)) => {
                tracing::debug!(key = %object.key, size, "exported");
                manifest.record(manifest_entry(&object, payload, size));
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
    writer.finish(manifest.clone()).await?;

    tracing::info!(
        bucket,
        exported = result.succeeded,
        failed = result.failed,
        total,
        "archive export complete"
    );
    Ok(ExportReport { manifest, result })
}

/// Import every object member of the archive at `input_path` into `bucket`
pub(crate) async fn import_archive(
    store: &dyn ObjectStore,
    bucket: &str,
    input_path: &Path,
    overwrite: bool,
    options: &TransferOptions,
    progress: Option<Progress<'_>>,
) -> Result<TransferResult> {
    tracing::info!(bucket, path = %input_path.display(), overwrite, "starting archive import");

    let path = input_path.to_path_buf();
    let scan = tokio::task::spawn_blocking(move || scan_archive(&path))
        .await
        .map_err(|e| Error::General(format!("archive scan task failed: {e}")))??;
    let total = scan.object_members;

    let lookup: BTreeMap<String, ManifestEntry> = match scan.manifest {
        Some(manifest) => manifest
            .objects
            .into_iter()
            .map(|entry| (entry.key.clone(), entry))
            .collect(),
        None => {
            let warning = Error::ManifestMissing(input_path.display().to_string());
            tracing::warn!(
                "{warning}; importing with default content type and no metadata"
            );
            BTreeMap::new()
        }
    };

    let workers = options.workers();
    let (tx, rx) = mpsc::channel::<Result<ArchiveMember>>(workers);
    let path = input_path.to_path_buf();
    let markers = scan.markers;
    let reader = tokio::task::spawn_blocking(move || read_members(path, markers, tx));

    let members = Box::pin(stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|member| (member, rx))
    }));

    let lookup = &lookup;
    let mut uploads = members
        .map(move |member| async move {
            let member = member?;
            let entry = lookup.get(&member.key);
            let data = member.data;
            let outcome = import_object(
                store,
                bucket,
                &member.key,
                overwrite,
                entry.map(|e| e.content_type.clone()),
                entry.map(|e| e.metadata.clone()).unwrap_or_default(),
                async move { Ok(data) },
            )
            .await;
            Ok::<_, Error>((member.key, outcome))
        })
        .buffer_unordered(workers);

    let mut result = TransferResult::default();
    let mut tracker = ProgressTracker::new(progress, total);

    while let Some(item) = uploads.next().await {
        let (key, outcome) = item?;
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
                tracing::error!(%key, error = %e, "failed to import object");
                result.record_failure(key, &e);
            }
        }
        tracker.tick();
    }
    drop(uploads);

    reader
        .await
        .map_err(|e| Error::General(format!("archive reader task failed: {e}")))?;

    tracing::info!(
        bucket,
        imported = result.succeeded,
        skipped = result.skipped,
        failed = result.failed,
        "archive import complete"
    );
    Ok(result)
}

async fn fetch_for_export(store: &dyn ObjectStore, bucket: &str, key: &str) -> Result<ObjectPayload> {
    if !is_folder_marker(key) {
        validate_key(key)?;
    }
    store
        .get_object(bucket, key)
        .await
        .map_err(|e| Error::transfer(key, e))
}

fn manifest_entry(object: &ObjectDescriptor, payload: ObjectPayload, size: u64) -> ManifestEntry {
    let etag = if payload.etag.is_empty() {
        object.etag.clone()
    } else {
        payload.etag
    };
    ManifestEntry {
        key: object.key.clone(),
        size,
        etag,
        content_type: payload.content_type,
        metadata: payload.metadata,
    }
}

fn file_header(size: u64, mtime: Option<Timestamp>) -> tar::Header {
    let mtime = mtime.unwrap_or_else(Timestamp::now).as_second().max(0) as u64;
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Regular);
    header.set_size(size);
    header.set_mode(0o644);
    header.set_mtime(mtime);
    header
}

/// Runs on the blocking pool until the export drops its sender
fn write_members(file: File, mut rx: mpsc::Receiver<WriteRequest>) -> Result<()> {
    let mut archive =
        tar::Builder::new(GzEncoder::new(BufWriter::new(file), Compression::default()));

    while let Some(request) = rx.blocking_recv() {
        match request {
            WriteRequest::Object {
                key,
                mtime,
                data,
                done,
            } => {
                let _ = done.send(append_object(&mut archive, &key, mtime, &data));
            }
            WriteRequest::Manifest(manifest) => append_manifest(&mut archive, &manifest)?,
        }
    }

    let mut writer = archive.into_inner()?.finish()?;
    writer.flush()?;
    Ok(())
}

fn append_object<W: Write>(
    archive: &mut tar::Builder<W>,
    key: &str,
    mtime: Option<Timestamp>,
    data: &[u8],
) -> Result<()> {
    let mut header = file_header(data.len() as u64, mtime);
    if is_folder_marker(key) {
        if !data.is_empty() {
            return Err(Error::transfer(key, "folder marker has content"));
        }
        header.set_entry_type(tar::EntryType::Directory);
        header.set_mode(0o755);
    }
    archive
        .append_data(&mut header, key, data)
        .map_err(|e| Error::transfer(key, e))
}

fn append_manifest<W: Write>(
    archive: &mut tar::Builder<W>,
    manifest: &TransferManifest,
) -> Result<()> {
    let bytes = manifest.to_json()?;
    let mut header = file_header(bytes.len() as u64, Some(manifest.created_at));
    archive.append_data(&mut header, MANIFEST_NAME, bytes.as_slice())?;
    Ok(())
}

fn format_error(e: impl std::fmt::Display) -> Error {
    Error::ArchiveFormat(e.to_string())
}

fn open_archive(path: &Path) -> Result<tar::Archive<GzDecoder<BufReader<File>>>> {
    let file = File::open(path)?;
    Ok(tar::Archive::new(GzDecoder::new(BufReader::new(file))))
}

enum MemberKind {
    Object(String),
    /// A directory, as the folder-marker key it would restore to
    Directory(String),
    Manifest,
    Ignored,
}

/// Classify a member, rejecting anything that is not a plain file or directory
fn classify<R: Read>(entry: &tar::Entry<'_, R>) -> Result<MemberKind> {
    let raw = entry.path_bytes();
    let name = std::str::from_utf8(&raw)
        .map_err(|_| format_error("member name is not valid UTF-8"))?;
    let name = name.strip_prefix("./").unwrap_or(name);

    match entry.header().entry_type() {
        tar::EntryType::Regular | tar::EntryType::Continuous => {}
        tar::EntryType::Directory => {
            let marker = format!("{}/", name.trim_end_matches('/'));
            return Ok(if is_folder_marker(&marker) {
                MemberKind::Directory(marker)
            } else {
                MemberKind::Ignored
            });
        }
        tar::EntryType::XGlobalHeader | tar::EntryType::XHeader => {
            return Ok(MemberKind::Ignored);
        }
        other => {
            return Err(format_error(format!(
                "unexpected member '{name}' of type {other:?}"
            )));
        }
    }

    if name == MANIFEST_NAME {
        return Ok(MemberKind::Manifest);
    }
    validate_key(name).map_err(|e| format_error(format!("unexpected member: {e}")))?;
    Ok(MemberKind::Object(name.to_string()))
}

fn scan_archive(path: &Path) -> Result<ArchiveScan> {
    let mut archive = open_archive(path)?;
    let mut scan = ArchiveScan::default();
    let mut directories = Vec::new();
    let mut seen_manifest = false;

    for entry in archive.entries().map_err(format_error)? {
        let mut entry = entry.map_err(format_error)?;
        match classify(&entry)? {
            MemberKind::Object(_) => scan.object_members += 1,
            MemberKind::Directory(marker) => directories.push(marker),
            MemberKind::Manifest => {
                if seen_manifest {
                    return Err(format_error("archive contains more than one manifest"));
                }
                seen_manifest = true;
                let mut bytes = Vec::new();
                entry.read_to_end(&mut bytes).map_err(format_error)?;
                match TransferManifest::from_json(&bytes) {
                    Ok(manifest) => scan.manifest = Some(manifest),
                    Err(e) => tracing::warn!(error = %e, "ignoring unreadable manifest"),
                }
            }
            MemberKind::Ignored => {}
        }
    }

    // Plain directories only restore as objects when the export recorded them
    if let Some(manifest) = &scan.manifest {
        let listed: BTreeSet<&str> = manifest.objects.iter().map(|e| e.key.as_str()).collect();
        scan.markers = directories
            .into_iter()
            .filter(|marker| listed.contains(marker.as_str()))
            .collect();
        scan.object_members += scan.markers.len() as u64;
    }
    Ok(scan)
}

fn read_members(path: PathBuf, markers: BTreeSet<String>, tx: mpsc::Sender<Result<ArchiveMember>>) {
    if let Err(e) = send_members(&path, &markers, &tx) {
        let _ = tx.blocking_send(Err(e));
    }
}

fn send_members(
    path: &Path,
    markers: &BTreeSet<String>,
    tx: &mpsc::Sender<Result<ArchiveMember>>,
) -> Result<()> {
    let mut archive = open_archive(path)?;
    for entry in archive.entries().map_err(format_error)? {
        let mut entry = entry.map_err(format_error)?;
        let member = match classify(&entry)? {
            MemberKind::Object(key) => {
                let mut data = Vec::with_capacity(entry.size() as usize);
                entry.read_to_end(&mut data).map_err(format_error)?;
                ArchiveMember { key, data }
            }
            MemberKind::Directory(key) if markers.contains(&key) => ArchiveMember {
                key,
                data: Vec::new(),
            },
            _ => continue,
        };
        if tx.blocking_send(Ok(member)).is_err() {
            // receiver gone: the import stopped early
            return Ok(());
        }
    }
    Ok(())
}
