//! bp-core: transfer engine for bucketport
//!
//! This crate provides everything the `bp` CLI does that is not tied to a
//! particular S3 SDK:
//! - Configuration and profile management
//! - Path parsing and key validation
//! - The ObjectStore trait, plus an in-memory implementation
//! - Bucket enumeration, archive and directory codecs, bucket sync
//! - Connectivity and persistence probes
//!
//! The engine only talks to storage through [`ObjectStore`], so every
//! operation can be exercised against [`MemoryStore`] in tests.

mod archive;
pub mod config;
mod directory;
pub mod enumerate;
pub mod error;
pub mod manifest;
pub mod memory;
pub mod path;
pub mod probe;
pub mod profile;
pub mod report;
pub mod sync;
pub mod traits;
pub mod transfer;

pub use config::{Config, ConfigManager};
pub use enumerate::{collect_objects, enumerate};
pub use error::{Error, Result};
pub use manifest::{MANIFEST_NAME, ManifestEntry, TransferManifest};
pub use memory::MemoryStore;
pub use path::{ParsedPath, RemotePath, parse_path, parse_remote};
pub use probe::{ProbeState, ProbeStateFile, SmokeReport};
pub use profile::{Profile, ProfileManager};
pub use report::{ExportReport, Progress, TransferFailure, TransferResult};
pub use sync::SyncPlan;
pub use traits::{ListOptions, ListPage, ObjectDescriptor, ObjectPayload, ObjectStore};
pub use transfer::{Transfer, TransferOptions};
