//! Transfer manifest
//!
//! The manifest is the durable index of a completed export. It is written
//! as the final member of an archive (or as a sidecar file in a directory
//! export) after every object, so its presence marks the export complete.
//!
//! The JSON layout is fixed:
//! `{version, created_at, bucket, total_objects, total_size, objects: [...]}`.

use std::collections::BTreeMap;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::traits::DEFAULT_CONTENT_TYPE;

/// Reserved member / file name of the manifest
pub const MANIFEST_NAME: &str = "_manifest.json";

/// Manifest format version written by this crate
pub const FORMAT_VERSION: &str = "1.0";

/// Durable record of one transferred object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub key: String,
    pub size: u64,
    pub etag: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

fn default_content_type() -> String {
    DEFAULT_CONTENT_TYPE.to_string()
}

/// Index of an archive or directory export
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferManifest {
    /// Manifest format version
    pub version: String,

    /// When the export finished
    pub created_at: Timestamp,

    /// Source bucket
    pub bucket: String,

    /// Number of objects actually written
    pub total_objects: u64,

    /// Sum of the sizes of the objects actually written
    pub total_size: u64,

    /// One entry per written object, in write order
    #[serde(default)]
    pub objects: Vec<ManifestEntry>,
}

impl TransferManifest {
    /// Serialize to the canonical pretty-printed JSON encoding
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Parse a manifest from its JSON encoding
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Index entries by key
    pub fn lookup(&self) -> BTreeMap<&str, &ManifestEntry> {
        self.objects.iter().map(|e| (e.key.as_str(), e)).collect()
    }
}

/// Accumulates entries for successfully written objects
///
/// Totals are derived from recorded entries only, so a manifest can never
/// count an object that is not in the container.
#[derive(Debug)]
pub struct ManifestBuilder {
    bucket: String,
    entries: Vec<ManifestEntry>,
}

impl ManifestBuilder {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            entries: Vec::new(),
        }
    }

    /// Record an object that has been written to the container
    pub fn record(&mut self, entry: ManifestEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Finish the manifest, stamping it with the current time
    pub fn finish(self) -> TransferManifest {
        TransferManifest {
            version: FORMAT_VERSION.to_string(),
            created_at: Timestamp::now(),
            bucket: self.bucket,
            total_objects: self.entries.len() as u64,
            total_size: self.entries.iter().map(|e| e.size).sum(),
            objects: self.entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, size: u64) -> ManifestEntry {
        ManifestEntry {
            key: key.to_string(),
            size,
            etag: format!("etag-{key}"),
            content_type: "text/plain".to_string(),
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn test_builder_totals_match_entries() {
        let mut builder = ManifestBuilder::new("photos");
        builder.record(entry("a.txt", 5));
        builder.record(entry("dir/b.txt", 7));

        let manifest = builder.finish();
        assert_eq!(manifest.version, FORMAT_VERSION);
        assert_eq!(manifest.bucket, "photos");
        assert_eq!(manifest.total_objects, 2);
        assert_eq!(manifest.total_size, 12);
        assert_eq!(manifest.objects.len(), 2);
    }

    #[test]
    fn test_empty_builder() {
        let manifest = ManifestBuilder::new("empty").finish();
        assert_eq!(manifest.total_objects, 0);
        assert_eq!(manifest.total_size, 0);
        assert!(manifest.objects.is_empty());
    }

    #[test]
    fn test_json_schema_field_names() {
        let mut builder = ManifestBuilder::new("photos");
        builder.record(entry("a.txt", 5));
        let manifest = builder.finish();

        let value: serde_json::Value = serde_json::from_slice(&manifest.to_json().unwrap()).unwrap();
        for field in ["version", "created_at", "bucket", "total_objects", "total_size", "objects"] {
            assert!(value.get(field).is_some(), "missing {field}");
        }
        let object = &value["objects"][0];
        for field in ["key", "size", "etag", "content_type", "metadata"] {
            assert!(object.get(field).is_some(), "missing objects[0].{field}");
        }
    }

    #[test]
    fn test_parse_entry_without_optional_fields() {
        let json = br#"{
            "version": "1.0",
            "created_at": "2024-05-01T12:00:00Z",
            "bucket": "photos",
            "total_objects": 1,
            "total_size": 3,
            "objects": [{"key": "x", "size": 3, "etag": "e"}]
        }"#;
        let manifest = TransferManifest::from_json(json).unwrap();
        let lookup = manifest.lookup();
        let entry = lookup["x"];
        assert_eq!(entry.content_type, DEFAULT_CONTENT_TYPE);
        assert!(entry.metadata.is_empty());
    }

    #[test]
    fn test_parse_garbage_fails() {
        assert!(TransferManifest::from_json(b"not json").is_err());
    }
}
