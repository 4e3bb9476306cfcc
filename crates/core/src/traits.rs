//! ObjectStore trait definition
//!
//! This trait defines the object-storage primitives the transfer engine is
//! built on. It keeps the engine decoupled from any specific S3 SDK: the
//! `bp-s3` crate implements it over aws-sdk-s3, and [`crate::memory`]
//! implements it in-process.

use std::collections::BTreeMap;

use async_trait::async_trait;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Content type used when nothing better is known
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// One object as reported by a listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectDescriptor {
    /// Object key, unique within one listing
    pub key: String,

    /// Size in bytes
    pub size: u64,

    /// Entity tag with surrounding quotes removed
    pub etag: String,

    /// Last modified timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<Timestamp>,
}

impl ObjectDescriptor {
    /// Create a descriptor without a modification time
    pub fn new(key: impl Into<String>, size: u64, etag: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            size,
            etag: etag.into(),
            last_modified: None,
        }
    }
}

/// Object content plus the metadata that travels with it
#[derive(Debug, Clone, Default)]
pub struct ObjectPayload {
    /// Raw object bytes
    pub data: Vec<u8>,

    /// Content type reported by the store
    pub content_type: String,

    /// User metadata (`x-amz-meta-*` without the prefix)
    pub metadata: BTreeMap<String, String>,

    /// Entity tag of the fetched version
    pub etag: String,
}

/// One page of a listing
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    /// Objects on this page, in key order
    pub objects: Vec<ObjectDescriptor>,

    /// Whether more pages are available
    pub truncated: bool,

    /// Token for fetching the next page
    pub continuation_token: Option<String>,
}

/// Options for a single list request
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Only keys starting with this prefix
    pub prefix: Option<String>,

    /// Upper bound on keys per page
    pub max_keys: Option<i32>,

    /// Continuation token from the previous page
    pub continuation_token: Option<String>,
}

/// Trait for S3-compatible storage operations
///
/// Implemented by the S3 adapter and by the in-memory store, and mocked in
/// unit tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List bucket names
    async fn list_buckets(&self) -> Result<Vec<String>>;

    /// Fetch one page of a recursive listing
    async fn list_objects(&self, bucket: &str, options: ListOptions) -> Result<ListPage>;

    /// Get object content and metadata
    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectPayload>;

    /// Upload an object, returning its new entity tag
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<String>;

    /// Delete an object
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()>;

    /// Check whether an object exists
    async fn head_object(&self, bucket: &str, key: &str) -> Result<bool>;

    /// Check whether a bucket exists
    async fn bucket_exists(&self, bucket: &str) -> Result<bool>;

    /// Create a bucket
    async fn create_bucket(&self, bucket: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_new() {
        let desc = ObjectDescriptor::new("dir/b.txt", 7, "abc");
        assert_eq!(desc.key, "dir/b.txt");
        assert_eq!(desc.size, 7);
        assert_eq!(desc.etag, "abc");
        assert!(desc.last_modified.is_none());
    }

    #[test]
    fn test_descriptor_json_omits_missing_timestamp() {
        let desc = ObjectDescriptor::new("a.txt", 5, "e1");
        let json = serde_json::to_value(&desc).unwrap();
        assert_eq!(json["key"], "a.txt");
        assert!(json.get("last_modified").is_none());
    }
}
