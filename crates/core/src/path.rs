//! Path parsing and key mapping
//!
//! Remote locations are written as `profile/bucket[/prefix]`; anything that
//! does not look like that is a local path. This module also owns the
//! mapping between object keys and container-relative paths, which is where
//! keys that would escape an archive or export directory are rejected.

use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};
use crate::manifest::MANIFEST_NAME;

/// A parsed remote location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePath {
    /// Profile name
    pub profile: String,
    /// Bucket name
    pub bucket: String,
    /// Key prefix (empty for the whole bucket)
    pub prefix: String,
}

impl RemotePath {
    /// Create a new RemotePath
    pub fn new(
        profile: impl Into<String>,
        bucket: impl Into<String>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            profile: profile.into(),
            bucket: bucket.into(),
            prefix: prefix.into(),
        }
    }
}

impl std::fmt::Display for RemotePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.prefix.is_empty() {
            write!(f, "{}/{}", self.profile, self.bucket)
        } else {
            write!(f, "{}/{}/{}", self.profile, self.bucket, self.prefix)
        }
    }
}

/// Parsed path that can be either local or remote
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedPath {
    /// Local filesystem path
    Local(PathBuf),
    /// Remote bucket location
    Remote(RemotePath),
}

impl ParsedPath {
    /// Get the remote path if this is a remote path
    pub fn as_remote(&self) -> Option<&RemotePath> {
        match self {
            ParsedPath::Remote(p) => Some(p),
            ParsedPath::Local(_) => None,
        }
    }

    /// Get the local path if this is a local path
    pub fn as_local(&self) -> Option<&PathBuf> {
        match self {
            ParsedPath::Local(p) => Some(p),
            ParsedPath::Remote(_) => None,
        }
    }
}

/// Parse a path string into a ParsedPath
///
/// Local paths start with `/`, `./` or `../`, or have a first component that
/// is not a valid profile name. Everything else must be
/// `profile/bucket[/prefix]`.
pub fn parse_path(path: &str) -> Result<ParsedPath> {
    if path.is_empty() {
        return Err(Error::InvalidPath("Path cannot be empty".into()));
    }

    if path.starts_with('/') || path.starts_with("./") || path.starts_with("../") {
        return Ok(ParsedPath::Local(PathBuf::from(path)));
    }

    #[cfg(windows)]
    if path.len() >= 2 && path.chars().nth(1) == Some(':') {
        return Ok(ParsedPath::Local(PathBuf::from(path)));
    }

    let mut parts = path.splitn(3, '/');
    let profile = parts.next().unwrap_or_default();
    let bucket = parts.next();
    let prefix = parts.next().unwrap_or_default();

    if !is_valid_profile_name(profile) {
        return Ok(ParsedPath::Local(PathBuf::from(path)));
    }

    match bucket {
        None => Ok(ParsedPath::Local(PathBuf::from(path))),
        Some("") => Err(Error::InvalidPath(format!(
            "Bucket name cannot be empty in '{path}'"
        ))),
        Some(bucket) => Ok(ParsedPath::Remote(RemotePath::new(profile, bucket, prefix))),
    }
}

/// Parse a path that must be remote
pub fn parse_remote(path: &str) -> Result<RemotePath> {
    match parse_path(path)? {
        ParsedPath::Remote(remote) => Ok(remote),
        ParsedPath::Local(_) => Err(Error::InvalidPath(format!(
            "'{path}' is not a remote path. Use format: profile/bucket[/prefix]"
        ))),
    }
}

/// Check if a string is a valid profile name
pub fn is_valid_profile_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Check that an object key maps onto a relative path inside a container
///
/// Rejected: empty keys, absolute keys, keys with empty, `.` or `..`
/// segments (directory markers ending in `/` included), keys containing a
/// NUL or a backslash, and the reserved manifest name.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::invalid_key(key, "key is empty"));
    }
    if key == MANIFEST_NAME {
        return Err(Error::invalid_key(key, "name is reserved for the manifest"));
    }
    if key.starts_with('/') {
        return Err(Error::invalid_key(key, "key is absolute"));
    }
    if key.contains('\0') || key.contains('\\') {
        return Err(Error::invalid_key(key, "key contains a NUL or backslash"));
    }
    for segment in key.split('/') {
        match segment {
            "" => return Err(Error::invalid_key(key, "key contains an empty segment")),
            "." | ".." => {
                return Err(Error::invalid_key(
                    key,
                    format!("key contains a '{segment}' segment"),
                ));
            }
            _ => {}
        }
    }
    Ok(())
}

/// Whether `key` is a folder marker such as `photos/`
///
/// A marker is a valid key followed by exactly one trailing `/`.
pub fn is_folder_marker(key: &str) -> bool {
    key.strip_suffix('/')
        .is_some_and(|stem| validate_key(stem).is_ok())
}

/// Resolve the file path for `key` under `root`
pub fn key_to_path(root: &Path, key: &str) -> Result<PathBuf> {
    validate_key(key)?;
    Ok(key.split('/').fold(root.to_path_buf(), |path, segment| path.join(segment)))
}

/// Build an object key from a path relative to an import root
pub fn relative_path_to_key(relative: &Path) -> Result<String> {
    let mut segments = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                let part = part.to_str().ok_or_else(|| {
                    Error::InvalidPath(format!("{} is not valid UTF-8", relative.display()))
                })?;
                segments.push(part);
            }
            Component::CurDir => {}
            _ => {
                return Err(Error::InvalidPath(format!(
                    "{} is not a relative path",
                    relative.display()
                )));
            }
        }
    }
    if segments.is_empty() {
        return Err(Error::InvalidPath("empty relative path".into()));
    }
    Ok(segments.join("/"))
}
