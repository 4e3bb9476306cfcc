//! Error types for bp-core
//!
//! One error type for the whole workspace. Transfer operations only return
//! the whole-operation variants; single-object failures are folded into the
//! returned [`crate::TransferResult`] instead.

use thiserror::Error;

/// Result type alias for bp-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for bp-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid local or remote path
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Object key that cannot be mapped to a container-relative path
    #[error("Invalid object key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    /// Profile not found
    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    /// Profile already exists
    #[error("Profile already exists: {0}")]
    ProfileExists(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Authentication or permission failure
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// The store cannot be reached or refused to list (fatal)
    #[error("Object store unavailable: {0}")]
    StoreUnavailable(String),

    /// A single object could not be fetched, written, uploaded or deleted
    #[error("Transfer of '{key}' failed: {message}")]
    ObjectTransfer { key: String, message: String },

    /// The archive is unreadable or contains an unexpected member
    #[error("Archive format error: {0}")]
    ArchiveFormat(String),

    /// No usable manifest in an archive or directory
    #[error("Manifest missing: {0}")]
    ManifestMissing(String),

    /// Conflict error
    #[error("Conflict: {0}")]
    Conflict(String),

    /// General error
    #[error("{0}")]
    General(String),
}

impl Error {
    /// Build an [`Error::ObjectTransfer`] for `key`
    pub fn transfer(key: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Error::ObjectTransfer {
            key: key.into(),
            message: message.to_string(),
        }
    }

    /// Build an [`Error::InvalidKey`] for `key`
    pub fn invalid_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidKey {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Get the appropriate exit code for this error
    pub const fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidPath(_) | Error::InvalidKey { .. } => 2, // UsageError
            Error::Config(_) | Error::InvalidUrl(_) => 2,          // UsageError
            Error::StoreUnavailable(_) => 3,                       // NetworkError
            Error::Auth(_) => 4,                                   // AuthError
            Error::NotFound(_) | Error::ProfileNotFound(_) => 5,   // NotFound
            Error::Conflict(_) | Error::ProfileExists(_) => 6,     // Conflict
            Error::ArchiveFormat(_) => 8,                          // ArchiveError
            _ => 1,                                                // GeneralError
        }
    }
}
