//! Error taxonomy for filesystem operations.
//!
//! Every operation on a store either returns a concrete result or fails
//! with exactly one of these kinds. All failures are logical-state
//! conditions; no variant is transient, and nothing in stratafs retries.

use thiserror::Error;

/// Result type for filesystem operations.
pub type FsResult<T> = Result<T, FsError>;

/// Filesystem operation errors.
#[derive(Debug, Clone, Error)]
pub enum FsError {
    /// No entry exists at the path.
    #[error("not found: {0}")]
    NotFound(String),

    /// An entry already occupies the path.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The path (or one of its ancestors) resolves to a file where a
    /// directory was required.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// The path resolves to a directory where a file was required.
    #[error("not a file: {0}")]
    NotAFile(String),

    /// Non-recursive removal of a directory that still has entries.
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    /// The entry is held open by a write handle.
    #[error("resource busy: {0}")]
    ResourceBusy(String),

    /// Mutation attempted on a read-only store.
    #[error("read-only filesystem")]
    ReadOnly,

    /// Structurally impossible request (e.g. renaming the root).
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Opaque passthrough from a backing store. Never treated as absence:
    /// an overlay surfaces this immediately instead of falling through to
    /// a lower layer.
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for FsError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::NotFound => FsError::NotFound(err.to_string()),
            ErrorKind::AlreadyExists => FsError::AlreadyExists(err.to_string()),
            ErrorKind::NotADirectory => FsError::NotADirectory(err.to_string()),
            ErrorKind::IsADirectory => FsError::NotAFile(err.to_string()),
            ErrorKind::DirectoryNotEmpty => FsError::DirectoryNotEmpty(err.to_string()),
            ErrorKind::ResourceBusy => FsError::ResourceBusy(err.to_string()),
            ErrorKind::ReadOnlyFilesystem => FsError::ReadOnly,
            _ => FsError::Io(err.to_string()),
        }
    }
}

impl FsError {
    /// True if this error means "nothing exists at the path".
    ///
    /// Overlay resolution uses this to distinguish absence (keep scanning
    /// lower layers) from failure (surface immediately).
    pub fn is_not_found(&self) -> bool {
        matches!(self, FsError::NotFound(_))
    }
}
