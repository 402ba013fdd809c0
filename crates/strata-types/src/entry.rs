//! Metadata and directory entry types shared by every store implementation.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// Kind of filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    File,
    Directory,
}

/// Metadata about a file or directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    /// True if this is a directory.
    pub is_dir: bool,
    /// True if this is a file.
    pub is_file: bool,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Last modification time, if available.
    pub modified: Option<SystemTime>,
    /// Creation time, if available.
    pub created: Option<SystemTime>,
}

impl Metadata {
    /// Metadata for a directory.
    pub fn directory(created: Option<SystemTime>, modified: Option<SystemTime>) -> Self {
        Self {
            is_dir: true,
            is_file: false,
            size: 0,
            modified,
            created,
        }
    }

    /// Metadata for a file of the given size.
    pub fn file(size: u64, modified: Option<SystemTime>) -> Self {
        Self {
            is_dir: false,
            is_file: true,
            size,
            modified,
            created: None,
        }
    }

    /// Kind of the entry described by this metadata.
    pub fn entry_type(&self) -> EntryType {
        if self.is_dir {
            EntryType::Directory
        } else {
            EntryType::File
        }
    }
}

/// A directory entry returned by `list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirEntry {
    /// Name of the entry (not full path).
    pub name: String,
    /// Kind of entry.
    pub entry_type: EntryType,
    /// Size in bytes (0 for directories).
    pub size: u64,
}

impl DirEntry {
    /// Create a new directory entry.
    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entry_type: EntryType::Directory,
            size: 0,
        }
    }

    /// Create a new file entry.
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            entry_type: EntryType::File,
            size,
        }
    }
}

/// Write mode for file operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Fail with `AlreadyExists` if the target exists.
    CreateNew,
    /// Replace existing content, creating the file if needed (default).
    #[default]
    Overwrite,
    /// Concatenate onto existing content; fail with `NotFound` if the
    /// file does not exist.
    Append,
}
