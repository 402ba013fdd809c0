//! The capability trait shared by every store.

use std::path::Path;

use strata_types::{DirEntry, FsError, FsResult, Metadata, WriteMode};

/// Abstract filesystem interface.
///
/// Implemented identically by `TrieFs` and (by delegation) `OverlayFs`, so
/// an overlay can itself serve as a backing layer of another overlay.
/// All operations take slash-delimited paths; normalization is each
/// implementation's responsibility (see `PathKey`).
///
/// Implementations must be safe for concurrent use: reads may proceed in
/// parallel, mutations are serialized per store, and no multi-step
/// operation (rename, copy-up) is ever observable half-applied.
pub trait Filesystem: Send + Sync {
    /// Get metadata for a file or directory.
    fn stat(&self, path: &Path) -> FsResult<Metadata>;

    /// List the immediate children of a directory, lexicographically by
    /// name.
    fn list(&self, path: &Path) -> FsResult<Vec<DirEntry>>;

    /// Read the entire contents of a file.
    fn read(&self, path: &Path) -> FsResult<Vec<u8>>;

    /// Write data to a file according to `mode`.
    ///
    /// Parent directories are created implicitly only when the store was
    /// constructed with `auto_mkdir`; otherwise a missing parent is
    /// `NotFound`.
    fn write(&self, path: &Path, data: &[u8], mode: WriteMode) -> FsResult<()>;

    /// Create a directory. With `parents`, missing ancestors are created
    /// silently; the target itself must not exist.
    fn mkdir(&self, path: &Path, parents: bool) -> FsResult<()>;

    /// Remove a file, or a directory (which must be empty unless
    /// `recursive`).
    fn remove(&self, path: &Path, recursive: bool) -> FsResult<()>;

    /// Re-parent the entry at `from` to `to`, atomically. The destination
    /// must not exist; there is no implicit overwrite.
    fn rename(&self, from: &Path, to: &Path) -> FsResult<()>;

    /// Copy a file (or create an empty directory at `to` when `from` is a
    /// directory, mirroring single-entry copy semantics).
    fn copy(&self, from: &Path, to: &Path) -> FsResult<()> {
        match self.read(from) {
            Ok(data) => self.write(to, &data, WriteMode::Overwrite),
            Err(FsError::NotAFile(_)) => self.mkdir(to, false),
            Err(err) => Err(err),
        }
    }

    /// Returns true if this store rejects mutations.
    fn read_only(&self) -> bool {
        false
    }

    /// Check if a path exists.
    fn exists(&self, path: &Path) -> bool {
        self.stat(path).is_ok()
    }
}
