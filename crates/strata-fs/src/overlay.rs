//! Overlay composition: stacks stores into one mutable view.
//!
//! An `OverlayFs` holds an ordered list of layers. Layer 0 is the writable
//! layer and receives every mutation; the remaining layers are read-only
//! backing stores, consulted top-down. Three mechanisms combine them:
//!
//! - **Shadowing**: the first layer holding a name wins, regardless of
//!   entry kind. An upper file hides a lower directory entirely.
//! - **Whiteouts**: deletions of lower-layer entries are recorded in a
//!   whiteout set rather than touching the lower store. A whited-out path
//!   resolves against the writable layer only.
//! - **Copy-up**: appending to a file that lives in a lower layer first
//!   copies its content into the writable layer; the lower copy is never
//!   modified.
//!
//! Directory listings merge all layers (minus whiteouts) and dedupe by
//! name. Reads run concurrently; mutations are serialized on an internal
//! mutex, and each multi-step mutation commits while holding the whiteout
//! set's write lock so no reader observes a half-applied state.
//!
//! Layers are `Arc<dyn Filesystem>`, so an overlay can itself serve as a
//! layer of another overlay.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use strata_types::{DirEntry, EntryType, FsError, FsResult, Metadata, WriteMode};
use tracing::debug;

use crate::path::PathKey;
use crate::traits::Filesystem;

/// Tunables for overlay behavior.
#[derive(Debug, Clone, Copy, Default)]
pub struct OverlayOptions {
    /// Create missing parent directories on write instead of failing with
    /// `NotFound`.
    pub auto_mkdir: bool,
}

/// A stack of filesystems merged into one mutable view.
pub struct OverlayFs {
    /// Layer 0 is writable; the rest are never mutated.
    layers: Vec<Arc<dyn Filesystem>>,
    /// Paths deleted from the merged view while still present in a lower
    /// layer. A whited-out path resolves against layer 0 only.
    whiteouts: RwLock<BTreeSet<PathKey>>,
    /// Serializes mutations so multi-step plans cannot interleave.
    mutate: Mutex<()>,
    options: OverlayOptions,
}

fn to_path(key: &PathKey) -> PathBuf {
    PathBuf::from(key.to_string())
}

fn hidden(whiteouts: &BTreeSet<PathKey>, key: &PathKey) -> bool {
    whiteouts.contains(key) || key.ancestors().any(|ancestor| whiteouts.contains(&ancestor))
}

/// Clear the whiteout on `key` and on every ancestor. Recreating an entry
/// (or materializing its parent chain in the writable layer) un-hides
/// exactly those paths; descendants whited out by an earlier recursive
/// removal stay hidden.
fn uncover(whiteouts: &mut BTreeSet<PathKey>, key: &PathKey) {
    whiteouts.remove(key);
    for ancestor in key.ancestors() {
        whiteouts.remove(&ancestor);
    }
}

impl OverlayFs {
    /// Build an overlay from a writable layer and an ordered list of
    /// backing layers (highest precedence first).
    ///
    /// Fails with `ReadOnly` if the writable layer rejects mutations.
    pub fn new(
        writable: Arc<dyn Filesystem>,
        backing: Vec<Arc<dyn Filesystem>>,
    ) -> FsResult<Self> {
        Self::with_options(writable, backing, OverlayOptions::default())
    }

    pub fn with_options(
        writable: Arc<dyn Filesystem>,
        backing: Vec<Arc<dyn Filesystem>>,
        options: OverlayOptions,
    ) -> FsResult<Self> {
        if writable.read_only() {
            return Err(FsError::ReadOnly);
        }
        let mut layers = Vec::with_capacity(backing.len() + 1);
        layers.push(writable);
        layers.extend(backing);
        Ok(Self {
            layers,
            whiteouts: RwLock::new(BTreeSet::new()),
            mutate: Mutex::new(()),
            options,
        })
    }

    /// Number of layers, including the writable one.
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    fn upper(&self) -> &dyn Filesystem {
        self.layers[0].as_ref()
    }

    fn whiteouts_read(&self) -> FsResult<RwLockReadGuard<'_, BTreeSet<PathKey>>> {
        self.whiteouts
            .read()
            .map_err(|_| FsError::Io("lock poisoned".into()))
    }

    fn whiteouts_write(&self) -> FsResult<RwLockWriteGuard<'_, BTreeSet<PathKey>>> {
        self.whiteouts
            .write()
            .map_err(|_| FsError::Io("lock poisoned".into()))
    }

    fn serialize_mutations(&self) -> FsResult<MutexGuard<'_, ()>> {
        self.mutate
            .lock()
            .map_err(|_| FsError::Io("lock poisoned".into()))
    }

    /// Scan layers top-down until one yields a non-`NotFound` answer.
    ///
    /// Only `NotFound` means "keep looking": any other failure (including
    /// `Io`) is authoritative for the name and surfaces immediately.
    fn resolve<T>(
        &self,
        path: &Path,
        op: impl Fn(&dyn Filesystem) -> FsResult<T>,
    ) -> FsResult<T> {
        let key = PathKey::parse(path);
        let whiteouts = self.whiteouts_read()?;
        let limit = if hidden(&whiteouts, &key) {
            1
        } else {
            self.layers.len()
        };
        for layer in &self.layers[..limit] {
            match op(layer.as_ref()) {
                Err(err) if err.is_not_found() => continue,
                other => return other,
            }
        }
        Err(FsError::NotFound(key.to_string()))
    }

    /// Merged metadata for `key`, with `NotFound` folded into `None`.
    fn visible_meta(&self, key: &PathKey) -> FsResult<Option<Metadata>> {
        match self.stat(&to_path(key)) {
            Ok(meta) => Ok(Some(meta)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// True if any backing layer holds (or fails non-absently on) `key`.
    /// Used to decide whether a deletion needs a whiteout.
    fn lower_present(&self, key: &PathKey) -> bool {
        let path = to_path(key);
        self.layers[1..]
            .iter()
            .any(|layer| !matches!(layer.stat(&path), Err(FsError::NotFound(_))))
    }

    /// Every merged-visible descendant of `key`, parents before children.
    fn collect_merged(&self, key: &PathKey, out: &mut Vec<PathKey>) -> FsResult<()> {
        for entry in self.list(&to_path(key))? {
            let child = key.child(&entry.name);
            out.push(child.clone());
            if entry.entry_type == EntryType::Directory {
                self.collect_merged(&child, out)?;
            }
        }
        Ok(())
    }

    /// Snapshot a merged subtree: directories as `None`, files with their
    /// merged content. Parents precede children.
    fn snapshot_subtree(
        &self,
        key: &PathKey,
        is_dir: bool,
        out: &mut Vec<(PathKey, Option<Vec<u8>>)>,
    ) -> FsResult<()> {
        if !is_dir {
            out.push((key.clone(), Some(self.read(&to_path(key))?)));
            return Ok(());
        }
        out.push((key.clone(), None));
        for entry in self.list(&to_path(key))? {
            self.snapshot_subtree(
                &key.child(&entry.name),
                entry.entry_type == EntryType::Directory,
                out,
            )?;
        }
        Ok(())
    }

    /// Materialize `dir` (and missing ancestors) in the writable layer.
    fn materialize_dir(&self, dir: &PathKey) -> FsResult<()> {
        if dir.is_root() {
            return Ok(());
        }
        match self.upper().mkdir(&to_path(dir), true) {
            Ok(()) | Err(FsError::AlreadyExists(_)) => Ok(()),
            Err(err) => Err(err),
        }
    }
}

impl Filesystem for OverlayFs {
    fn stat(&self, path: &Path) -> FsResult<Metadata> {
        self.resolve(path, |layer| layer.stat(path))
    }

    fn read(&self, path: &Path) -> FsResult<Vec<u8>> {
        self.resolve(path, |layer| layer.read(path))
    }

    fn list(&self, path: &Path) -> FsResult<Vec<DirEntry>> {
        let key = PathKey::parse(path);
        let whiteouts = self.whiteouts_read()?;
        let hidden_dir = hidden(&whiteouts, &key);

        let mut merged: BTreeMap<String, DirEntry> = BTreeMap::new();
        let mut found = false;
        for (index, layer) in self.layers.iter().enumerate() {
            if index > 0 && hidden_dir {
                break;
            }
            match layer.list(path) {
                Ok(entries) => {
                    found = true;
                    for entry in entries {
                        if index > 0 && whiteouts.contains(&key.child(&entry.name)) {
                            continue;
                        }
                        merged.entry(entry.name.clone()).or_insert(entry);
                    }
                }
                Err(err) if err.is_not_found() => {}
                // A file at this name shadows every deeper layer; stop
                // merging but keep what higher layers contributed.
                Err(FsError::NotADirectory(_) | FsError::NotAFile(_)) if found => break,
                Err(err) => return Err(err),
            }
        }
        if !found {
            return Err(FsError::NotFound(key.to_string()));
        }
        Ok(merged.into_values().collect())
    }

    #[tracing::instrument(level = "trace", skip(self, data), fields(bytes = data.len()))]
    fn write(&self, path: &Path, data: &[u8], mode: WriteMode) -> FsResult<()> {
        let _serial = self.serialize_mutations()?;
        let key = PathKey::parse(path);
        let Some(parent) = key.parent() else {
            return Err(FsError::NotAFile(key.to_string()));
        };

        // Plan against the merged view before touching anything.
        let visible = self.visible_meta(&key)?;
        match (&visible, mode) {
            (Some(_), WriteMode::CreateNew) => {
                return Err(FsError::AlreadyExists(key.to_string()));
            }
            (Some(meta), _) if meta.is_dir => {
                return Err(FsError::NotAFile(key.to_string()));
            }
            (None, WriteMode::Append) => {
                return Err(FsError::NotFound(key.to_string()));
            }
            _ => {}
        }

        let upper_file = match self.upper().stat(path) {
            Ok(_) => true,
            Err(err) if err.is_not_found() => false,
            Err(err) => return Err(err),
        };

        // Appending to a file that lives only in a backing layer copies its
        // content up; the lower layer is never modified.
        let copied_up = if !upper_file && mode == WriteMode::Append {
            let base = self.read(path)?;
            debug!(path = %key, bytes = base.len(), "copy-up for append");
            Some(base)
        } else {
            None
        };

        if !upper_file && !self.options.auto_mkdir {
            match self.visible_meta(&parent)? {
                Some(meta) if meta.is_dir => {}
                Some(_) => return Err(FsError::NotADirectory(parent.to_string())),
                None => return Err(FsError::NotFound(parent.to_string())),
            }
        }

        // Commit. Holding the whiteout write lock keeps the upper-layer
        // write and the whiteout clear atomic for readers.
        let mut whiteouts = self.whiteouts_write()?;
        if !upper_file {
            self.materialize_dir(&parent)?;
        }
        match copied_up {
            Some(mut content) => {
                content.extend_from_slice(data);
                self.upper().write(path, &content, WriteMode::Overwrite)?;
            }
            // mode == Append here implies the upper layer holds the file.
            None => self.upper().write(path, data, mode)?,
        }
        uncover(&mut whiteouts, &key);
        Ok(())
    }

    fn mkdir(&self, path: &Path, parents: bool) -> FsResult<()> {
        let _serial = self.serialize_mutations()?;
        let key = PathKey::parse(path);

        if self.visible_meta(&key)?.is_some() {
            return Err(FsError::AlreadyExists(key.to_string()));
        }
        if !parents && !self.options.auto_mkdir {
            let parent = key.parent().unwrap_or_default();
            match self.visible_meta(&parent)? {
                Some(meta) if meta.is_dir => {}
                Some(_) => return Err(FsError::NotADirectory(parent.to_string())),
                None => return Err(FsError::NotFound(parent.to_string())),
            }
        }

        let mut whiteouts = self.whiteouts_write()?;
        // Always materialize the chain: a parent that is visible only in a
        // backing layer must gain an upper counterpart to hold the child.
        self.upper().mkdir(path, true)?;
        uncover(&mut whiteouts, &key);
        Ok(())
    }

    #[tracing::instrument(level = "trace", skip(self))]
    fn remove(&self, path: &Path, recursive: bool) -> FsResult<()> {
        let _serial = self.serialize_mutations()?;
        let key = PathKey::parse(path);

        if key.is_root() {
            if !self.list(path)?.is_empty() && !recursive {
                return Err(FsError::DirectoryNotEmpty(key.to_string()));
            }
            if !recursive {
                return Ok(());
            }
            let mut descendants = Vec::new();
            self.collect_merged(&key, &mut descendants)?;
            let victims: Vec<_> = descendants
                .into_iter()
                .filter(|candidate| self.lower_present(candidate))
                .collect();

            let mut whiteouts = self.whiteouts_write()?;
            for victim in &victims {
                whiteouts.insert(victim.clone());
            }
            if let Err(err) = self.upper().remove(path, true) {
                for victim in &victims {
                    whiteouts.remove(victim);
                }
                return Err(err);
            }
            return Ok(());
        }

        let visible = self
            .visible_meta(&key)?
            .ok_or_else(|| FsError::NotFound(key.to_string()))?;

        let mut descendants = Vec::new();
        if visible.is_dir {
            if !recursive {
                if !self.list(path)?.is_empty() {
                    return Err(FsError::DirectoryNotEmpty(key.to_string()));
                }
            } else {
                self.collect_merged(&key, &mut descendants)?;
            }
        }
        descendants.push(key.clone());

        let victims: Vec<_> = descendants
            .into_iter()
            .filter(|candidate| self.lower_present(candidate))
            .collect();
        let upper_has = match self.upper().stat(path) {
            Ok(_) => true,
            Err(err) if err.is_not_found() => false,
            Err(err) => return Err(err),
        };

        let mut whiteouts = self.whiteouts_write()?;
        for victim in &victims {
            whiteouts.insert(victim.clone());
        }
        if !victims.is_empty() {
            debug!(path = %key, whiteouts = victims.len(), "hid backing-layer entries");
        }
        if upper_has {
            if let Err(err) = self.upper().remove(path, recursive) {
                for victim in &victims {
                    whiteouts.remove(victim);
                }
                return Err(err);
            }
        }
        Ok(())
    }

    #[tracing::instrument(level = "trace", skip(self))]
    fn rename(&self, from: &Path, to: &Path) -> FsResult<()> {
        let _serial = self.serialize_mutations()?;
        let src = PathKey::parse(from);
        let dst = PathKey::parse(to);
        let (Some(_), Some(dst_parent)) = (src.parent(), dst.parent()) else {
            return Err(FsError::InvalidOperation(
                "cannot rename the root directory".into(),
            ));
        };

        let src_meta = self
            .visible_meta(&src)?
            .ok_or_else(|| FsError::NotFound(src.to_string()))?;
        if self.visible_meta(&dst)?.is_some() {
            return Err(FsError::AlreadyExists(dst.to_string()));
        }
        if dst.starts_with(&src) {
            return Err(FsError::InvalidOperation(format!(
                "cannot move {src} into itself"
            )));
        }
        if !self.options.auto_mkdir {
            match self.visible_meta(&dst_parent)? {
                Some(meta) if meta.is_dir => {}
                Some(_) => return Err(FsError::NotADirectory(dst_parent.to_string())),
                None => return Err(FsError::NotFound(dst_parent.to_string())),
            }
        }

        let upper_has_src = match self.upper().stat(from) {
            Ok(_) => true,
            Err(err) if err.is_not_found() => false,
            Err(err) => return Err(err),
        };

        // Fast path: the source subtree lives entirely in the writable
        // layer (a backing layer cannot hold a descendant without holding
        // the ancestor), so its own rename is already atomic.
        if upper_has_src && !self.lower_present(&src) {
            let mut whiteouts = self.whiteouts_write()?;
            self.materialize_dir(&dst_parent)?;
            self.upper().rename(from, to)?;
            uncover(&mut whiteouts, &dst);
            return Ok(());
        }

        // Snapshot the merged source subtree, then rebuild it under the
        // destination in the writable layer. Backing-layer sources are
        // handled by whiteouts, not touched.
        let mut snapshot = Vec::new();
        self.snapshot_subtree(&src, src_meta.is_dir, &mut snapshot)?;
        let victims: Vec<_> = snapshot
            .iter()
            .map(|(key, _)| key.clone())
            .filter(|candidate| self.lower_present(candidate))
            .collect();

        let mut whiteouts = self.whiteouts_write()?;
        // Detach first: if the upper removal fails (open handle), nothing
        // has been built yet and the view is unchanged.
        if upper_has_src {
            self.upper().remove(from, true)?;
        }
        for victim in &victims {
            whiteouts.insert(victim.clone());
        }

        self.materialize_dir(&dst_parent)?;
        for (key, content) in &snapshot {
            let target = key.rebase(&src, &dst);
            match content {
                None => self.materialize_dir(&target)?,
                Some(bytes) => {
                    self.upper()
                        .write(&to_path(&target), bytes, WriteMode::Overwrite)?;
                }
            }
            uncover(&mut whiteouts, &target);
        }
        debug!(src = %src, dst = %dst, entries = snapshot.len(), "rename committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trie::TrieFs;

    fn seeded(entries: &[(&str, &[u8])]) -> Arc<TrieFs> {
        let fs = TrieFs::with_auto_mkdir();
        for (path, data) in entries {
            fs.write(Path::new(path), data, WriteMode::Overwrite).unwrap();
        }
        Arc::new(fs)
    }

    fn overlay(upper: Arc<TrieFs>, lowers: Vec<Arc<TrieFs>>) -> OverlayFs {
        OverlayFs::new(
            upper,
            lowers
                .into_iter()
                .map(|fs| fs as Arc<dyn Filesystem>)
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_upper_layer_wins() {
        let upper = seeded(&[("f.txt", b"upper")]);
        let lower = seeded(&[("f.txt", b"lower")]);
        let fs = overlay(upper, vec![lower]);

        assert_eq!(fs.read(Path::new("f.txt")).unwrap(), b"upper");
    }

    #[test]
    fn test_falls_through_to_lower() {
        let upper = Arc::new(TrieFs::with_auto_mkdir());
        let mid = seeded(&[("mid.txt", b"mid")]);
        let bottom = seeded(&[("mid.txt", b"bottom"), ("deep.txt", b"deep")]);
        let fs = overlay(upper, vec![mid, bottom]);

        assert_eq!(fs.read(Path::new("mid.txt")).unwrap(), b"mid");
        assert_eq!(fs.read(Path::new("deep.txt")).unwrap(), b"deep");
        assert!(matches!(
            fs.read(Path::new("nope.txt")),
            Err(FsError::NotFound(_))
        ));
    }

    #[test]
    fn test_shadowing_ignores_entry_kind() {
        // upper file shadows a lower directory of the same name, entirely
        let upper = seeded(&[("node", b"i am a file")]);
        let lower = seeded(&[("node/child.txt", b"hidden")]);
        let fs = overlay(upper, vec![lower]);

        assert!(fs.stat(Path::new("node")).unwrap().is_file);
        assert!(matches!(
            fs.read(Path::new("node/child.txt")),
            Err(FsError::NotADirectory(_))
        ));
        assert!(matches!(
            fs.list(Path::new("node")),
            Err(FsError::NotADirectory(_))
        ));
    }

    #[test]
    fn test_merged_listing_sorted_and_deduped() {
        let upper = seeded(&[("dir/b.txt", b"upper-b")]);
        let lower = seeded(&[("dir/a.txt", b"a"), ("dir/b.txt", b"lower-b"), ("dir/c.txt", b"c")]);
        let fs = overlay(upper, vec![lower]);

        let entries = fs.list(Path::new("dir")).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["a.txt", "b.txt", "c.txt"]);
        // the winning b.txt is the upper one
        assert_eq!(fs.read(Path::new("dir/b.txt")).unwrap(), b"upper-b");
    }

    #[test]
    fn test_writes_go_to_upper_only() {
        let upper = Arc::new(TrieFs::with_auto_mkdir());
        let lower = seeded(&[("f.txt", b"original")]);
        let fs = overlay(Arc::clone(&upper), vec![Arc::clone(&lower)]);

        fs.write(Path::new("f.txt"), b"replaced", WriteMode::Overwrite).unwrap();

        assert_eq!(fs.read(Path::new("f.txt")).unwrap(), b"replaced");
        assert_eq!(upper.read(Path::new("f.txt")).unwrap(), b"replaced");
        assert_eq!(lower.read(Path::new("f.txt")).unwrap(), b"original");
    }

    #[test]
    fn test_append_copies_up_from_lower() {
        let upper = Arc::new(TrieFs::with_auto_mkdir());
        let lower = seeded(&[("log.txt", b"line1\n")]);
        let fs = overlay(Arc::clone(&upper), vec![Arc::clone(&lower)]);

        fs.write(Path::new("log.txt"), b"line2\n", WriteMode::Append).unwrap();

        assert_eq!(fs.read(Path::new("log.txt")).unwrap(), b"line1\nline2\n");
        assert_eq!(upper.read(Path::new("log.txt")).unwrap(), b"line1\nline2\n");
        assert_eq!(lower.read(Path::new("log.txt")).unwrap(), b"line1\n");
    }

    #[test]
    fn test_create_new_sees_lower_layers() {
        let upper = Arc::new(TrieFs::with_auto_mkdir());
        let lower = seeded(&[("f.txt", b"taken")]);
        let fs = overlay(upper, vec![lower]);

        assert!(matches!(
            fs.write(Path::new("f.txt"), b"x", WriteMode::CreateNew),
            Err(FsError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_append_missing_everywhere_fails() {
        let fs = overlay(Arc::new(TrieFs::new()), vec![Arc::new(TrieFs::new())]);
        assert!(matches!(
            fs.write(Path::new("ghost"), b"x", WriteMode::Append),
            Err(FsError::NotFound(_))
        ));
    }

    #[test]
    fn test_write_materializes_lower_parent() {
        // parent dir exists only in the lower layer; writing a child must
        // create the chain in the upper layer, not fail
        let upper = Arc::new(TrieFs::new());
        let lower = seeded(&[("dir/existing.txt", b"x")]);
        let fs = overlay(Arc::clone(&upper), vec![lower]);

        fs.write(Path::new("dir/new.txt"), b"y", WriteMode::CreateNew).unwrap();
        assert_eq!(fs.read(Path::new("dir/new.txt")).unwrap(), b"y");
        assert!(upper.stat(Path::new("dir")).unwrap().is_dir);
        // merged listing shows both
        let names: Vec<_> = fs
            .list(Path::new("dir"))
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, ["existing.txt", "new.txt"]);
    }

    #[test]
    fn test_write_missing_parent_fails_without_auto_mkdir() {
        let fs = overlay(Arc::new(TrieFs::new()), vec![Arc::new(TrieFs::new())]);
        assert!(matches!(
            fs.write(Path::new("no/dir/f"), b"x", WriteMode::Overwrite),
            Err(FsError::NotFound(_))
        ));
    }

    #[test]
    fn test_auto_mkdir_option() {
        let fs = OverlayFs::with_options(
            Arc::new(TrieFs::with_auto_mkdir()),
            vec![Arc::new(TrieFs::new())],
            OverlayOptions { auto_mkdir: true },
        )
        .unwrap();

        fs.write(Path::new("a/b/c.txt"), b"deep", WriteMode::Overwrite).unwrap();
        assert_eq!(fs.read(Path::new("a/b/c.txt")).unwrap(), b"deep");
    }

    #[test]
    fn test_read_only_writable_layer_rejected() {
        let mut writable = TrieFs::new();
        writable.set_read_only(true);
        let result = OverlayFs::new(Arc::new(writable), vec![]);
        assert!(matches!(result, Err(FsError::ReadOnly)));
    }

    #[test]
    fn test_remove_lower_file_whiteouts_it() {
        let upper = Arc::new(TrieFs::with_auto_mkdir());
        let lower = seeded(&[("f.txt", b"data")]);
        let fs = overlay(upper, vec![Arc::clone(&lower)]);

        fs.remove(Path::new("f.txt"), false).unwrap();

        assert!(matches!(
            fs.stat(Path::new("f.txt")),
            Err(FsError::NotFound(_))
        ));
        assert!(fs.list(Path::new("/")).unwrap().is_empty());
        // the lower layer is untouched
        assert_eq!(lower.read(Path::new("f.txt")).unwrap(), b"data");
    }

    #[test]
    fn test_remove_then_recreate_clears_whiteout() {
        let upper = Arc::new(TrieFs::with_auto_mkdir());
        let lower = seeded(&[("f.txt", b"old")]);
        let fs = overlay(upper, vec![lower]);

        fs.remove(Path::new("f.txt"), false).unwrap();
        fs.write(Path::new("f.txt"), b"new", WriteMode::CreateNew).unwrap();
        assert_eq!(fs.read(Path::new("f.txt")).unwrap(), b"new");
    }

    #[test]
    fn test_remove_upper_reveals_nothing_when_lower_also_has_it() {
        // removing a name that exists in both layers hides both copies
        let upper = seeded(&[("f.txt", b"upper")]);
        let lower = seeded(&[("f.txt", b"lower")]);
        let fs = overlay(upper, vec![lower]);

        fs.remove(Path::new("f.txt"), false).unwrap();
        assert!(matches!(
            fs.read(Path::new("f.txt")),
            Err(FsError::NotFound(_))
        ));
    }

    #[test]
    fn test_remove_missing_fails() {
        let fs = overlay(Arc::new(TrieFs::new()), vec![Arc::new(TrieFs::new())]);
        assert!(matches!(
            fs.remove(Path::new("ghost"), false),
            Err(FsError::NotFound(_))
        ));
    }

    #[test]
    fn test_rmdir_checks_merged_emptiness() {
        // the dir is empty in the upper layer but has a lower child
        let upper = seeded(&[("dir/tmp", b"x")]);
        let lower = seeded(&[("dir/keep.txt", b"k")]);
        let fs = overlay(upper, vec![lower]);
        fs.remove(Path::new("dir/tmp"), false).unwrap();

        assert!(matches!(
            fs.remove(Path::new("dir"), false),
            Err(FsError::DirectoryNotEmpty(_))
        ));
        fs.remove(Path::new("dir/keep.txt"), false).unwrap();
        fs.remove(Path::new("dir"), false).unwrap();
        assert!(!fs.exists(Path::new("dir")));
    }

    #[test]
    fn test_recursive_remove_then_recreate_is_empty() {
        let upper = seeded(&[("dir/upper.txt", b"u")]);
        let lower = seeded(&[("dir/lower.txt", b"l"), ("dir/sub/deep.txt", b"d")]);
        let fs = overlay(upper, vec![Arc::clone(&lower)]);

        fs.remove(Path::new("dir"), true).unwrap();
        assert!(!fs.exists(Path::new("dir")));
        assert!(!fs.exists(Path::new("dir/lower.txt")));

        // recreating the dir must not resurrect the old lower children
        fs.mkdir(Path::new("dir"), false).unwrap();
        assert!(fs.list(Path::new("dir")).unwrap().is_empty());
        assert!(!fs.exists(Path::new("dir/sub/deep.txt")));
        // lower layer still intact underneath
        assert_eq!(lower.read(Path::new("dir/lower.txt")).unwrap(), b"l");
    }

    #[test]
    fn test_mkdir_over_lower_entry_fails() {
        let upper = Arc::new(TrieFs::with_auto_mkdir());
        let lower = seeded(&[("taken", b"x")]);
        let fs = overlay(upper, vec![lower]);

        assert!(matches!(
            fs.mkdir(Path::new("taken"), false),
            Err(FsError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_mkdir_under_lower_parent() {
        let upper = Arc::new(TrieFs::new());
        let lower = seeded(&[("base/f", b"x")]);
        let fs = overlay(upper, vec![lower]);

        fs.mkdir(Path::new("base/newdir"), false).unwrap();
        assert!(fs.stat(Path::new("base/newdir")).unwrap().is_dir);
        // lower sibling still visible through the merge
        assert!(fs.exists(Path::new("base/f")));
    }

    #[test]
    fn test_rename_lower_file_moves_view_not_layer() {
        let upper = Arc::new(TrieFs::with_auto_mkdir());
        let lower = seeded(&[("old.txt", b"payload")]);
        let fs = overlay(upper, vec![Arc::clone(&lower)]);

        fs.rename(Path::new("old.txt"), Path::new("new.txt")).unwrap();

        assert_eq!(fs.read(Path::new("new.txt")).unwrap(), b"payload");
        assert!(matches!(
            fs.read(Path::new("old.txt")),
            Err(FsError::NotFound(_))
        ));
        assert_eq!(lower.read(Path::new("old.txt")).unwrap(), b"payload");
    }

    #[test]
    fn test_rename_merged_directory() {
        let upper = seeded(&[("dir/upper.txt", b"u")]);
        let lower = seeded(&[("dir/lower.txt", b"l"), ("other/f", b"x")]);
        let fs = overlay(upper, vec![lower]);

        fs.rename(Path::new("dir"), Path::new("other/moved")).unwrap();

        assert_eq!(fs.read(Path::new("other/moved/upper.txt")).unwrap(), b"u");
        assert_eq!(fs.read(Path::new("other/moved/lower.txt")).unwrap(), b"l");
        assert!(!fs.exists(Path::new("dir")));
        assert!(!fs.exists(Path::new("dir/lower.txt")));
    }

    #[test]
    fn test_rename_occupied_destination_fails() {
        let upper = seeded(&[("a", b"1")]);
        let lower = seeded(&[("b", b"2")]);
        let fs = overlay(upper, vec![lower]);

        // destination visible only via the lower layer still counts
        assert!(matches!(
            fs.rename(Path::new("a"), Path::new("b")),
            Err(FsError::AlreadyExists(_))
        ));
        assert_eq!(fs.read(Path::new("a")).unwrap(), b"1");
    }

    #[test]
    fn test_io_error_is_not_absence() {
        struct FailingFs;
        impl Filesystem for FailingFs {
            fn stat(&self, _: &Path) -> FsResult<Metadata> {
                Err(FsError::Io("backing store offline".into()))
            }
            fn list(&self, _: &Path) -> FsResult<Vec<DirEntry>> {
                Err(FsError::Io("backing store offline".into()))
            }
            fn read(&self, _: &Path) -> FsResult<Vec<u8>> {
                Err(FsError::Io("backing store offline".into()))
            }
            fn write(&self, _: &Path, _: &[u8], _: WriteMode) -> FsResult<()> {
                Err(FsError::Io("backing store offline".into()))
            }
            fn mkdir(&self, _: &Path, _: bool) -> FsResult<()> {
                Err(FsError::Io("backing store offline".into()))
            }
            fn remove(&self, _: &Path, _: bool) -> FsResult<()> {
                Err(FsError::Io("backing store offline".into()))
            }
            fn rename(&self, _: &Path, _: &Path) -> FsResult<()> {
                Err(FsError::Io("backing store offline".into()))
            }
        }

        let fs = OverlayFs::new(
            Arc::new(TrieFs::new()),
            vec![
                Arc::new(FailingFs) as Arc<dyn Filesystem>,
                seeded(&[("f", b"unreachable")]) as Arc<dyn Filesystem>,
            ],
        )
        .unwrap();

        // the failure surfaces instead of falling through to deeper layers
        assert!(matches!(fs.stat(Path::new("f")), Err(FsError::Io(_))));
        assert!(matches!(fs.read(Path::new("f")), Err(FsError::Io(_))));
    }

    #[test]
    fn test_overlay_composes_as_layer() {
        let inner = Arc::new(overlay(
            Arc::new(TrieFs::with_auto_mkdir()),
            vec![seeded(&[("base.txt", b"inner-lower")])],
        ));
        inner
            .write(Path::new("inner.txt"), b"inner-upper", WriteMode::Overwrite)
            .unwrap();

        let outer = OverlayFs::new(
            Arc::new(TrieFs::with_auto_mkdir()),
            vec![Arc::clone(&inner) as Arc<dyn Filesystem>],
        )
        .unwrap();

        assert_eq!(outer.read(Path::new("base.txt")).unwrap(), b"inner-lower");
        assert_eq!(outer.read(Path::new("inner.txt")).unwrap(), b"inner-upper");
        outer
            .write(Path::new("base.txt"), b"outer", WriteMode::Overwrite)
            .unwrap();
        assert_eq!(outer.read(Path::new("base.txt")).unwrap(), b"outer");
        // the inner overlay never saw the outer write
        assert_eq!(inner.read(Path::new("base.txt")).unwrap(), b"inner-lower");
    }

    #[test]
    fn test_copy_from_lower_lands_in_upper() {
        let upper = Arc::new(TrieFs::with_auto_mkdir());
        let lower = seeded(&[("src.txt", b"content")]);
        let fs = overlay(Arc::clone(&upper), vec![Arc::clone(&lower)]);

        fs.copy(Path::new("src.txt"), Path::new("dst.txt")).unwrap();

        assert_eq!(fs.read(Path::new("dst.txt")).unwrap(), b"content");
        assert_eq!(upper.read(Path::new("dst.txt")).unwrap(), b"content");
        assert!(!lower.exists(Path::new("dst.txt")));
    }

    #[test]
    fn test_concurrent_appends_serialize() {
        let upper = Arc::new(TrieFs::with_auto_mkdir());
        let lower = seeded(&[("log", b"seed:")]);
        let fs = Arc::new(overlay(upper, vec![lower]));

        let mut threads = Vec::new();
        for _ in 0..8 {
            let fs = Arc::clone(&fs);
            threads.push(std::thread::spawn(move || {
                fs.write(Path::new("log"), b"x", WriteMode::Append)
            }));
        }
        for t in threads {
            t.join().unwrap().unwrap();
        }

        let data = fs.read(Path::new("log")).unwrap();
        assert_eq!(data.len(), b"seed:".len() + 8);
        assert!(data.starts_with(b"seed:"));
    }
}
