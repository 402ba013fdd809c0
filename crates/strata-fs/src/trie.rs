//! In-memory trie filesystem.
//!
//! `TrieFs` owns a tree of nodes keyed by path segment: directories are
//! ordered maps from child name to child node, files are byte buffers with
//! a modification time and an open-handle count. The whole tree sits behind
//! one `RwLock`: reads run concurrently, mutations are serialized, and
//! multi-step operations (`rename`) commit atomically under the write lock.
//!
//! All data is ephemeral and lost when the store is dropped.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::SystemTime;

use strata_types::{DirEntry, FsError, FsResult, Metadata, WriteMode};

use crate::path::PathKey;
use crate::traits::Filesystem;

#[derive(Debug)]
enum Node {
    Dir(DirNode),
    File(FileNode),
}

#[derive(Debug)]
struct DirNode {
    children: BTreeMap<String, Node>,
    created: SystemTime,
    modified: SystemTime,
}

#[derive(Debug)]
struct FileNode {
    data: Vec<u8>,
    modified: SystemTime,
    /// Outstanding write handles. A node with open handles cannot be
    /// structurally removed (`remove` fails with `ResourceBusy`).
    handles: u32,
}

impl DirNode {
    fn new() -> Self {
        let now = SystemTime::now();
        Self {
            children: BTreeMap::new(),
            created: now,
            modified: now,
        }
    }
}

impl FileNode {
    fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            modified: SystemTime::now(),
            handles: 0,
        }
    }
}

impl Node {
    fn metadata(&self) -> Metadata {
        match self {
            Node::Dir(dir) => Metadata::directory(Some(dir.created), Some(dir.modified)),
            Node::File(file) => Metadata::file(file.data.len() as u64, Some(file.modified)),
        }
    }

    fn entry(&self, name: &str) -> DirEntry {
        match self {
            Node::Dir(_) => DirEntry::directory(name),
            Node::File(file) => DirEntry::file(name, file.data.len() as u64),
        }
    }

    /// True if any file in this subtree has an open write handle.
    fn busy(&self) -> bool {
        match self {
            Node::File(file) => file.handles > 0,
            Node::Dir(dir) => dir.children.values().any(Node::busy),
        }
    }
}

/// Walk `key` down from `root`, read-only.
///
/// A missing segment is `NotFound`; descending through a file node before
/// the segments are exhausted is `NotADirectory`. No partial matching, no
/// symbolic links.
fn find<'a>(root: &'a Node, key: &PathKey) -> FsResult<&'a Node> {
    let mut node = root;
    for segment in key.segments() {
        let dir = match node {
            Node::Dir(dir) => dir,
            Node::File(_) => return Err(FsError::NotADirectory(key.to_string())),
        };
        node = dir
            .children
            .get(segment)
            .ok_or_else(|| FsError::NotFound(key.to_string()))?;
    }
    Ok(node)
}

/// Walk to the directory node at `key`, mutably. With `auto_create`,
/// missing intermediate directories are created along the way.
fn find_dir_mut<'a>(
    root: &'a mut Node,
    key: &PathKey,
    auto_create: bool,
) -> FsResult<&'a mut DirNode> {
    let mut node = root;
    for segment in key.segments() {
        let dir = match node {
            Node::Dir(dir) => dir,
            Node::File(_) => return Err(FsError::NotADirectory(key.to_string())),
        };
        if auto_create && !dir.children.contains_key(segment) {
            dir.children.insert(segment.clone(), Node::Dir(DirNode::new()));
            dir.modified = SystemTime::now();
        }
        node = dir
            .children
            .get_mut(segment)
            .ok_or_else(|| FsError::NotFound(key.to_string()))?;
    }
    match node {
        Node::Dir(dir) => Ok(dir),
        Node::File(_) => Err(FsError::NotADirectory(key.to_string())),
    }
}

/// In-memory trie filesystem.
///
/// Thread-safe via an internal `RwLock` over the whole tree.
#[derive(Debug)]
pub struct TrieFs {
    root: RwLock<Node>,
    auto_mkdir: bool,
    read_only: bool,
}

impl Default for TrieFs {
    fn default() -> Self {
        Self::new()
    }
}

impl TrieFs {
    /// Create a new empty store. Parent directories are not created
    /// implicitly on write.
    pub fn new() -> Self {
        Self {
            root: RwLock::new(Node::Dir(DirNode::new())),
            auto_mkdir: false,
            read_only: false,
        }
    }

    /// Create a store that creates missing parent directories on write,
    /// mirroring a local-filesystem `auto_mkdir` mount option.
    pub fn with_auto_mkdir() -> Self {
        Self {
            auto_mkdir: true,
            ..Self::new()
        }
    }

    /// Set whether this store rejects mutations.
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    fn check_writable(&self) -> FsResult<()> {
        if self.read_only {
            Err(FsError::ReadOnly)
        } else {
            Ok(())
        }
    }

    fn read_tree(&self) -> FsResult<RwLockReadGuard<'_, Node>> {
        self.root
            .read()
            .map_err(|_| FsError::Io("lock poisoned".into()))
    }

    fn write_tree(&self) -> FsResult<RwLockWriteGuard<'_, Node>> {
        self.root
            .write()
            .map_err(|_| FsError::Io("lock poisoned".into()))
    }

    /// Open a buffered write handle on `path`.
    ///
    /// `CreateNew` and `Overwrite` create the file entry immediately (empty
    /// until commit); `Append` requires it to exist. Bytes written to the
    /// handle become visible atomically on `commit`; dropping the handle
    /// without committing discards the buffer. While the handle is open the
    /// node cannot be removed or renamed away.
    pub fn open_write(self: &Arc<Self>, path: &Path, mode: WriteMode) -> FsResult<FileHandle> {
        self.check_writable()?;
        let key = PathKey::parse(path);
        let (parent, name) = match (key.parent(), key.name()) {
            (Some(parent), Some(name)) => (parent, name.to_string()),
            _ => return Err(FsError::NotAFile(key.to_string())),
        };

        let mut root = self.write_tree()?;
        // Same ordering as `write`: a failing Append must not leave behind
        // implicitly created parents.
        if mode == WriteMode::Append {
            match find(&root, &key)? {
                Node::File(_) => {}
                Node::Dir(_) => return Err(FsError::NotAFile(key.to_string())),
            }
        }
        let dir = find_dir_mut(&mut root, &parent, self.auto_mkdir)?;
        match dir.children.get_mut(&name) {
            Some(Node::Dir(_)) => return Err(FsError::NotAFile(key.to_string())),
            Some(Node::File(file)) => {
                if mode == WriteMode::CreateNew {
                    return Err(FsError::AlreadyExists(key.to_string()));
                }
                file.handles += 1;
            }
            None => {
                if mode == WriteMode::Append {
                    return Err(FsError::NotFound(key.to_string()));
                }
                let mut file = FileNode::new(Vec::new());
                file.handles = 1;
                dir.children.insert(name, Node::File(file));
                dir.modified = SystemTime::now();
            }
        }
        drop(root);

        Ok(FileHandle {
            fs: Arc::clone(self),
            key,
            mode,
            buf: Vec::new(),
            open: true,
        })
    }

    fn with_file_mut<R>(
        &self,
        key: &PathKey,
        apply: impl FnOnce(&mut FileNode) -> R,
    ) -> FsResult<R> {
        let mut root = self.write_tree()?;
        let parent = key.parent().ok_or_else(|| FsError::NotAFile(key.to_string()))?;
        let name = key.name().ok_or_else(|| FsError::NotAFile(key.to_string()))?;
        let dir = find_dir_mut(&mut root, &parent, false)?;
        match dir.children.get_mut(name) {
            Some(Node::File(file)) => Ok(apply(file)),
            Some(Node::Dir(_)) => Err(FsError::NotAFile(key.to_string())),
            None => Err(FsError::NotFound(key.to_string())),
        }
    }
}

impl Filesystem for TrieFs {
    fn stat(&self, path: &Path) -> FsResult<Metadata> {
        let key = PathKey::parse(path);
        let root = self.read_tree()?;
        Ok(find(&root, &key)?.metadata())
    }

    fn list(&self, path: &Path) -> FsResult<Vec<DirEntry>> {
        let key = PathKey::parse(path);
        let root = self.read_tree()?;
        match find(&root, &key)? {
            Node::Dir(dir) => Ok(dir
                .children
                .iter()
                .map(|(name, node)| node.entry(name))
                .collect()),
            Node::File(_) => Err(FsError::NotADirectory(key.to_string())),
        }
    }

    fn read(&self, path: &Path) -> FsResult<Vec<u8>> {
        let key = PathKey::parse(path);
        let root = self.read_tree()?;
        match find(&root, &key)? {
            Node::File(file) => Ok(file.data.clone()),
            Node::Dir(_) => Err(FsError::NotAFile(key.to_string())),
        }
    }

    fn write(&self, path: &Path, data: &[u8], mode: WriteMode) -> FsResult<()> {
        self.check_writable()?;
        let key = PathKey::parse(path);
        let (parent, name) = match (key.parent(), key.name()) {
            (Some(parent), Some(name)) => (parent, name.to_string()),
            _ => return Err(FsError::NotAFile(key.to_string())),
        };

        let mut root = self.write_tree()?;
        // Append never creates; reject a missing target before implicit
        // parent creation can leave directories behind on the error path.
        if mode == WriteMode::Append {
            match find(&root, &key)? {
                Node::File(_) => {}
                Node::Dir(_) => return Err(FsError::NotAFile(key.to_string())),
            }
        }
        let dir = find_dir_mut(&mut root, &parent, self.auto_mkdir)?;
        match dir.children.get_mut(&name) {
            Some(Node::Dir(_)) => Err(FsError::NotAFile(key.to_string())),
            Some(Node::File(file)) => match mode {
                WriteMode::CreateNew => Err(FsError::AlreadyExists(key.to_string())),
                WriteMode::Overwrite => {
                    file.data = data.to_vec();
                    file.modified = SystemTime::now();
                    Ok(())
                }
                WriteMode::Append => {
                    file.data.extend_from_slice(data);
                    file.modified = SystemTime::now();
                    Ok(())
                }
            },
            None => match mode {
                WriteMode::Append => Err(FsError::NotFound(key.to_string())),
                WriteMode::CreateNew | WriteMode::Overwrite => {
                    dir.children.insert(name, Node::File(FileNode::new(data.to_vec())));
                    dir.modified = SystemTime::now();
                    Ok(())
                }
            },
        }
    }

    fn mkdir(&self, path: &Path, parents: bool) -> FsResult<()> {
        self.check_writable()?;
        let key = PathKey::parse(path);
        let (parent, name) = match (key.parent(), key.name()) {
            (Some(parent), Some(name)) => (parent, name.to_string()),
            // The root always exists.
            _ => return Err(FsError::AlreadyExists(key.to_string())),
        };

        let mut root = self.write_tree()?;
        let dir = find_dir_mut(&mut root, &parent, parents)?;
        if dir.children.contains_key(&name) {
            return Err(FsError::AlreadyExists(key.to_string()));
        }
        dir.children.insert(name, Node::Dir(DirNode::new()));
        dir.modified = SystemTime::now();
        Ok(())
    }

    fn remove(&self, path: &Path, recursive: bool) -> FsResult<()> {
        self.check_writable()?;
        let key = PathKey::parse(path);
        let mut root = self.write_tree()?;

        let (parent, name) = match (key.parent(), key.name()) {
            (Some(parent), Some(name)) => (parent, name.to_string()),
            _ => {
                // Removing the root clears the store rather than detaching
                // the root node itself.
                let Node::Dir(dir) = &mut *root else {
                    return Err(FsError::Io("root is not a directory".into()));
                };
                if !recursive && !dir.children.is_empty() {
                    return Err(FsError::DirectoryNotEmpty(key.to_string()));
                }
                if dir.children.values().any(Node::busy) {
                    return Err(FsError::ResourceBusy(key.to_string()));
                }
                dir.children.clear();
                dir.modified = SystemTime::now();
                return Ok(());
            }
        };

        let dir = find_dir_mut(&mut root, &parent, false)?;
        match dir.children.get(&name) {
            None => return Err(FsError::NotFound(key.to_string())),
            Some(node @ Node::Dir(subdir)) => {
                if !recursive && !subdir.children.is_empty() {
                    return Err(FsError::DirectoryNotEmpty(key.to_string()));
                }
                if node.busy() {
                    return Err(FsError::ResourceBusy(key.to_string()));
                }
            }
            Some(Node::File(file)) => {
                if file.handles > 0 {
                    return Err(FsError::ResourceBusy(key.to_string()));
                }
            }
        }
        dir.children.remove(&name);
        dir.modified = SystemTime::now();
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> FsResult<()> {
        self.check_writable()?;
        let src = PathKey::parse(from);
        let dst = PathKey::parse(to);
        if src.is_root() || dst.is_root() {
            return Err(FsError::InvalidOperation(
                "cannot rename the root directory".into(),
            ));
        }
        let (src_parent, src_name) = (
            src.parent().unwrap_or_default(),
            src.name().unwrap_or_default().to_string(),
        );
        let (dst_parent, dst_name) = (
            dst.parent().unwrap_or_default(),
            dst.name().unwrap_or_default().to_string(),
        );

        let mut root = self.write_tree()?;

        // Validate everything before detaching so the tree is untouched on
        // any failure path.
        let src_node = find(&root, &src)?;
        // An open handle resolves its file by path, so re-parenting the
        // subtree would strand it.
        if src_node.busy() {
            return Err(FsError::ResourceBusy(src.to_string()));
        }
        {
            let dst_dir = find_dir_mut(&mut root, &dst_parent, false)?;
            if dst_dir.children.contains_key(&dst_name) {
                return Err(FsError::AlreadyExists(dst.to_string()));
            }
        }
        if dst.starts_with(&src) {
            return Err(FsError::InvalidOperation(format!(
                "cannot move {src} into itself"
            )));
        }

        let node = {
            let src_dir = find_dir_mut(&mut root, &src_parent, false)?;
            let node = src_dir
                .children
                .remove(&src_name)
                .ok_or_else(|| FsError::NotFound(src.to_string()))?;
            src_dir.modified = SystemTime::now();
            node
        };
        let dst_dir = find_dir_mut(&mut root, &dst_parent, false)
            .expect("destination parent validated before detach");
        dst_dir.children.insert(dst_name, node);
        dst_dir.modified = SystemTime::now();
        Ok(())
    }

    fn read_only(&self) -> bool {
        self.read_only
    }
}

/// A buffered write handle obtained from [`TrieFs::open_write`].
///
/// Bytes passed to [`write`](FileHandle::write) accumulate in the handle
/// and become visible to readers atomically when [`commit`](FileHandle::commit)
/// is called. Dropping the handle without committing releases the node and
/// discards the buffer.
pub struct FileHandle {
    fs: Arc<TrieFs>,
    key: PathKey,
    mode: WriteMode,
    buf: Vec<u8>,
    open: bool,
}

impl FileHandle {
    /// Append bytes to the handle's buffer.
    pub fn write(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// The path this handle writes to.
    pub fn path(&self) -> String {
        self.key.to_string()
    }

    /// Install the buffered content and release the handle.
    ///
    /// `Append` mode concatenates the buffer onto the existing content;
    /// other modes replace it.
    pub fn commit(mut self) -> FsResult<()> {
        self.open = false;
        let mode = self.mode;
        let buf = std::mem::take(&mut self.buf);
        self.fs.with_file_mut(&self.key, |file| {
            match mode {
                WriteMode::Append => file.data.extend_from_slice(&buf),
                WriteMode::CreateNew | WriteMode::Overwrite => file.data = buf,
            }
            file.modified = SystemTime::now();
            file.handles = file.handles.saturating_sub(1);
        })
    }
}

impl Drop for FileHandle {
    fn drop(&mut self) {
        if !self.open {
            return;
        }
        // Best effort: release the handle count so the node becomes
        // removable again. The buffer is discarded.
        let _ = self.fs.with_file_mut(&self.key, |file| {
            file.handles = file.handles.saturating_sub(1);
        });
    }
}
