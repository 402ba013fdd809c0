//! Path normalization and decomposition.
//!
//! Every store addresses entries by `PathKey`: an ordered sequence of
//! non-empty segment names. Parsing strips redundant separators, `.`
//! segments, and trailing slashes; `..` pops the previous segment (a no-op
//! at the root). The empty sequence is the unique root.

use std::fmt;
use std::path::{Component, Path};

/// A normalized, decomposed path.
///
/// Two keys are equal iff their segment sequences are equal
/// (case-sensitive). Ordering is lexicographic over segments, which makes
/// a `BTreeSet<PathKey>` iterate parents before children.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PathKey {
    segments: Vec<String>,
}

impl PathKey {
    /// The root key (empty segment sequence).
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse and normalize a path.
    pub fn parse(path: &Path) -> Self {
        let mut segments = Vec::new();
        for component in path.components() {
            match component {
                Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
                Component::ParentDir => {
                    segments.pop();
                }
                Component::Normal(s) => segments.push(s.to_string_lossy().into_owned()),
            }
        }
        Self { segments }
    }

    /// True for the empty (root) key.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// The segment names, in order from the root.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of segments.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// The final segment name, or `None` for the root.
    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// The key of the containing directory, or `None` for the root.
    pub fn parent(&self) -> Option<PathKey> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// The key of a direct child.
    pub fn child(&self, name: &str) -> PathKey {
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Self { segments }
    }

    /// True if `self` equals `other` or lies under it.
    pub fn starts_with(&self, other: &PathKey) -> bool {
        self.segments.len() >= other.segments.len()
            && self.segments[..other.segments.len()] == other.segments[..]
    }

    /// Replace the `from` prefix of this key with `to`. The caller
    /// guarantees `self.starts_with(from)`.
    pub fn rebase(&self, from: &PathKey, to: &PathKey) -> PathKey {
        let mut segments = to.segments.clone();
        segments.extend_from_slice(&self.segments[from.segments.len().min(self.segments.len())..]);
        Self { segments }
    }

    /// Every proper ancestor of this key, nearest first, excluding the root.
    pub fn ancestors(&self) -> impl Iterator<Item = PathKey> + '_ {
        (1..self.segments.len()).rev().map(|len| PathKey {
            segments: self.segments[..len].to_vec(),
        })
    }
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "/");
        }
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

impl From<&Path> for PathKey {
    fn from(path: &Path) -> Self {
        Self::parse(path)
    }
}

impl From<&str> for PathKey {
    fn from(path: &str) -> Self {
        Self::parse(Path::new(path))
    }
}
