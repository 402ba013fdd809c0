//! stratafs core: path-addressed in-memory stores and overlay composition.
//!
//! This crate provides:
//!
//! - **PathKey**: Normalizes slash-delimited paths into segment sequences
//! - **Filesystem**: The capability trait shared by every store
//! - **TrieFs**: An in-memory tree of directory and file nodes
//! - **OverlayFs**: Stacks stores into one mutable view with shadowing,
//!   whiteouts, and copy-up
//! - **AsyncFs**: Re-exposes any store as a non-blocking surface on Tokio
//!
//! # Design
//!
//! Stores are composable: `OverlayFs` depends only on the `Filesystem`
//! trait, so an overlay can itself serve as a layer of another overlay.
//!
//! ```text
//! client
//!     ↓
//! OverlayFs            # whiteouts, merged listings, copy-up
//!     ├── TrieFs       # writable layer, receives all mutations
//!     └── TrieFs       # read-only layer(s), never written
//! ```
//!
//! All stores are single-process and ephemeral; nothing here persists to
//! durable media.

pub mod async_fs;
pub mod overlay;
pub mod path;
pub mod traits;
pub mod trie;

pub use async_fs::{AsyncFilesystem, AsyncFs};
pub use overlay::{OverlayFs, OverlayOptions};
pub use path::PathKey;
pub use traits::Filesystem;
pub use trie::{FileHandle, TrieFs};

// Re-export the data types so most users only need one crate.
pub use strata_types::{DirEntry, EntryType, FsError, FsResult, Metadata, WriteMode};
