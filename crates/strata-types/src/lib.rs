//! Pure data types for stratafs: errors, metadata, directory entries.
//!
//! This crate is a leaf dependency with no async runtime and no I/O. It
//! exists so that consumers can work with stratafs result and entry types
//! without pulling in the filesystem implementations themselves.

pub mod entry;
pub mod error;

// Flat re-exports for convenience
pub use entry::*;
pub use error::*;
