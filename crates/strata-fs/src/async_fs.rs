//! Async adapter over blocking stores.
//!
//! `AsyncFs` re-exposes any [`Filesystem`] as a non-blocking surface by
//! dispatching each call through `tokio::task::spawn_blocking`. The store
//! keeps its own locking; the adapter adds no synchronization of its own,
//! so the blocking semantics (concurrent reads, serialized mutations)
//! carry over unchanged.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use strata_types::{DirEntry, FsError, FsResult, Metadata, WriteMode};

use crate::traits::Filesystem;

/// Non-blocking filesystem interface.
///
/// `write` takes owned bytes so implementations can move them into a
/// worker without copying.
#[async_trait]
pub trait AsyncFilesystem: Send + Sync {
    async fn stat(&self, path: &Path) -> FsResult<Metadata>;

    async fn list(&self, path: &Path) -> FsResult<Vec<DirEntry>>;

    async fn read(&self, path: &Path) -> FsResult<Vec<u8>>;

    async fn write(&self, path: &Path, data: Vec<u8>, mode: WriteMode) -> FsResult<()>;

    async fn mkdir(&self, path: &Path, parents: bool) -> FsResult<()>;

    async fn remove(&self, path: &Path, recursive: bool) -> FsResult<()>;

    async fn rename(&self, from: &Path, to: &Path) -> FsResult<()>;

    async fn exists(&self, path: &Path) -> bool {
        self.stat(path).await.is_ok()
    }
}

/// Runs a blocking store on Tokio's blocking thread pool.
pub struct AsyncFs {
    inner: Arc<dyn Filesystem>,
}

impl AsyncFs {
    pub fn new(inner: Arc<dyn Filesystem>) -> Self {
        Self { inner }
    }

    /// The wrapped blocking store.
    pub fn inner(&self) -> &Arc<dyn Filesystem> {
        &self.inner
    }

    async fn run<T: Send + 'static>(
        &self,
        op: impl FnOnce(&dyn Filesystem) -> FsResult<T> + Send + 'static,
    ) -> FsResult<T> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || op(inner.as_ref()))
            .await
            .map_err(|err| FsError::Io(format!("blocking task failed: {err}")))?
    }
}

#[async_trait]
impl AsyncFilesystem for AsyncFs {
    async fn stat(&self, path: &Path) -> FsResult<Metadata> {
        let path = path.to_path_buf();
        self.run(move |fs| fs.stat(&path)).await
    }

    async fn list(&self, path: &Path) -> FsResult<Vec<DirEntry>> {
        let path = path.to_path_buf();
        self.run(move |fs| fs.list(&path)).await
    }

    async fn read(&self, path: &Path) -> FsResult<Vec<u8>> {
        let path = path.to_path_buf();
        self.run(move |fs| fs.read(&path)).await
    }

    async fn write(&self, path: &Path, data: Vec<u8>, mode: WriteMode) -> FsResult<()> {
        let path = path.to_path_buf();
        self.run(move |fs| fs.write(&path, &data, mode)).await
    }

    async fn mkdir(&self, path: &Path, parents: bool) -> FsResult<()> {
        let path = path.to_path_buf();
        self.run(move |fs| fs.mkdir(&path, parents)).await
    }

    async fn remove(&self, path: &Path, recursive: bool) -> FsResult<()> {
        let path = path.to_path_buf();
        self.run(move |fs| fs.remove(&path, recursive)).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> FsResult<()> {
        let from = from.to_path_buf();
        let to = to.to_path_buf();
        self.run(move |fs| fs.rename(&from, &to)).await
    }
}
