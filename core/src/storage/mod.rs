pub mod local;
pub mod memory;

use std::{io, path::Path, sync::Arc};

use async_trait::async_trait;

/// A place where chunk files are kept. Chunks are addressed by path, so a
/// backend only needs to be able to write, read and remove whole files.
#[async_trait]
pub trait ChunkStorage: Send + Sync + 'static {
    /// Write `bytes` to the file at `path`, replacing any existing content
    async fn write(&self, path: &Path, bytes: Vec<u8>) -> io::Result<()>;

    /// Read the full content of the file at `path`. Fails with
    /// [`io::ErrorKind::NotFound`] if there is no such file.
    async fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Remove the file at `path`
    async fn remove(&self, path: &Path) -> io::Result<()>;
}

/// Shared storage, so that callers can keep a handle to a backend they have
/// passed to a store
#[async_trait]
impl<S: ChunkStorage + ?Sized> ChunkStorage for Arc<S> {
    async fn write(&self, path: &Path, bytes: Vec<u8>) -> io::Result<()> {
        (**self).write(path, bytes).await
    }

    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        (**self).read(path).await
    }

    async fn remove(&self, path: &Path) -> io::Result<()> {
        (**self).remove(path).await
    }
}
