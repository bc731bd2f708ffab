use std::{
    collections::{HashMap, HashSet},
    io,
    path::{Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::ChunkStorage;

/// An in-memory implementation of the [`ChunkStorage`] trait. Writes can be
/// delayed or made to fail per path, which makes it possible to simulate slow
/// or broken disks.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    files: Mutex<HashMap<PathBuf, Vec<u8>>>,
    write_delay: Option<Duration>,
    path_delays: Mutex<HashMap<PathBuf, Duration>>,
    failing: Mutex<HashSet<PathBuf>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every write by the given duration
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    /// Delay writes to `path` by `delay` instead of the global write delay
    pub fn delay_writes_to(&self, path: impl Into<PathBuf>, delay: Duration) {
        self.path_delays.lock().insert(path.into(), delay);
    }

    /// Let every write to `path` fail
    pub fn fail_writes_to(&self, path: impl Into<PathBuf>) {
        self.failing.lock().insert(path.into());
    }

    /// Put a file into the storage without going through [`ChunkStorage::write`]
    pub fn insert(&self, path: impl Into<PathBuf>, bytes: Vec<u8>) {
        self.files.lock().insert(path.into(), bytes);
    }

    pub fn get(&self, path: &Path) -> Option<Vec<u8>> {
        self.files.lock().get(path).cloned()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.files.lock().contains_key(path)
    }

    /// Number of files currently stored
    pub fn len(&self) -> usize {
        self.files.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.lock().is_empty()
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("no such file: {}", path.display()),
    )
}

#[async_trait]
impl ChunkStorage for MemoryStorage {
    async fn write(&self, path: &Path, bytes: Vec<u8>) -> io::Result<()> {
        let delay = self
            .path_delays
            .lock()
            .get(path)
            .copied()
            .or(self.write_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.lock().contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("simulated write failure: {}", path.display()),
            ));
        }

        self.files.lock().insert(path.to_path_buf(), bytes);
        Ok(())
    }

    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.get(path).ok_or_else(|| not_found(path))
    }

    async fn remove(&self, path: &Path) -> io::Result<()> {
        self.files
            .lock()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| not_found(path))
    }
}
