use std::{io, path::Path};

use async_trait::async_trait;

use super::ChunkStorage;

/// An implementation of the [`ChunkStorage`] trait backed by the local file
/// system
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalStorage;

#[async_trait]
impl ChunkStorage for LocalStorage {
    async fn write(&self, path: &Path, bytes: Vec<u8>) -> io::Result<()> {
        tokio::fs::write(path, bytes).await
    }

    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }

    async fn remove(&self, path: &Path) -> io::Result<()> {
        tokio::fs::remove_file(path).await
    }
}

#[cfg(test)]
mod tests {
    use std::io::ErrorKind;

    use assertor::{assert_that, BooleanAssertion, EqualityAssertion};
    use tempdir::TempDir;

    use super::LocalStorage;
    use crate::storage::ChunkStorage;

    #[tokio::test]
    async fn write_and_read() {
        let dir = TempDir::new("chunker_local").unwrap();
        let path = dir.path().join("a-0.chunker");

        LocalStorage
            .write(&path, b"hello world".to_vec())
            .await
            .unwrap();
        let bytes = LocalStorage.read(&path).await.unwrap();
        assert_eq!(bytes, b"hello world".to_vec());
    }

    #[tokio::test]
    async fn remove() {
        let dir = TempDir::new("chunker_local").unwrap();
        let path = dir.path().join("a-0.chunker");

        LocalStorage.write(&path, vec![1, 2, 3]).await.unwrap();
        assert_that!(path.exists()).is_true();

        LocalStorage.remove(&path).await.unwrap();
        assert_that!(path.exists()).is_false();

        let err = LocalStorage.read(&path).await.unwrap_err();
        assert_that!(err.kind()).is_equal_to(ErrorKind::NotFound);

        let err = LocalStorage.remove(&path).await.unwrap_err();
        assert_that!(err.kind()).is_equal_to(ErrorKind::NotFound);
    }
}
