use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use domain::{BlobRef, BlobStore, RepositoryError, RepositoryResult};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// 本地目录中的文件存储，引用即目录下的文件名
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// 创建存储目录（若不存在）
    pub async fn ensure_root(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.root).await
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> RepositoryResult<PathBuf> {
        // 只接受单层文件名，不允许跳出存储目录
        if name.is_empty()
            || name.contains(['/', '\\'])
            || name == "."
            || name == ".."
        {
            return Err(RepositoryError::storage(format!(
                "invalid storage name: {name}"
            )));
        }
        Ok(self.root.join(name))
    }
}

fn map_io_err(err: std::io::Error) -> RepositoryError {
    RepositoryError::storage(err.to_string())
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn store_blob(&self, bytes: Vec<u8>, storage_name: &str) -> RepositoryResult<BlobRef> {
        let path = self.path_for(storage_name)?;
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Err(RepositoryError::Conflict)
            }
            Err(err) => return Err(map_io_err(err)),
        };

        if let Err(err) = write_all(&mut file, &bytes).await {
            // 不留下写了一半的文件
            let _ = fs::remove_file(&path).await;
            return Err(map_io_err(err));
        }

        tracing::debug!(storage_name, size = bytes.len(), "blob stored");
        Ok(BlobRef::new(storage_name))
    }

    async fn delete_blob(&self, reference: &BlobRef) -> RepositoryResult<()> {
        let path = self.path_for(reference.as_str())?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(map_io_err(err)),
        }
    }
}

async fn write_all(file: &mut fs::File, bytes: &[u8]) -> std::io::Result<()> {
    file.write_all(bytes).await?;
    file.sync_all().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_then_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());

        let reference = store
            .store_blob(b"hello".to_vec(), "abc_hello.txt")
            .await
            .unwrap();
        assert_eq!(reference.as_str(), "abc_hello.txt");
        assert_eq!(
            std::fs::read(dir.path().join("abc_hello.txt")).unwrap(),
            b"hello"
        );

        store.delete_blob(&reference).await.unwrap();
        assert!(!dir.path().join("abc_hello.txt").exists());
        // 重复删除不报错
        store.delete_blob(&reference).await.unwrap();
    }

    #[tokio::test]
    async fn existing_names_are_never_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());

        store.store_blob(b"first".to_vec(), "same.bin").await.unwrap();
        let second = store.store_blob(b"second".to_vec(), "same.bin").await;

        assert_eq!(second, Err(RepositoryError::Conflict));
        assert_eq!(std::fs::read(dir.path().join("same.bin")).unwrap(), b"first");
    }

    #[tokio::test]
    async fn path_traversal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path().join("uploads"));
        store.ensure_root().await.unwrap();

        let result = store.store_blob(b"x".to_vec(), "../escape.txt").await;
        assert!(matches!(result, Err(RepositoryError::Storage { .. })));
        assert!(!dir.path().join("escape.txt").exists());
    }
}
