//! Object-storage collaborator: a byte buffer in, a stable URL out. The
//! filesystem implementation keeps everything under [`crate::FILES_DIR`] and
//! hands out `/files/{name}` URLs, served with an expiring HMAC key by
//! [`crate::files`].

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::io::AsyncWriteExt;

use crate::error::StorageError;

#[rocket::async_trait]
pub trait ObjectStorage: Send + Sync + 'static {
    async fn store(&self, name: &str, bytes: Vec<u8>) -> Result<String, StorageError>;
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, StorageError>;
}

pub struct FsStorage;

impl FsStorage {
    fn path_for(url_or_name: &str) -> std::path::PathBuf {
        let name = url_or_name.strip_prefix("/files/").unwrap_or(url_or_name);
        std::path::Path::new(crate::FILES_DIR).join(name)
    }
}

#[rocket::async_trait]
impl ObjectStorage for FsStorage {
    async fn store(&self, name: &str, bytes: Vec<u8>) -> Result<String, StorageError> {
        tokio::fs::create_dir_all(crate::FILES_DIR).await?;
        let mut file = tokio::fs::File::create(Self::path_for(name)).await?;
        file.write_all(&bytes).await?;
        Ok(format!("/files/{}", name))
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, StorageError> {
        match tokio::fs::read(Self::path_for(url)).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(url.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// Storage double for tests, keyed by the URL it returned.
#[derive(Default)]
pub struct MemoryStorage {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

#[rocket::async_trait]
impl ObjectStorage for MemoryStorage {
    async fn store(&self, name: &str, bytes: Vec<u8>) -> Result<String, StorageError> {
        let url = format!("/files/{}", name);
        self.objects.lock().unwrap().insert(url.clone(), bytes);
        Ok(url)
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, StorageError> {
        self.objects
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(url.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_storage_round_trips() {
        let storage = MemoryStorage::default();
        let url = storage.store("doc.pdf", b"%PDF-1.5".to_vec()).await.unwrap();
        assert_eq!(url, "/files/doc.pdf");
        assert_eq!(storage.fetch(&url).await.unwrap(), b"%PDF-1.5");
        assert!(matches!(
            storage.fetch("/files/other.pdf").await,
            Err(StorageError::NotFound(_))
        ));
    }
}
