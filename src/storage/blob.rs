use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{StoreError, StoreResult};

/// Object storage holding binary attachments such as profile pictures.
#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Stores `data` at `path`, replacing any existing object, and returns
    /// its public URL.
    async fn upload(&self, path: &str, data: Bytes, content_type: &str) -> StoreResult<String>;

    async fn remove(&self, path: &str) -> StoreResult<()>;

    fn public_url(&self, path: &str) -> String;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub data: Bytes,
    pub content_type: String,
}

/// Blob storage kept in process memory.
pub struct MemoryBlobStorage {
    base_url: String,
    objects: Mutex<HashMap<String, StoredBlob>>,
    failure: Mutex<Option<String>>,
}

impl MemoryBlobStorage {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            objects: Mutex::new(HashMap::new()),
            failure: Mutex::new(None),
        }
    }

    fn objects(&self) -> MutexGuard<'_, HashMap<String, StoredBlob>> {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self) -> StoreResult<()> {
        match self.failure.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            Some(message) => Err(StoreError::Storage(message.clone())),
            None => Ok(()),
        }
    }

    /// Makes every later upload/remove fail with `message`, or succeed again
    /// when `None`.
    pub fn set_failure(&self, message: Option<&str>) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) =
            message.map(str::to_string);
    }

    pub fn get(&self, path: &str) -> Option<StoredBlob> {
        self.objects().get(path).cloned()
    }

    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.objects().keys().cloned().collect();
        paths.sort();
        paths
    }
}

#[async_trait]
impl BlobStorage for MemoryBlobStorage {
    async fn upload(&self, path: &str, data: Bytes, content_type: &str) -> StoreResult<String> {
        self.check()?;
        self.objects().insert(
            path.to_string(),
            StoredBlob {
                data,
                content_type: content_type.to_string(),
            },
        );
        Ok(self.public_url(path))
    }

    async fn remove(&self, path: &str) -> StoreResult<()> {
        self.check()?;
        self.objects().remove(path);
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}
