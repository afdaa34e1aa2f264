use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{check_key, BlobStore, StoreError};

/// In-memory blob store.
///
/// Used by tests and the offline CLI. Not durable.
pub struct InMemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self {
            blobs: Mutex::new(HashMap::new()),
        }
    }

    /// Sorted list of stored keys (debug hook).
    pub async fn keys(&self) -> Vec<String> {
        let inner = self.blobs.lock().await;
        let mut keys: Vec<String> = inner.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl Default for InMemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        check_key(key)?;
        Ok(self.blobs.lock().await.contains_key(key))
    }

    async fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        check_key(key)?;
        Ok(self.blobs.lock().await.get(key).cloned())
    }

    async fn write_bytes(
        &self,
        key: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), StoreError> {
        check_key(key)?;
        self.blobs.lock().await.insert(key.to_string(), bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn overwrite_keeps_single_key() {
        let store = InMemoryBlobStore::new();
        store.write_bytes("p/a.json", b"1".to_vec(), "application/json").await.unwrap();
        store.write_bytes("p/a.json", b"2".to_vec(), "application/json").await.unwrap();
        assert_eq!(store.keys().await, vec!["p/a.json".to_string()]);
        assert_eq!(store.read_bytes("p/a.json").await.unwrap(), Some(b"2".to_vec()));
    }
}
