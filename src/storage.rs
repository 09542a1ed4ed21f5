// Key-value persistence engines backing the session store

use crate::error::StorageError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::Mutex;

#[async_trait]
pub trait KeyValueStorage: Send + Sync + 'static {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn set_item(&self, key: &str, value: String) -> Result<(), StorageError>;

    async fn remove_items(&self, keys: &[&str]) -> Result<(), StorageError>;
}

// Volatile storage, useful for tests and for platforms without a disk
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: DashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[async_trait]
impl KeyValueStorage for MemoryStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.items.get(key).map(|entry| entry.value().clone()))
    }

    async fn set_item(&self, key: &str, value: String) -> Result<(), StorageError> {
        self.items.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove_items(&self, keys: &[&str]) -> Result<(), StorageError> {
        for key in keys {
            self.items.remove(*key);
        }
        Ok(())
    }
}

// Persists every key in a single JSON object on disk.
//
// Writes go to a sibling temp file first and are renamed into place, so a
// crash mid-write leaves the previous contents intact. Operations are
// serialized through an async mutex.
pub struct JsonFileStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<HashMap<String, String>, StorageError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) if contents.trim().is_empty() => Ok(HashMap::new()),
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn persist(&self, items: &HashMap<String, String>) -> Result<(), StorageError> {
        let contents = serde_json::to_string(items)?;
        let tmp_path = self.path.with_extension("tmp");
        tokio::fs::write(&tmp_path, contents).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStorage for JsonFileStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.remove(key))
    }

    async fn set_item(&self, key: &str, value: String) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let mut items = self.load().await?;
        items.insert(key.to_string(), value);
        self.persist(&items).await
    }

    async fn remove_items(&self, keys: &[&str]) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let mut items = self.load().await?;
        let before = items.len();
        for key in keys {
            items.remove(*key);
        }
        if items.len() == before {
            return Ok(());
        }
        self.persist(&items).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_memory_storage_roundtrip() {
        let storage = MemoryStorage::new();
        assert!(storage.get_item("auth_token").await.unwrap().is_none());

        assert_ok!(storage.set_item("auth_token", "abc".to_string()).await);
        assert_ok!(storage.set_item("user_data", "{}".to_string()).await);
        assert_eq!(
            storage.get_item("auth_token").await.unwrap().as_deref(),
            Some("abc")
        );
        assert_eq!(storage.len(), 2);

        assert_ok!(
            storage
                .remove_items(&["auth_token", "user_data", "missing"])
                .await
        );
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_file_storage_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let storage = JsonFileStorage::new(&path);
        storage.set_item("auth_token", "abc".to_string()).await.unwrap();
        storage.set_item("user_data", "{\"id\":1}".to_string()).await.unwrap();
        drop(storage);

        let reopened = JsonFileStorage::new(&path);
        assert_eq!(
            reopened.get_item("auth_token").await.unwrap().as_deref(),
            Some("abc")
        );

        reopened.remove_items(&["auth_token"]).await.unwrap();
        assert!(reopened.get_item("auth_token").await.unwrap().is_none());
        assert!(reopened.get_item("user_data").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_file_storage_reports_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        tokio::fs::write(&path, "not json").await.unwrap();

        let storage = JsonFileStorage::new(&path);
        let error = assert_err!(storage.get_item("auth_token").await);
        assert!(matches!(error, StorageError::Serialization(_)));
    }
}
