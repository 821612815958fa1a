//! In-memory object store with call accounting and failure injection

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

use crate::errors::{Result, StoreError};
use crate::object_store::{validate_key, ObjectStore};

#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
    failing_keys: RwLock<HashSet<String>>,
    offline: AtomicBool,
    uploads: AtomicUsize,
    downloads: AtomicUsize,
    deletes: AtomicUsize,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the store being unreachable
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make every operation on `key` fail
    pub async fn fail_key(&self, key: impl Into<String>) {
        self.failing_keys.write().await.insert(key.into());
    }

    pub async fn clear_failures(&self) {
        self.failing_keys.write().await.clear();
    }

    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.read().await.get(key).cloned()
    }

    pub async fn keys(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn download_count(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    /// Total operations issued against the store
    pub fn call_count(&self) -> usize {
        self.upload_count() + self.download_count() + self.delete_count()
    }

    async fn check(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store offline".to_string()));
        }
        if self.failing_keys.read().await.contains(key) {
            return Err(StoreError::Unavailable(format!("injected failure for {key}")));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn upload(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        self.check(key).await?;
        self.objects
            .write()
            .await
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn download(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        self.check(key).await?;
        Ok(self.objects.read().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.check(key).await?;
        self.objects.write().await.remove(key);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory://".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counts_and_failures() {
        let store = InMemoryObjectStore::new();
        store.upload("settings/a.json", b"1").await.unwrap();
        assert_eq!(store.download("settings/a.json").await.unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.download("settings/b.json").await.unwrap(), None);
        assert_eq!(store.upload_count(), 1);
        assert_eq!(store.download_count(), 2);

        store.fail_key("settings/a.json").await;
        assert!(store.download("settings/a.json").await.is_err());
        store.clear_failures().await;

        store.set_offline(true);
        assert!(matches!(
            store.upload("settings/c.json", b"x").await,
            Err(StoreError::Unavailable(_))
        ));
        store.set_offline(false);

        store.delete("settings/a.json").await.unwrap();
        assert!(store.keys().await.is_empty());
        assert_eq!(store.call_count(), 6);
    }
}
