//! Shared in-process platform store.

use crate::{MemoryStore, PlatformStore, StorageChanges, StorageMap, StorageResult};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// A platform area living in this process.
///
/// Cloning yields another handle to the same area, so several
/// [`crate::StorageService`] instances (one per context) see each other's
/// writes on the change stream.
#[derive(Clone)]
pub struct SharedMemoryStore {
    inner: Arc<MemoryStore>,
    changes: broadcast::Sender<StorageChanges>,
}

impl SharedMemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(MemoryStore::new()),
            changes,
        }
    }

    fn publish(&self, changes: StorageChanges) {
        if !changes.is_empty() {
            // No receivers is fine: nobody is watching yet.
            let _ = self.changes.send(changes);
        }
    }
}

impl Default for SharedMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlatformStore for SharedMemoryStore {
    async fn get(&self, keys: &[String]) -> StorageResult<StorageMap> {
        Ok(self.inner.get(keys))
    }

    async fn get_all(&self) -> StorageResult<StorageMap> {
        Ok(self.inner.get_all())
    }

    async fn set(&self, items: StorageMap) -> StorageResult<()> {
        let changes = self.inner.set(items);
        self.publish(changes);
        Ok(())
    }

    async fn remove(&self, keys: &[String]) -> StorageResult<()> {
        let changes = self.inner.remove(keys);
        self.publish(changes);
        Ok(())
    }

    async fn clear(&self) -> StorageResult<()> {
        let changes = self.inner.clear();
        self.publish(changes);
        Ok(())
    }

    fn watch(&self) -> broadcast::Receiver<StorageChanges> {
        self.changes.subscribe()
    }

    fn name(&self) -> &'static str {
        "shared-memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_clones_share_data_and_changes() {
        let a = SharedMemoryStore::new();
        let b = a.clone();
        let mut rx = b.watch();

        let mut items = StorageMap::new();
        items.insert("isLoggedIn".to_string(), json!(true));
        a.set(items).await.unwrap();

        let got = b.get(&["isLoggedIn".to_string()]).await.unwrap();
        assert_eq!(got["isLoggedIn"], json!(true));

        let changes = rx.recv().await.unwrap();
        assert_eq!(changes["isLoggedIn"].new_value, Some(json!(true)));
    }

    #[tokio::test]
    async fn test_unchanged_write_publishes_nothing() {
        let store = SharedMemoryStore::new();
        let mut items = StorageMap::new();
        items.insert("k".to_string(), json!(1));
        store.set(items.clone()).await.unwrap();

        let mut rx = store.watch();
        store.set(items).await.unwrap();
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }
}
