//! Storage trait definitions.

use crate::StorageResult;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::broadcast;

/// Key/value map as read from or written to a store.
pub type StorageMap = serde_json::Map<String, Value>;

/// A single key's change. `None` means the key was absent.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageChange {
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

/// Every key touched by one write, with its change.
pub type StorageChanges = HashMap<String, StorageChange>;

/// A platform key-value area shared by every context that opens it.
///
/// Implementations publish the changes made through them on the stream
/// returned by [`PlatformStore::watch`]. Delivery is asynchronous with respect
/// to the write that caused it.
#[async_trait]
pub trait PlatformStore: Send + Sync {
    /// Read the requested keys. Missing keys are omitted from the result.
    async fn get(&self, keys: &[String]) -> StorageResult<StorageMap>;

    /// Read every entry.
    async fn get_all(&self) -> StorageResult<StorageMap>;

    /// Write every pair. Resolves once the write is durable for this store.
    async fn set(&self, items: StorageMap) -> StorageResult<()>;

    /// Remove the given keys. Removing a missing key is not an error.
    async fn remove(&self, keys: &[String]) -> StorageResult<()>;

    /// Remove every entry.
    async fn clear(&self) -> StorageResult<()>;

    /// Subscribe to the change stream.
    fn watch(&self) -> broadcast::Receiver<StorageChanges>;

    /// Short name for logs.
    fn name(&self) -> &'static str {
        "platform"
    }
}
