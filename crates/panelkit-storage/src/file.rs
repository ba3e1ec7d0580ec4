//! Durable JSON file store.

use crate::memory::{apply_clear, apply_remove, apply_set};
use crate::{PlatformStore, StorageChanges, StorageError, StorageMap, StorageResult};
use async_trait::async_trait;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::{broadcast, Mutex};
use tracing::debug;

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// A platform store persisted as one JSON object on disk.
///
/// Every operation re-reads the file, so writes made by other processes are
/// visible to the next read. Writes go to a temporary file that is then
/// renamed over the original. Change events are published for writes made
/// through this handle only; other processes observe each other by reading.
pub struct JsonFileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
    changes: broadcast::Sender<StorageChanges>,
}

impl JsonFileStore {
    pub fn new(path: PathBuf) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            path,
            lock: Mutex::new(()),
            changes,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> StorageResult<StorageMap> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(StorageMap::new()),
            Err(e) => return Err(e.into()),
        };

        if content.trim().is_empty() {
            return Ok(StorageMap::new());
        }

        match serde_json::from_str::<Value>(&content)? {
            Value::Object(map) => Ok(map),
            other => Err(StorageError::Encoding(format!(
                "{} does not hold a JSON object (found {})",
                self.path.display(),
                json_kind(&other)
            ))),
        }
    }

    async fn persist(&self, data: &StorageMap) -> StorageResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = self.path.with_extension("json.tmp");
        let content = serde_json::to_vec_pretty(data)?;
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    async fn modify<F>(&self, op: F) -> StorageResult<()>
    where
        F: FnOnce(&mut StorageMap) -> StorageChanges,
    {
        let _guard = self.lock.lock().await;
        let mut data = self.load().await?;
        let changes = op(&mut data);
        if changes.is_empty() {
            return Ok(());
        }

        self.persist(&data).await?;
        debug!(path = %self.path.display(), keys = changes.len(), "storage file updated");
        let _ = self.changes.send(changes);
        Ok(())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[async_trait]
impl PlatformStore for JsonFileStore {
    async fn get(&self, keys: &[String]) -> StorageResult<StorageMap> {
        let data = self.load().await?;
        Ok(keys
            .iter()
            .filter_map(|k| data.get(k).map(|v| (k.clone(), v.clone())))
            .collect())
    }

    async fn get_all(&self) -> StorageResult<StorageMap> {
        self.load().await
    }

    async fn set(&self, items: StorageMap) -> StorageResult<()> {
        self.modify(|data| apply_set(data, items)).await
    }

    async fn remove(&self, keys: &[String]) -> StorageResult<()> {
        self.modify(|data| apply_remove(data, keys)).await
    }

    async fn clear(&self) -> StorageResult<()> {
        self.modify(apply_clear).await
    }

    fn watch(&self) -> broadcast::Receiver<StorageChanges> {
        self.changes.subscribe()
    }

    fn name(&self) -> &'static str {
        "json-file"
    }
}
