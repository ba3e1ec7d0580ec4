//! Storage adapter with change subscriptions.

use crate::{MemoryStore, PlatformStore, StorageChanges, StorageMap, StorageResult};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Which changes a listener receives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WatchKey {
    /// Every change, delivered as the full change set of the write.
    Any,
    /// Changes to one key, delivered as a single-entry change set.
    Key(String),
}

impl WatchKey {
    pub fn key(key: impl Into<String>) -> Self {
        Self::Key(key.into())
    }
}

type Listener = Arc<dyn Fn(&StorageChanges) + Send + Sync>;

struct ListenerEntry {
    id: u64,
    key: WatchKey,
    listener: Listener,
}

#[derive(Default)]
struct ListenerRegistry {
    next_id: u64,
    entries: Vec<ListenerEntry>,
}

impl ListenerRegistry {
    fn add(&mut self, key: WatchKey, listener: Listener) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        self.entries.push(ListenerEntry { id, key, listener });
        id
    }

    fn remove(&mut self, id: u64) {
        self.entries.retain(|e| e.id != id);
    }
}

/// Deliver one change set. Wildcard listeners run first, then per-key
/// listeners for each changed key. Listeners run outside the registry lock so
/// they may subscribe or unsubscribe.
fn dispatch(registry: &Mutex<ListenerRegistry>, changes: &StorageChanges) {
    if changes.is_empty() {
        return;
    }

    let (wildcard, keyed): (Vec<_>, Vec<_>) = {
        let registry = registry.lock();
        registry
            .entries
            .iter()
            .map(|e| (e.key.clone(), Arc::clone(&e.listener)))
            .partition(|(key, _)| *key == WatchKey::Any)
    };

    for (_, listener) in &wildcard {
        listener(changes);
    }

    for (key, listener) in &keyed {
        if let WatchKey::Key(name) = key {
            if let Some(change) = changes.get(name) {
                let single = StorageChanges::from([(name.clone(), change.clone())]);
                listener(&single);
            }
        }
    }
}

/// Handle for a registered listener. Dropping it unsubscribes.
#[must_use = "dropping a Subscription removes the listener"]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<ListenerRegistry>>,
}

impl Subscription {
    /// Remove the listener now.
    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().remove(self.id);
        }
    }
}

enum Backend {
    Platform(Arc<dyn PlatformStore>),
    Fallback(MemoryStore),
}

/// One execution context's view of the persistent key-value store.
///
/// Backed by a [`PlatformStore`] when one is supplied; otherwise by an
/// in-process [`MemoryStore`] that lives and dies with this service. Listeners
/// of a platform-backed service are notified from a background task as the
/// platform publishes changes. Listeners of the fallback are notified
/// synchronously before the write returns.
pub struct StorageService {
    backend: Backend,
    listeners: Arc<Mutex<ListenerRegistry>>,
    forwarder: Option<JoinHandle<()>>,
}

impl StorageService {
    /// Create a service over the in-process fallback map.
    pub fn in_memory() -> Self {
        Self {
            backend: Backend::Fallback(MemoryStore::new()),
            listeners: Arc::new(Mutex::new(ListenerRegistry::default())),
            forwarder: None,
        }
    }

    /// Create a service over a platform store.
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_platform(store: Arc<dyn PlatformStore>) -> Self {
        let listeners = Arc::new(Mutex::new(ListenerRegistry::default()));
        let mut rx = store.watch();
        let registry = Arc::clone(&listeners);
        let store_name = store.name();

        let forwarder = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(changes) => dispatch(&registry, &changes),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(store = store_name, skipped, "storage change stream lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        debug!(store = store_name, "storage service attached to platform store");

        Self {
            backend: Backend::Platform(store),
            listeners,
            forwarder: Some(forwarder),
        }
    }

    /// Create a service over `store` when present, the fallback otherwise.
    pub fn new(store: Option<Arc<dyn PlatformStore>>) -> Self {
        match store {
            Some(store) => Self::with_platform(store),
            None => Self::in_memory(),
        }
    }

    /// Whether this service runs on the in-process fallback.
    pub fn is_fallback(&self) -> bool {
        matches!(self.backend, Backend::Fallback(_))
    }

    pub fn backend_name(&self) -> &'static str {
        match &self.backend {
            Backend::Platform(store) => store.name(),
            Backend::Fallback(_) => "memory",
        }
    }

    /// Read the requested keys. Missing keys are absent from the result.
    pub async fn get(&self, keys: &[&str]) -> StorageResult<StorageMap> {
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        match &self.backend {
            Backend::Platform(store) => store.get(&keys).await.inspect_err(|e| {
                warn!(error = %e, "storage get failed");
            }),
            Backend::Fallback(map) => Ok(map.get(&keys)),
        }
    }

    /// Read a single key.
    pub async fn get_value(&self, key: &str) -> StorageResult<Option<Value>> {
        Ok(self.get(&[key]).await?.remove(key))
    }

    /// Read every entry.
    pub async fn get_all(&self) -> StorageResult<StorageMap> {
        match &self.backend {
            Backend::Platform(store) => store.get_all().await.inspect_err(|e| {
                warn!(error = %e, "storage get_all failed");
            }),
            Backend::Fallback(map) => Ok(map.get_all()),
        }
    }

    /// Write every pair in one operation.
    pub async fn set(&self, items: StorageMap) -> StorageResult<()> {
        match &self.backend {
            Backend::Platform(store) => {
                let count = items.len();
                store.set(items).await.inspect_err(|e| {
                    warn!(error = %e, keys = count, "storage set failed");
                })
            }
            Backend::Fallback(map) => {
                let changes = map.set(items);
                dispatch(&self.listeners, &changes);
                Ok(())
            }
        }
    }

    /// Write a single pair.
    pub async fn set_value(&self, key: &str, value: Value) -> StorageResult<()> {
        let mut items = StorageMap::new();
        items.insert(key.to_string(), value);
        self.set(items).await
    }

    pub async fn remove(&self, keys: &[&str]) -> StorageResult<()> {
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        match &self.backend {
            Backend::Platform(store) => store.remove(&keys).await.inspect_err(|e| {
                warn!(error = %e, "storage remove failed");
            }),
            Backend::Fallback(map) => {
                let changes = map.remove(&keys);
                dispatch(&self.listeners, &changes);
                Ok(())
            }
        }
    }

    /// Remove every entry.
    pub async fn clear(&self) -> StorageResult<()> {
        match &self.backend {
            Backend::Platform(store) => store.clear().await.inspect_err(|e| {
                warn!(error = %e, "storage clear failed");
            }),
            Backend::Fallback(map) => {
                let changes = map.clear();
                dispatch(&self.listeners, &changes);
                Ok(())
            }
        }
    }

    /// Write the current entries back to the platform store. No-op on the
    /// fallback.
    pub async fn synchronize(&self) -> StorageResult<()> {
        if let Backend::Platform(store) = &self.backend {
            let current = store.get_all().await?;
            debug!(keys = current.len(), "synchronizing storage");
            store.set(current).await?;
        }
        Ok(())
    }

    /// Register `listener` for changes matching `key`.
    pub fn subscribe<F>(&self, key: WatchKey, listener: F) -> Subscription
    where
        F: Fn(&StorageChanges) + Send + Sync + 'static,
    {
        let id = self.listeners.lock().add(key, Arc::new(listener));
        Subscription {
            id,
            registry: Arc::downgrade(&self.listeners),
        }
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().entries.len()
    }
}

impl Default for StorageService {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl Drop for StorageService {
    fn drop(&mut self) {
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
    }
}
