//! In-process key-value map.

use crate::{StorageChange, StorageChanges, StorageMap};
use parking_lot::Mutex;

/// A plain in-memory map that reports what every write changed.
///
/// Used directly as the fallback area of a [`crate::StorageService`] and as
/// the backing map of [`crate::SharedMemoryStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<StorageMap>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `items`.
    pub fn with_entries(items: StorageMap) -> Self {
        Self {
            data: Mutex::new(items),
        }
    }

    pub fn get(&self, keys: &[String]) -> StorageMap {
        let data = self.data.lock();
        keys.iter()
            .filter_map(|k| data.get(k).map(|v| (k.clone(), v.clone())))
            .collect()
    }

    pub fn get_all(&self) -> StorageMap {
        self.data.lock().clone()
    }

    /// Write every pair and return the keys whose value actually changed.
    pub fn set(&self, items: StorageMap) -> StorageChanges {
        let mut data = self.data.lock();
        apply_set(&mut data, items)
    }

    pub fn remove(&self, keys: &[String]) -> StorageChanges {
        let mut data = self.data.lock();
        apply_remove(&mut data, keys)
    }

    pub fn clear(&self) -> StorageChanges {
        let mut data = self.data.lock();
        apply_clear(&mut data)
    }

    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.lock().is_empty()
    }
}

pub(crate) fn apply_set(data: &mut StorageMap, items: StorageMap) -> StorageChanges {
    let mut changes = StorageChanges::new();
    for (key, new_value) in items {
        let old_value = data.insert(key.clone(), new_value.clone());
        if old_value.as_ref() != Some(&new_value) {
            changes.insert(
                key,
                StorageChange {
                    old_value,
                    new_value: Some(new_value),
                },
            );
        }
    }
    changes
}

pub(crate) fn apply_remove(data: &mut StorageMap, keys: &[String]) -> StorageChanges {
    keys.iter()
        .filter_map(|key| {
            data.remove(key).map(|old| {
                (
                    key.clone(),
                    StorageChange {
                        old_value: Some(old),
                        new_value: None,
                    },
                )
            })
        })
        .collect()
}

pub(crate) fn apply_clear(data: &mut StorageMap) -> StorageChanges {
    std::mem::take(data)
        .into_iter()
        .map(|(key, old)| {
            (
                key,
                StorageChange {
                    old_value: Some(old),
                    new_value: None,
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn items(value: Value) -> StorageMap {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_get_omits_missing_keys() {
        let store = MemoryStore::new();
        store.set(items(json!({"a": 1})));

        let got = store.get(&keys(&["a", "b"]));
        assert_eq!(got.len(), 1);
        assert_eq!(got["a"], json!(1));
    }

    #[test]
    fn test_set_reports_only_changed_keys() {
        let store = MemoryStore::new();
        let first = store.set(items(json!({"a": 1, "b": "x"})));
        assert_eq!(first.len(), 2);
        assert_eq!(first["a"].old_value, None);

        let second = store.set(items(json!({"a": 1, "b": "y"})));
        assert_eq!(second.len(), 1);
        assert_eq!(
            second["b"],
            StorageChange {
                old_value: Some(json!("x")),
                new_value: Some(json!("y")),
            }
        );
    }

    #[test]
    fn test_null_is_stored_as_value() {
        let store = MemoryStore::new();
        store.set(items(json!({"token": "T"})));
        let changes = store.set(items(json!({"token": null})));

        assert_eq!(changes["token"].new_value, Some(Value::Null));
        assert_eq!(store.get(&keys(&["token"]))["token"], Value::Null);
    }

    #[test]
    fn test_remove_and_clear() {
        let store = MemoryStore::with_entries(items(json!({"a": 1, "b": 2, "c": 3})));

        let removed = store.remove(&keys(&["a", "missing"]));
        assert_eq!(removed.len(), 1);
        assert_eq!(removed["a"].new_value, None);

        let cleared = store.clear();
        assert_eq!(cleared.len(), 2);
        assert!(store.is_empty());
    }
}
