//! Persistent key-value storage for panelkit.
//!
//! Every execution context (popup, side panel, options page, CLI invocation)
//! owns one [`StorageService`]. The service talks to a [`PlatformStore`] when
//! one is configured and falls back to an in-process [`MemoryStore`] when not.
//!
//! Available platform stores:
//! - [`SharedMemoryStore`]: an in-process area shared by several services
//! - [`JsonFileStore`]: a durable JSON file
//!
//! On top of the service sit the typed views: [`TokenStore`] for the session
//! credentials and [`ExtensionSettings`] for user preferences.

mod file;
mod keys;
mod memory;
mod service;
mod settings;
mod shared;
mod tokens;
mod traits;

pub use file::JsonFileStore;
pub use keys::StorageKeys;
pub use memory::MemoryStore;
pub use service::{StorageService, Subscription, WatchKey};
pub use settings::{ExtensionSettings, ThemePreference};
pub use shared::SharedMemoryStore;
pub use tokens::{now_millis, SessionSnapshot, TokenStore, EXPIRY_MARGIN_MS};
pub use traits::{PlatformStore, StorageChange, StorageChanges, StorageMap};

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Platform store rejected or failed the operation
    #[error("Platform storage error: {0}")]
    Platform(String),

    /// A stored value has an unexpected shape
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Create the durable platform store backed by the JSON file at `path`.
pub fn create_storage(path: PathBuf) -> Arc<dyn PlatformStore> {
    Arc::new(JsonFileStore::new(path))
}

/// Create a [`StorageService`] over the durable file store.
///
/// Must be called from within a tokio runtime: the service spawns the task
/// that forwards platform change events to listeners.
pub fn create_storage_service(path: PathBuf) -> Arc<StorageService> {
    Arc::new(StorageService::with_platform(create_storage(path)))
}
