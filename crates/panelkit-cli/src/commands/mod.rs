//! CLI command implementations.

mod auth;
mod catalog;
mod diagnostics;
mod watch;

pub use auth::{login, logout, refresh, request, set_token, set_url, status, HttpMethod};
pub use catalog::{items, options, spin};
pub use diagnostics::{force_expire, test_refresh};
pub use watch::watch;

use anyhow::{Context, Result};
use panelkit_auth::SessionManager;
use panelkit_config::{Config, Paths};
use panelkit_storage::create_storage_service;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Everything a command needs, built once per invocation.
pub struct App {
    pub config: Config,
    pub session: Arc<SessionManager>,
}

impl App {
    /// Load config and open the session store. `storage_file` overrides the
    /// default `~/.panelkit/storage.json`.
    pub fn open(storage_file: Option<PathBuf>) -> Result<Self> {
        let paths = Paths::new()?;
        paths.ensure_dirs()?;
        let config = Config::load(&paths).context("Failed to load configuration")?;

        let storage_file = storage_file.unwrap_or_else(|| paths.storage_file());
        debug!(path = %storage_file.display(), "Opening session store");
        let storage = create_storage_service(storage_file);

        let session = SessionManager::from_config(storage, &config)?;
        Ok(Self {
            config,
            session: Arc::new(session),
        })
    }
}
