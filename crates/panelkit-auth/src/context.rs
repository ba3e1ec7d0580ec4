//! Observable session state for one execution context.

use crate::SessionManager;
use panelkit_storage::{StorageChanges, StorageKeys, Subscription, WatchKey};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Message recorded when a session check fails.
pub const CHECK_AUTH_FAILED: &str = "Failed to validate authentication status";

/// Message recorded when logout fails.
pub const LOGOUT_FAILED: &str = "Failed to log out";

/// Shortest poll interval a context accepts. Zero is raised to this.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// What a UI needs to render the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionView {
    pub is_authenticated: bool,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl Default for SessionView {
    fn default() -> Self {
        Self {
            is_authenticated: false,
            is_loading: true,
            error: None,
        }
    }
}

/// Session-relevant storage change, as seen by this context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StorageSignal {
    SignedOut,
    TokenAppeared,
}

impl StorageSignal {
    fn from_changes(changes: &StorageChanges) -> Option<Self> {
        if let Some(change) = changes.get(StorageKeys::IS_LOGGED_IN) {
            return match change.new_value {
                Some(Value::Bool(true)) => Some(StorageSignal::TokenAppeared),
                _ => Some(StorageSignal::SignedOut),
            };
        }
        if let Some(change) = changes.get(StorageKeys::ACCESS_TOKEN) {
            return match &change.new_value {
                Some(Value::String(s)) if !s.is_empty() => Some(StorageSignal::TokenAppeared),
                _ => Some(StorageSignal::SignedOut),
            };
        }
        None
    }
}

struct Shared {
    manager: Arc<SessionManager>,
    view: watch::Sender<SessionView>,
}

impl Shared {
    fn update(&self, f: impl FnOnce(&mut SessionView)) {
        self.view.send_if_modified(|view| {
            let before = view.clone();
            f(view);
            *view != before
        });
    }

    async fn check_auth(&self) -> bool {
        self.update(|v| v.is_loading = true);

        let outcome = match self.manager.validate_token().await {
            Ok(true) => Ok(true),
            Ok(false) => self.manager.refresh_token().await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(authenticated) => {
                debug!(authenticated, "Session check finished");
                self.update(|v| {
                    v.is_authenticated = authenticated;
                    v.is_loading = false;
                    v.error = None;
                });
                authenticated
            }
            Err(e) => {
                warn!(error = %e, "Session check failed");
                self.update(|v| {
                    v.is_authenticated = false;
                    v.is_loading = false;
                    v.error = Some(CHECK_AUTH_FAILED.to_string());
                });
                false
            }
        }
    }

    fn signed_out_elsewhere(&self) {
        debug!("Session cleared in storage");
        self.update(|v| {
            v.is_authenticated = false;
            v.is_loading = false;
        });
    }
}

/// Keeps a [`SessionView`] current for one execution context.
///
/// The view is refreshed on start, on every poll tick, and whenever the
/// session keys change in storage (including writes from other contexts
/// sharing the platform store). Dropping the context stops all of it.
pub struct SessionContext {
    shared: Arc<Shared>,
    shutdown: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl SessionContext {
    /// Start observing the session. Must be called inside a tokio runtime.
    pub fn start(manager: Arc<SessionManager>, poll_interval: Duration) -> Self {
        if poll_interval < MIN_POLL_INTERVAL {
            warn!(
                poll_ms = poll_interval.as_millis() as u64,
                "Poll interval too short, using the minimum"
            );
        }
        let poll_interval = poll_interval.max(MIN_POLL_INTERVAL);
        let (view, _) = watch::channel(SessionView::default());
        let shared = Arc::new(Shared { manager, view });
        let shutdown = CancellationToken::new();

        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let storage = shared.manager.tokens().storage();
        let subscriptions = [StorageKeys::IS_LOGGED_IN, StorageKeys::ACCESS_TOKEN]
            .into_iter()
            .map(|key| {
                let tx = signal_tx.clone();
                storage.subscribe(WatchKey::key(key), move |changes| {
                    if let Some(signal) = StorageSignal::from_changes(changes) {
                        let _ = tx.send(signal);
                    }
                })
            })
            .collect();

        let task = tokio::spawn(run(
            Arc::clone(&shared),
            poll_interval,
            signal_rx,
            shutdown.clone(),
        ));

        info!(
            poll_ms = poll_interval.as_millis() as u64,
            "Session context started"
        );
        Self {
            shared,
            shutdown,
            task: Mutex::new(Some(task)),
            subscriptions: Mutex::new(subscriptions),
        }
    }

    /// Current view.
    pub fn view(&self) -> SessionView {
        self.shared.view.borrow().clone()
    }

    /// Receiver that observes every view change.
    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.shared.view.subscribe()
    }

    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.shared.manager
    }

    /// Validate the session, refreshing if needed. Failures land in the view's
    /// `error` and read as unauthenticated.
    pub async fn check_auth(&self) -> bool {
        self.shared.check_auth().await
    }

    /// Log out through the manager and update the view.
    pub async fn logout(&self) {
        match self.shared.manager.logout().await {
            Ok(()) => self.shared.update(|v| {
                v.is_authenticated = false;
                v.error = None;
            }),
            Err(e) => {
                warn!(error = %e, "Logout failed");
                self.shared
                    .update(|v| v.error = Some(LOGOUT_FAILED.to_string()));
            }
        }
    }

    /// Stop polling and drop the storage subscriptions. Idempotent.
    pub fn dispose(&self) {
        self.shutdown.cancel();
        self.subscriptions.lock().clear();
        if let Some(task) = self.task.lock().take() {
            task.abort();
            debug!("Session context disposed");
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl Drop for SessionContext {
    fn drop(&mut self) {
        self.dispose();
    }
}

async fn run(
    shared: Arc<Shared>,
    poll_interval: Duration,
    mut signals: mpsc::UnboundedReceiver<StorageSignal>,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            // The first tick completes immediately and performs the mount check.
            _ = ticker.tick() => {
                shared.check_auth().await;
            }
            Some(mut signal) = signals.recv() => {
                // One write touches several session keys; act on the latest.
                while let Ok(next) = signals.try_recv() {
                    signal = next;
                }
                match signal {
                    StorageSignal::SignedOut => shared.signed_out_elsewhere(),
                    StorageSignal::TokenAppeared => {
                        if !shared.view.borrow().is_authenticated {
                            shared.check_auth().await;
                        }
                    }
                }
            }
        }
    }

    debug!("Session polling stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use panelkit_storage::StorageChange;
    use serde_json::json;

    fn changes(key: &str, new_value: Option<Value>) -> StorageChanges {
        StorageChanges::from([(
            key.to_string(),
            StorageChange {
                old_value: None,
                new_value,
            },
        )])
    }

    #[test]
    fn test_initial_view_is_loading() {
        let view = SessionView::default();
        assert!(view.is_loading);
        assert!(!view.is_authenticated);
        assert!(view.error.is_none());
    }

    #[test]
    fn test_signal_from_logged_in_flag() {
        assert_eq!(
            StorageSignal::from_changes(&changes(StorageKeys::IS_LOGGED_IN, Some(json!(false)))),
            Some(StorageSignal::SignedOut)
        );
        assert_eq!(
            StorageSignal::from_changes(&changes(StorageKeys::IS_LOGGED_IN, Some(json!(true)))),
            Some(StorageSignal::TokenAppeared)
        );
    }

    #[test]
    fn test_signal_from_access_token() {
        assert_eq!(
            StorageSignal::from_changes(&changes(StorageKeys::ACCESS_TOKEN, Some(Value::Null))),
            Some(StorageSignal::SignedOut)
        );
        assert_eq!(
            StorageSignal::from_changes(&changes(StorageKeys::ACCESS_TOKEN, None)),
            Some(StorageSignal::SignedOut)
        );
        assert_eq!(
            StorageSignal::from_changes(&changes(StorageKeys::ACCESS_TOKEN, Some(json!("T1")))),
            Some(StorageSignal::TokenAppeared)
        );
    }

    #[test]
    fn test_unrelated_keys_are_ignored() {
        assert_eq!(
            StorageSignal::from_changes(&changes(StorageKeys::DARK_MODE, Some(json!(true)))),
            None
        );
    }
}
