//! # Observability
//!
//! Logging setup shared by every panelkit binary.
//!
//! Libraries in the workspace only emit `tracing` events; they never install a
//! subscriber. A binary calls [`init`] or [`init_with_config`] once at startup.
//!
//! ## Dev Mode
//!
//! With the `dev` feature enabled, events are also written as structured JSONL
//! to `~/.panelkit/logs/dev.jsonl`:
//!
//! - `tail -f ~/.panelkit/logs/dev.jsonl | jq` for pretty JSON
//!
//! Fields that carry credentials (`access_token`, `refresh_token`, `password`,
//! `authorization`, ...) are redacted before they reach the file.
//!
//! ## Usage
//!
//! ```rust,ignore
//! fn main() {
//!     observability::init_with_config(observability::LogConfig {
//!         service_name: "panelkit".into(),
//!         default_level: "debug".into(),
//!         also_stderr: true,
//!         ..Default::default()
//!     });
//!     tracing::info!("ready");
//! }
//! ```

#[cfg(feature = "dev")]
mod dev;
#[cfg(feature = "dev")]
mod json_layer;

use std::path::PathBuf;

/// Runtime logging mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObservabilityMode {
    /// Development: verbose stderr output plus the JSONL sink when available.
    #[default]
    DevVerbose,
    /// Production: stderr only, no file sink.
    Production,
}

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service (e.g., "panelkit", "popup", "sidepanel").
    /// Included in every JSONL line for filtering.
    pub service_name: String,

    /// Default log level filter (e.g., "debug", "info", "warn").
    /// Can be overridden by `RUST_LOG` environment variable.
    pub default_level: String,

    /// Optional custom log file path.
    /// Defaults to `~/.panelkit/logs/dev.jsonl` in dev mode.
    pub log_path: Option<PathBuf>,

    /// Also emit logs to stderr when the JSONL sink is active.
    pub also_stderr: bool,

    /// Runtime mode.
    pub mode: ObservabilityMode,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
            mode: ObservabilityMode::DevVerbose,
        }
    }
}

/// Initialize logging with default settings.
pub fn init(service_name: &str) {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    });
}

/// Initialize logging with custom configuration.
///
/// Calling this more than once is harmless: the second subscriber install is
/// rejected and the first one stays active.
pub fn init_with_config(config: LogConfig) {
    #[cfg(feature = "dev")]
    {
        if config.mode == ObservabilityMode::DevVerbose {
            dev::init_dev_subscriber(&config);
            return;
        }
    }

    init_stderr_subscriber(&config);
}

fn init_stderr_subscriber(config: &LogConfig) {
    use tracing_subscriber::util::SubscriberInitExt;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .compact()
        .finish()
        .try_init();
}

/// Re-export tracing macros for convenience.
pub use tracing::{debug, error, info, instrument, trace, warn};

/// Re-export Level for advanced filtering.
pub use tracing::Level;
