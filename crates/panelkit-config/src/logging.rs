//! Logging initialization.
//!
//! Thin wrapper over the observability package. In dev mode (the default)
//! every process appends structured JSONL to `~/.panelkit/logs/dev.jsonl`
//! when the binary enables the `dev` feature of observability.

use observability::{LogConfig, ObservabilityMode};

fn mode_from_env() -> ObservabilityMode {
    parse_mode(std::env::var("PANELKIT_OBS_MODE").ok().as_deref())
}

fn parse_mode(raw: Option<&str>) -> ObservabilityMode {
    match raw.unwrap_or("dev").to_ascii_lowercase().as_str() {
        "prod" | "production" => ObservabilityMode::Production,
        _ => ObservabilityMode::DevVerbose,
    }
}

/// Initialize logging for the `panelkit` service.
///
/// `level` is the default filter; `RUST_LOG` takes precedence when set.
pub fn init_logging(level: &str) {
    init_logging_for_service("panelkit", level);
}

/// Initialize logging with a custom service name, so several contexts can be
/// told apart in the central log stream.
pub fn init_logging_for_service(service_name: &str, level: &str) {
    observability::init_with_config(LogConfig {
        service_name: service_name.into(),
        default_level: level.into(),
        also_stderr: true,
        mode: mode_from_env(),
        ..Default::default()
    });
}
