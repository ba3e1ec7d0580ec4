//! Follow the session view until interrupted.

use super::App;
use crate::output::{self, OutputFormat};
use anyhow::Result;
use panelkit_auth::{SessionContext, SessionView};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

fn print_view(view: &SessionView, format: &OutputFormat) {
    match format {
        OutputFormat::Json => println!(
            "{}",
            json!({
                "is_authenticated": view.is_authenticated,
                "is_loading": view.is_loading,
                "error": view.error,
            })
        ),
        OutputFormat::Text => {
            let state = match (view.is_loading, view.is_authenticated) {
                (true, _) => "checking",
                (false, true) => "authenticated",
                (false, false) => "signed out",
            };
            match &view.error {
                Some(error) => println!("session: {} ({})", state, error),
                None => println!("session: {}", state),
            }
        }
    }
}

/// Start a session context and print every view change. Ctrl-C stops it.
pub async fn watch(app: &App, poll_secs: Option<u64>, format: &OutputFormat) -> Result<()> {
    let poll = poll_secs
        .map(std::time::Duration::from_secs)
        .unwrap_or_else(|| app.config.poll_interval());

    let context = SessionContext::start(Arc::clone(&app.session), poll);
    let mut rx = context.subscribe();
    print_view(&rx.borrow_and_update(), format);

    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                print_view(&rx.borrow_and_update(), format);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping session watch");
                break;
            }
        }
    }

    context.dispose();
    if *format == OutputFormat::Text {
        output::print_divider();
    }
    Ok(())
}
