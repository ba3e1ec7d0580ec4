//! Token diagnostics commands.

use super::App;
use crate::output::{self, OutputFormat};
use anyhow::Result;
use panelkit_auth::TokenTestReport;

fn print_report(report: &TokenTestReport, format: &OutputFormat) {
    match format {
        OutputFormat::Json => output::print_json(report),
        OutputFormat::Text => {
            if report.success {
                println!("{}", report.message);
            } else {
                output::print_error(&report.message, format);
            }
            if let Some(expired_at) = &report.expired_at {
                output::print_row("Expires at", expired_at);
            }
            if let Some(has_refresh) = report.has_refresh_token {
                output::print_row("Refresh token", &has_refresh.to_string());
            }
            if let (Some(before), Some(after)) = (&report.initial_state, &report.current_state) {
                output::print_row("Before", &output::or_dash(before.token_expiration.as_ref()));
                output::print_row("After", &output::or_dash(after.token_expiration.as_ref()));
            }
        }
    }
}

/// Move the stored expiry into the past.
pub async fn force_expire(app: &App, format: &OutputFormat) -> Result<()> {
    let report = app.session.force_token_expiration().await?;
    print_report(&report, format);
    Ok(())
}

/// Validate and refresh if needed, reporting before/after.
pub async fn test_refresh(app: &App, format: &OutputFormat) -> Result<()> {
    let report = app.session.test_token_refresh().await?;
    print_report(&report, format);
    Ok(())
}
