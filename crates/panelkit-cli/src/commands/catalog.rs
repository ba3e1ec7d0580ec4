//! Module catalog commands.

use super::App;
use crate::output::{self, OutputFormat};
use anyhow::{Context, Result};
use panelkit_catalog::{Catalog, ModuleItem, OptionsQuery};
use serde_json::Value;
use std::sync::Arc;

fn catalog(app: &App) -> Catalog {
    Catalog::new(Arc::clone(&app.session))
}

fn print_auth_required(format: &OutputFormat) {
    output::print_error("Authentication required. Run 'panelkit login'", format);
}

/// List module options.
pub async fn options(
    app: &App,
    filter: Option<&str>,
    sort: Option<String>,
    limit: Option<u32>,
    format: &OutputFormat,
) -> Result<()> {
    let filter = filter
        .map(serde_json::from_str::<Value>)
        .transpose()
        .context("--filter must be a JSON object")?;
    let query = OptionsQuery {
        filter,
        sort,
        limit,
    };

    let options = catalog(app).module_options(&query).await?;

    match format {
        OutputFormat::Json => output::print_json(&options),
        OutputFormat::Text => {
            output::print_heading("Module options");
            for option in &options {
                println!("  {:>5}  {:<32} {}", option.id, option.name, option.status);
            }
        }
    }
    Ok(())
}

/// List the items of one option.
pub async fn items(app: &App, options_id: i64, format: &OutputFormat) -> Result<()> {
    let items = match catalog(app).module_option_items(options_id).await {
        Ok(items) => items,
        Err(e) if e.is_auth_required() => {
            print_auth_required(format);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    match format {
        OutputFormat::Json => output::print_json(&items),
        OutputFormat::Text => print_items(&items),
    }
    Ok(())
}

fn print_items(items: &[ModuleItem]) {
    output::print_heading("Items");
    for item in items {
        println!(
            "  {:>5}  {:<24} weight {:<3} {}",
            item.id,
            item.label,
            item.effective_weight(),
            item.color.as_deref().unwrap_or("")
        );
    }
}

/// Fetch an option's items and pick one by weight.
pub async fn spin(app: &App, options_id: i64, format: &OutputFormat) -> Result<()> {
    let catalog = catalog(app);

    let items = match catalog.module_option_items(options_id).await {
        Ok(items) => items,
        Err(e) if e.is_auth_required() => {
            print_auth_required(format);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let selected = catalog.spin(&items, options_id).await?;

    match format {
        OutputFormat::Json => output::print_json(&selected),
        OutputFormat::Text => println!("Selected: {} ({})", selected.label, selected.id),
    }
    Ok(())
}
