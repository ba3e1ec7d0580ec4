//! Module catalog for panelkit.
//!
//! Reads module options and their items from the CMS through an
//! authenticated [`panelkit_auth::SessionManager`], falls back to canned demo
//! data when there is no session, and records spin results.

mod catalog;
mod demo;
mod error;
mod models;

pub use catalog::{pick_weighted, Catalog};
pub use demo::{demo_items, demo_options, DEMO_OPTIONS_ID};
pub use error::{CatalogError, CatalogResult};
pub use models::{ModuleItem, ModuleOption, ModuleResult, OptionsQuery};
