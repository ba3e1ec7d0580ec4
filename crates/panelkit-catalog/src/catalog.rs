//! Catalog operations over an authenticated session.

use crate::demo::{demo_items, demo_options, DEMO_OPTIONS_ID};
use crate::models::DataEnvelope;
use crate::{CatalogError, CatalogResult, ModuleItem, ModuleOption, ModuleResult, OptionsQuery};
use panelkit_auth::{ApiRequest, AuthError, SessionManager};
use rand::Rng;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

const OPTIONS_ENDPOINT: &str = "/items/module_options";
const ITEMS_ENDPOINT: &str = "/items/module_option_items";
const RESULTS_ENDPOINT: &str = "/items/module_results";

/// Pick one item with probability proportional to its weight.
///
/// Returns `None` only for an empty slice.
pub fn pick_weighted<'a, R: Rng + ?Sized>(items: &'a [ModuleItem], rng: &mut R) -> Option<&'a ModuleItem> {
    let total: u64 = items.iter().map(ModuleItem::effective_weight).sum();
    if total == 0 {
        return None;
    }

    let mut remaining = rng.gen_range(0..total);
    for item in items {
        let weight = item.effective_weight();
        if remaining < weight {
            return Some(item);
        }
        remaining -= weight;
    }

    items.last()
}

/// Module catalog bound to one session.
#[derive(Clone)]
pub struct Catalog {
    session: Arc<SessionManager>,
}

impl Catalog {
    pub fn new(session: Arc<SessionManager>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// List module options. Without a usable session this is the demo option.
    pub async fn module_options(&self, query: &OptionsQuery) -> CatalogResult<Vec<ModuleOption>> {
        if !self.session.validate_token().await? {
            info!("No authentication available, using demo options");
            return Ok(demo_options());
        }

        let mut request = ApiRequest::get();
        request.query = query.to_pairs();

        match self.fetch_list(OPTIONS_ENDPOINT, request).await {
            Ok(options) => Ok(options),
            Err(e) if e.is_auth_required() => {
                self.session.logout().await?;
                info!("Authentication required, using demo options");
                Ok(demo_options())
            }
            Err(e) => {
                warn!(error = %e, "Error getting module options");
                if !self.session.validate_token().await? {
                    return Ok(demo_options());
                }
                Err(e)
            }
        }
    }

    /// List the items of one option. The demo option has canned items when
    /// there is no session; every other option requires one.
    pub async fn module_option_items(&self, options_id: i64) -> CatalogResult<Vec<ModuleItem>> {
        let is_demo = options_id == DEMO_OPTIONS_ID;

        if !self.session.validate_token().await? {
            if is_demo {
                info!("Using demo items for unauthenticated session");
                return Ok(demo_items());
            }
            return Err(AuthError::AuthRequired.into());
        }

        let filter = json!({ "options_id": { "_eq": options_id } });
        let request = ApiRequest::get().with_query("filter", filter.to_string());

        match self.fetch_list(ITEMS_ENDPOINT, request).await {
            Ok(items) => Ok(items),
            Err(e) if e.is_auth_required() => {
                self.session.logout().await?;
                if is_demo {
                    info!("Authentication failed, using demo items");
                    return Ok(demo_items());
                }
                Err(e)
            }
            Err(e) => {
                warn!(options_id, error = %e, "Error getting module option items");
                if is_demo && !self.session.validate_token().await? {
                    return Ok(demo_items());
                }
                Err(e)
            }
        }
    }

    /// Create a `module_results` record. Requires a valid session.
    pub async fn record_result(&self, result: &ModuleResult) -> CatalogResult<Value> {
        if !self.session.validate_token().await? {
            return Err(AuthError::AuthRequired.into());
        }

        let body = serde_json::to_value(result)
            .map_err(|e| CatalogError::InvalidResponse(e.to_string()))?;
        let created: Option<Value> = self
            .fetch(RESULTS_ENDPOINT, ApiRequest::post(body))
            .await
            .inspect_err(|e| warn!(error = %e, "Error recording module result"))?;

        debug!(options_id = result.options_id, "Module result recorded");
        Ok(created.unwrap_or(Value::Null))
    }

    /// Pick an item by weight and record it when a session exists.
    ///
    /// Recording is best effort: an auth failure clears the session, anything
    /// else is logged, and the picked item is returned either way.
    pub async fn spin(&self, items: &[ModuleItem], options_id: i64) -> CatalogResult<ModuleItem> {
        let selected = pick_weighted(items, &mut rand::thread_rng())
            .cloned()
            .ok_or(CatalogError::NoItems)?;
        debug!(item_id = selected.id, options_id, "Spin selected item");

        if !self.session.validate_token().await? {
            info!("Demo mode: result not recorded without authentication");
            return Ok(selected);
        }

        match self
            .record_result(&ModuleResult::new(options_id, selected.id))
            .await
        {
            Ok(_) => {}
            Err(e) if e.is_auth_required() => {
                self.session.logout().await?;
                warn!("Authentication required to record results, session cleared");
            }
            Err(e) => warn!(error = %e, "Failed to record result, but spin succeeded"),
        }

        Ok(selected)
    }

    async fn fetch_list<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        request: ApiRequest,
    ) -> CatalogResult<Vec<T>> {
        Ok(self.fetch(endpoint, request).await?.unwrap_or_default())
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        request: ApiRequest,
    ) -> CatalogResult<Option<T>> {
        let response = self
            .session
            .make_authenticated_request(endpoint, request)
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Http {
                status: status.as_u16(),
            });
        }

        let envelope: DataEnvelope<T> = response
            .json()
            .await
            .map_err(|e| CatalogError::InvalidResponse(e.to_string()))?;
        Ok(envelope.data)
    }
}
