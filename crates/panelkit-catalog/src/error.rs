//! Catalog error types.

use panelkit_auth::AuthError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    /// The session could not authorize the call
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// CMS answered with a non-success status
    #[error("HTTP error {status}")]
    Http { status: u16 },

    #[error("No items available to spin")]
    NoItems,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl CatalogError {
    pub fn is_auth_required(&self) -> bool {
        matches!(self, CatalogError::Auth(e) if e.is_auth_required())
    }
}

pub type CatalogResult<T> = Result<T, CatalogError>;
