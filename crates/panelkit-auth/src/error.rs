//! Authentication error types.

use thiserror::Error;

/// Authentication error type.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Login rejected by the CMS (4xx)
    #[error("Invalid credentials (HTTP {status}): {body}")]
    InvalidCredentials { status: u16, body: String },

    /// CMS answered with a server error or an unexpected status
    #[error("Server error (HTTP {status}): {body}")]
    Server { status: u16, body: String },

    /// Transport failure: connect, timeout, reset
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// No usable session: the caller must authenticate again
    #[error("Authentication required")]
    AuthRequired,

    /// CMS answered 2xx with a body we cannot use
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] panelkit_storage::StorageError),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Invalid state transition in the auth FSM
    #[error("Invalid auth state transition: {0}")]
    InvalidStateTransition(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuthError {
    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            AuthError::InvalidCredentials { status, .. } | AuthError::Server { status, .. } => {
                Some(*status)
            }
            AuthError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_auth_required(&self) -> bool {
        matches!(self, AuthError::AuthRequired)
    }

    /// Returns true if this error is transient and the operation can be retried.
    ///
    /// Transient errors include:
    /// - Connection failures and timeouts
    /// - 5xx responses
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::Network(e) => {
                if e.is_connect() || e.is_timeout() {
                    return true;
                }
                e.status().is_some_and(|s| s.is_server_error())
            }
            AuthError::Server { status, .. } => (500..600).contains(status),
            _ => false,
        }
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;
