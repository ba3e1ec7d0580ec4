//! Hooks for exercising expiry and refresh by hand.

use crate::{AuthResult, SessionManager};
use chrono::{DateTime, SecondsFormat, Utc};
use panelkit_storage::{now_millis, SessionSnapshot};
use serde::Serialize;
use tracing::info;

/// How far in the past a forced expiry is placed.
const FORCED_EXPIRY_AGE_MS: i64 = 60_000;

/// Token presence and expiry at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenState {
    pub has_token: bool,
    pub token_expiration: Option<String>,
}

impl From<&SessionSnapshot> for TokenState {
    fn from(snapshot: &SessionSnapshot) -> Self {
        Self {
            has_token: snapshot.has_access_token(),
            token_expiration: snapshot.expires_at.and_then(iso_millis),
        }
    }
}

/// Outcome of a diagnostic operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTestReport {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expired_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_token: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_refresh_token: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_state: Option<TokenState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_state: Option<TokenState>,
}

impl TokenTestReport {
    fn new(success: bool, message: &str) -> Self {
        Self {
            success,
            message: message.to_string(),
            expired_at: None,
            has_token: None,
            has_refresh_token: None,
            initial_state: None,
            current_state: None,
        }
    }
}

fn iso_millis(ms: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp_millis(ms).map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
}

impl SessionManager {
    /// Move the stored expiry one minute into the past so the next request
    /// takes the refresh path.
    pub async fn force_token_expiration(&self) -> AuthResult<TokenTestReport> {
        let snapshot = self.tokens().snapshot().await?;
        if !snapshot.has_access_token() {
            return Ok(TokenTestReport::new(false, "No token to expire"));
        }

        let expired_at = now_millis() - FORCED_EXPIRY_AGE_MS;
        self.tokens().set_token_expiration(expired_at).await?;
        info!(expired_at, "Token expiration forced");

        Ok(TokenTestReport {
            expired_at: iso_millis(expired_at),
            has_token: Some(true),
            has_refresh_token: Some(snapshot.has_refresh_token()),
            ..TokenTestReport::new(true, "Token expiration forced")
        })
    }

    /// Validate, refresh if needed, and report the state before and after.
    pub async fn test_token_refresh(&self) -> AuthResult<TokenTestReport> {
        let initial = self.tokens().snapshot().await?;

        if self.validate_token().await? {
            return Ok(TokenTestReport {
                expired_at: initial.expires_at.and_then(iso_millis),
                ..TokenTestReport::new(true, "Token is still valid, no refresh needed")
            });
        }

        info!("Token needs refresh, attempting refresh");
        if !self.refresh_token().await? {
            return Ok(TokenTestReport::new(
                false,
                "Token refresh failed - you need to re-authenticate",
            ));
        }

        let current = self.tokens().snapshot().await?;
        Ok(TokenTestReport {
            initial_state: Some(TokenState::from(&initial)),
            current_state: Some(TokenState::from(&current)),
            ..TokenTestReport::new(true, "Token refresh successful")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use panelkit_storage::{StorageService, TokenStore};
    use std::sync::Arc;
    use std::time::Duration;

    fn create_test_manager() -> SessionManager {
        let storage = Arc::new(StorageService::in_memory());
        let tokens = TokenStore::new(storage, "http://127.0.0.1:9");
        SessionManager::new(tokens, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_iso_millis_format() {
        assert_eq!(
            iso_millis(0).as_deref(),
            Some("1970-01-01T00:00:00.000Z")
        );
    }

    #[tokio::test]
    async fn test_force_expiration_without_token() {
        let manager = create_test_manager();
        let report = manager.force_token_expiration().await.unwrap();
        assert!(!report.success);
        assert_eq!(report.message, "No token to expire");
    }

    #[tokio::test]
    async fn test_force_expiration_invalidates_token() {
        let manager = create_test_manager();
        manager
            .tokens()
            .set_tokens("T1", Some("R1"), 3600)
            .await
            .unwrap();
        assert!(manager.validate_token().await.unwrap());

        let report = manager.force_token_expiration().await.unwrap();
        assert!(report.success);
        assert_eq!(report.has_token, Some(true));
        assert_eq!(report.has_refresh_token, Some(true));
        assert!(report.expired_at.is_some());

        assert!(!manager.validate_token().await.unwrap());
    }

    #[tokio::test]
    async fn test_refresh_report_for_valid_token() {
        let manager = create_test_manager();
        manager.tokens().set_tokens("T1", None, 3600).await.unwrap();

        let report = manager.test_token_refresh().await.unwrap();
        assert!(report.success);
        assert_eq!(report.message, "Token is still valid, no refresh needed");
        assert!(report.initial_state.is_none());
    }

    #[test]
    fn test_report_serializes_camel_case() {
        let report = TokenTestReport {
            has_refresh_token: Some(false),
            ..TokenTestReport::new(true, "ok")
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["hasRefreshToken"], false);
        assert!(json.get("initialState").is_none());
    }
}
