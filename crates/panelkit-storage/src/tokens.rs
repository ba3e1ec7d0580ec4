//! Typed accessors for the session credentials.

use crate::{StorageError, StorageKeys, StorageMap, StorageResult, StorageService};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Safety margin applied when checking expiry. A token expiring within this
/// window is already treated as expired.
pub const EXPIRY_MARGIN_MS: i64 = 30_000;

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Every session field, read in one storage call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    /// Absolute expiry of `access_token`, milliseconds since the Unix epoch.
    pub expires_at: Option<i64>,
    pub is_logged_in: bool,
}

impl SessionSnapshot {
    pub fn has_access_token(&self) -> bool {
        self.access_token.is_some()
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.is_some()
    }

    /// Validity at `now_ms`.
    ///
    /// A token without an expiry is valid (legacy tokens carry none).
    pub fn is_valid_at(&self, now_ms: i64) -> bool {
        if self.access_token.is_none() {
            return false;
        }
        match self.expires_at {
            None => true,
            Some(expires_at) => expires_at > now_ms + EXPIRY_MARGIN_MS,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(now_millis())
    }

    /// Time left before expiry, negative once expired.
    pub fn expires_in_ms(&self, now_ms: i64) -> Option<i64> {
        self.expires_at.map(|at| at - now_ms)
    }
}

fn read_string(map: &StorageMap, key: &str) -> Option<String> {
    match map.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn read_millis(map: &StorageMap, key: &str) -> Option<i64> {
    let value = map.get(key)?;
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f as i64))
        .filter(|ms| *ms != 0)
}

fn read_bool(map: &StorageMap, key: &str) -> bool {
    map.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// Reads and writes the session keys. The only writer of those keys.
#[derive(Clone)]
pub struct TokenStore {
    storage: Arc<StorageService>,
    default_server_url: String,
}

impl TokenStore {
    pub fn new(storage: Arc<StorageService>, default_server_url: impl Into<String>) -> Self {
        Self {
            storage,
            default_server_url: default_server_url.into(),
        }
    }

    pub fn storage(&self) -> &Arc<StorageService> {
        &self.storage
    }

    /// Access token, falling back to the legacy `token` field.
    pub async fn access_token(&self) -> StorageResult<Option<String>> {
        let map = self
            .storage
            .get(&[StorageKeys::ACCESS_TOKEN, StorageKeys::LEGACY_TOKEN])
            .await?;
        Ok(read_string(&map, StorageKeys::ACCESS_TOKEN)
            .or_else(|| read_string(&map, StorageKeys::LEGACY_TOKEN)))
    }

    pub async fn refresh_token(&self) -> StorageResult<Option<String>> {
        let map = self.storage.get(&[StorageKeys::REFRESH_TOKEN]).await?;
        Ok(read_string(&map, StorageKeys::REFRESH_TOKEN))
    }

    pub async fn token_expiration(&self) -> StorageResult<Option<i64>> {
        let map = self.storage.get(&[StorageKeys::TOKEN_EXPIRATION]).await?;
        Ok(read_millis(&map, StorageKeys::TOKEN_EXPIRATION))
    }

    pub async fn is_logged_in(&self) -> StorageResult<bool> {
        let map = self.storage.get(&[StorageKeys::IS_LOGGED_IN]).await?;
        Ok(read_bool(&map, StorageKeys::IS_LOGGED_IN))
    }

    /// All session fields from a single read.
    pub async fn snapshot(&self) -> StorageResult<SessionSnapshot> {
        let map = self.storage.get(&StorageKeys::SESSION_KEYS).await?;

        let access_token = read_string(&map, StorageKeys::ACCESS_TOKEN)
            .or_else(|| read_string(&map, StorageKeys::LEGACY_TOKEN));
        // An expiry without a token means nothing.
        let expires_at = access_token
            .as_ref()
            .and_then(|_| read_millis(&map, StorageKeys::TOKEN_EXPIRATION));

        Ok(SessionSnapshot {
            access_token,
            refresh_token: read_string(&map, StorageKeys::REFRESH_TOKEN),
            expires_at,
            is_logged_in: read_bool(&map, StorageKeys::IS_LOGGED_IN),
        })
    }

    /// Install a full token set in one write. Returns the absolute expiry.
    ///
    /// A lifetime whose expiry does not fit in epoch milliseconds is rejected
    /// and nothing is written.
    pub async fn set_tokens(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_in_secs: i64,
    ) -> StorageResult<i64> {
        let expires_at = expires_in_secs
            .checked_mul(1000)
            .and_then(|ms| now_millis().checked_add(ms))
            .ok_or_else(|| {
                StorageError::Encoding(format!(
                    "Token lifetime out of range: {}s",
                    expires_in_secs
                ))
            })?;

        let mut items = StorageMap::new();
        items.insert(StorageKeys::ACCESS_TOKEN.into(), access_token.into());
        items.insert(
            StorageKeys::REFRESH_TOKEN.into(),
            refresh_token.map_or(Value::Null, Value::from),
        );
        items.insert(StorageKeys::TOKEN_EXPIRATION.into(), expires_at.into());
        items.insert(StorageKeys::LEGACY_TOKEN.into(), access_token.into());
        items.insert(StorageKeys::IS_LOGGED_IN.into(), true.into());
        self.storage.set(items).await?;

        debug!(expires_at, has_refresh = refresh_token.is_some(), "session tokens stored");
        Ok(expires_at)
    }

    /// Install a static access token with no refresh token or expiry.
    pub async fn set_access_token(&self, token: &str) -> StorageResult<()> {
        let mut items = StorageMap::new();
        items.insert(StorageKeys::ACCESS_TOKEN.into(), token.into());
        items.insert(StorageKeys::LEGACY_TOKEN.into(), token.into());
        items.insert(StorageKeys::IS_LOGGED_IN.into(), (!token.is_empty()).into());
        self.storage.set(items).await
    }

    /// Overwrite only the expiry.
    pub async fn set_token_expiration(&self, expires_at: i64) -> StorageResult<()> {
        self.storage
            .set_value(StorageKeys::TOKEN_EXPIRATION, expires_at.into())
            .await
    }

    /// Null every session field in one write.
    pub async fn clear(&self) -> StorageResult<()> {
        let mut items = StorageMap::new();
        items.insert(StorageKeys::ACCESS_TOKEN.into(), Value::Null);
        items.insert(StorageKeys::REFRESH_TOKEN.into(), Value::Null);
        items.insert(StorageKeys::TOKEN_EXPIRATION.into(), Value::Null);
        items.insert(StorageKeys::LEGACY_TOKEN.into(), Value::Null);
        items.insert(StorageKeys::IS_LOGGED_IN.into(), false.into());
        self.storage.set(items).await?;

        debug!("session tokens cleared");
        Ok(())
    }

    /// Stored CMS base URL, or the configured default.
    pub async fn server_url(&self) -> StorageResult<String> {
        let map = self.storage.get(&[StorageKeys::SERVER_URL]).await?;
        Ok(read_string(&map, StorageKeys::SERVER_URL)
            .unwrap_or_else(|| self.default_server_url.clone()))
    }

    pub async fn set_server_url(&self, url: &str) -> StorageResult<()> {
        self.storage
            .set_value(StorageKeys::SERVER_URL, url.into())
            .await
    }
}
