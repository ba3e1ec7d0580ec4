//! Session management against the CMS auth endpoints.
//!
//! `SessionManager` owns the login, refresh and logout calls for one execution
//! context and wraps every data request with the session policy: validate,
//! refresh when needed, and retry once after a 401. Token state lives in the
//! [`TokenStore`]; the internal FSM only mirrors what this manager observed.

use crate::auth_fsm::{AuthMachine, AuthMachineInput, AuthState, AuthStateChangedPayload};
use crate::{AuthError, AuthResult};
use panelkit_config::Config;
use panelkit_storage::{now_millis, StorageService, TokenStore};
use parking_lot::Mutex;
use reqwest::{Client, Method, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Callback type for auth state change notifications.
pub type AuthStateCallback = Box<dyn Fn(AuthStateChangedPayload) + Send + Sync>;

/// Email/password pair for [`SessionManager::authenticate`].
#[derive(Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Tokens issued by a successful login or refresh.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Lifetime of the access token in seconds, as issued.
    pub expires_in: i64,
    /// Absolute expiry stored for the access token, milliseconds since epoch.
    pub expires_at: i64,
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"[REDACTED]")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_in", &self.expires_in)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Token payload as sent by the CMS.
#[derive(Debug, Deserialize)]
struct GrantBody {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires: i64,
}

/// Login/refresh answers come either bare or in the `{"data": ...}` envelope.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GrantEnvelope {
    Wrapped { data: GrantBody },
    Bare(GrantBody),
}

impl GrantEnvelope {
    fn into_body(self) -> GrantBody {
        match self {
            GrantEnvelope::Wrapped { data } => data,
            GrantEnvelope::Bare(body) => body,
        }
    }
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// A data request made through [`SessionManager::make_authenticated_request`].
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get() -> Self {
        Self::new(Method::GET)
    }

    pub fn post(body: Value) -> Self {
        Self::new(Method::POST).with_body(body)
    }

    pub fn patch(body: Value) -> Self {
        Self::new(Method::PATCH).with_body(body)
    }

    pub fn delete() -> Self {
        Self::new(Method::DELETE)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }
}

impl Default for ApiRequest {
    fn default() -> Self {
        Self::get()
    }
}

/// Point-in-time view of the session for status displays.
#[derive(Debug, Clone, Serialize)]
pub struct AuthSnapshot {
    pub state: AuthState,
    pub is_logged_in: bool,
    pub is_valid: bool,
    pub has_access_token: bool,
    pub has_refresh_token: bool,
    pub expires_at: Option<i64>,
    pub expires_in_secs: Option<i64>,
    pub server_url: String,
}

/// Session manager for one execution context.
pub struct SessionManager {
    tokens: TokenStore,
    http_client: Client,
    /// Internal FSM mirroring the observed session lifecycle.
    fsm: Mutex<AuthMachine>,
    /// Optional callback for state change notifications.
    state_callback: Mutex<Option<AuthStateCallback>>,
    /// Held for the duration of a refresh so concurrent callers share it.
    refresh_lock: tokio::sync::Mutex<RefreshRecord>,
}

/// Outcome of the latest refresh attempt, guarded by the single-flight lock.
#[derive(Debug, Default)]
struct RefreshRecord {
    generation: u64,
    installed: bool,
}

impl SessionManager {
    /// Create a session manager whose requests time out after `request_timeout`.
    pub fn new(tokens: TokenStore, request_timeout: Duration) -> AuthResult<Self> {
        let http_client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| AuthError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            tokens,
            http_client,
            fsm: Mutex::new(AuthMachine::new()),
            state_callback: Mutex::new(None),
            refresh_lock: tokio::sync::Mutex::new(RefreshRecord::default()),
        })
    }

    /// Create a session manager over `storage` using the configured server URL
    /// default and request timeout.
    pub fn from_config(storage: Arc<StorageService>, config: &Config) -> AuthResult<Self> {
        config
            .validate()
            .map_err(|e| AuthError::Config(e.to_string()))?;
        let tokens = TokenStore::new(storage, config.server_url.clone());
        Self::new(tokens, config.request_timeout())
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    /// Set a callback to be notified of auth state changes.
    pub fn set_state_callback(&self, callback: AuthStateCallback) {
        *self.state_callback.lock() = Some(callback);
    }

    /// Get the current FSM state.
    pub fn fsm_state(&self) -> AuthState {
        AuthState::from(self.fsm.lock().state())
    }

    /// Transition the FSM and notify the callback if the state changed.
    fn transition(&self, input: &AuthMachineInput) -> AuthResult<AuthState> {
        let mut fsm = self.fsm.lock();
        let old_state = AuthState::from(fsm.state());

        fsm.consume(input).map_err(|_| {
            AuthError::InvalidStateTransition(format!(
                "Cannot apply {:?} in state {:?}",
                input,
                fsm.state()
            ))
        })?;

        let new_state = AuthState::from(fsm.state());
        drop(fsm);

        if old_state != new_state {
            debug!(
                old_state = ?old_state,
                new_state = ?new_state,
                "Auth state transition"
            );
            if let Some(callback) = self.state_callback.lock().as_ref() {
                callback(AuthStateChangedPayload {
                    previous: old_state,
                    state: new_state,
                });
            }
        }

        Ok(new_state)
    }

    /// Apply a transition that may be impossible because another call on this
    /// manager interleaved. Storage decides the outcome, so the mismatch is
    /// only logged.
    fn advance(&self, input: AuthMachineInput) {
        if let Err(e) = self.transition(&input) {
            debug!(error = %e, "Ignoring auth state transition");
        }
    }

    /// Whether the stored access token is usable right now.
    ///
    /// Read-only: never refreshes. A token without a stored expiry is valid.
    pub async fn validate_token(&self) -> AuthResult<bool> {
        let snapshot = self.tokens.snapshot().await?;
        let valid = snapshot.is_valid();

        let input = match (snapshot.has_access_token(), valid) {
            (false, _) => AuthMachineInput::SessionCleared,
            (true, true) => AuthMachineInput::TokenFound,
            (true, false) => AuthMachineInput::TokenExpired,
        };
        self.advance(input);

        Ok(valid)
    }

    /// Exchange the stored refresh token for a new token set.
    ///
    /// Returns `Ok(false)` when there is no refresh token, and fails closed
    /// otherwise: any rejected or unusable refresh clears the session and
    /// returns `Ok(false)`. Errors are reserved for storage faults.
    ///
    /// Concurrent calls on one manager share a single request. A caller that
    /// waited behind an in-flight refresh reports that refresh's outcome,
    /// provided the stored session is still valid once it finishes.
    pub async fn refresh_token(&self) -> AuthResult<bool> {
        let mut record = match self.refresh_lock.try_lock() {
            Ok(record) => record,
            Err(_) => {
                debug!("Refresh already in flight, waiting for it");
                let record = self.refresh_lock.lock().await;
                let after = self.tokens.snapshot().await?;
                debug!(
                    generation = record.generation,
                    installed = record.installed,
                    "Shared refresh finished"
                );
                return Ok(record.installed && after.is_valid());
            }
        };
        record.generation += 1;
        record.installed = false;

        let Some(refresh_token) = self.tokens.refresh_token().await? else {
            debug!("No refresh token stored, cannot refresh");
            return Ok(false);
        };

        self.advance(AuthMachineInput::RefreshStarted);

        let grant = match self.request_refresh(&refresh_token).await {
            Ok(grant) => grant,
            Err(e) => {
                warn!(error = %e, "Token refresh failed, clearing session");
                self.fail_refresh().await?;
                return Ok(false);
            }
        };

        // A refresh answer without a new refresh token keeps the current one.
        let next_refresh = grant.refresh_token.as_deref().unwrap_or(&refresh_token);
        if let Err(e) = self
            .tokens
            .set_tokens(&grant.access_token, Some(next_refresh), grant.expires)
            .await
        {
            self.advance(AuthMachineInput::RefreshRejected);
            self.advance(AuthMachineInput::SessionCleared);
            return Err(e.into());
        }
        record.installed = true;

        self.advance(AuthMachineInput::RefreshSuccess);
        info!(
            generation = record.generation,
            expires_in = grant.expires,
            "Token refreshed successfully"
        );
        Ok(true)
    }

    async fn fail_refresh(&self) -> AuthResult<()> {
        self.advance(AuthMachineInput::RefreshRejected);
        let cleared = self.tokens.clear().await;
        self.advance(AuthMachineInput::SessionCleared);
        cleared.map_err(AuthError::from)
    }

    async fn request_refresh(&self, refresh_token: &str) -> AuthResult<GrantBody> {
        let url = self.endpoint_url("/auth/refresh").await?;
        debug!(url = %url, "Refreshing token");

        let response = self
            .http_client
            .post(url)
            .json(&RefreshRequest { refresh_token })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Server { status, body });
        }

        parse_grant(response).await
    }

    /// Log in with email and password and install the issued tokens.
    pub async fn authenticate(&self, credentials: &Credentials) -> AuthResult<TokenGrant> {
        self.advance(AuthMachineInput::LoginAttempt);

        match self.login_request(credentials).await {
            Ok(grant) => {
                self.advance(AuthMachineInput::LoginSuccess);
                info!(email = %credentials.email, "Login successful");
                Ok(grant)
            }
            Err(e) => {
                warn!(email = %credentials.email, error = %e, "Login failed");
                self.advance(AuthMachineInput::LoginFailed);
                Err(e)
            }
        }
    }

    async fn login_request(&self, credentials: &Credentials) -> AuthResult<TokenGrant> {
        let url = self.endpoint_url("/auth/login").await?;
        debug!(url = %url, email = %credentials.email, "Attempting email/password login");

        let response = self.http_client.post(url).json(credentials).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(if status.is_client_error() {
                AuthError::InvalidCredentials {
                    status: status.as_u16(),
                    body,
                }
            } else {
                AuthError::Server {
                    status: status.as_u16(),
                    body,
                }
            });
        }

        let body = parse_grant(response).await?;
        let expires_at = self
            .tokens
            .set_tokens(&body.access_token, body.refresh_token.as_deref(), body.expires)
            .await?;

        Ok(TokenGrant {
            access_token: body.access_token,
            refresh_token: body.refresh_token,
            expires_in: body.expires,
            expires_at,
        })
    }

    /// Perform a data request with the session policy applied.
    ///
    /// Validates the stored token first and refreshes it when invalid. A 401
    /// answer triggers exactly one refresh-and-retry with the new token.
    /// [`AuthError::AuthRequired`] means the session could not be recovered.
    /// Non-401 responses are returned as-is, whatever their status.
    pub async fn make_authenticated_request(
        &self,
        endpoint: &str,
        request: ApiRequest,
    ) -> AuthResult<Response> {
        if !self.validate_token().await? && !self.refresh_token().await? {
            debug!(endpoint, "No valid session for request");
            return Err(AuthError::AuthRequired);
        }

        let url = self.endpoint_url(endpoint).await?;
        let token = self
            .tokens
            .access_token()
            .await?
            .ok_or(AuthError::AuthRequired)?;

        let response = self.send_with_token(&url, &request, &token).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        info!(endpoint, "Request rejected with 401, refreshing and retrying once");
        if !self.refresh_token().await? {
            return Err(AuthError::AuthRequired);
        }

        let token = self
            .tokens
            .access_token()
            .await?
            .ok_or(AuthError::AuthRequired)?;
        let retry = self.send_with_token(&url, &request, &token).await?;
        if retry.status() == StatusCode::UNAUTHORIZED {
            warn!(endpoint, "Request rejected again after refresh");
            return Err(AuthError::AuthRequired);
        }

        Ok(retry)
    }

    async fn send_with_token(
        &self,
        url: &Url,
        request: &ApiRequest,
        token: &str,
    ) -> AuthResult<Response> {
        debug!(method = %request.method, url = %url, "Authenticated request");

        let mut builder = self
            .http_client
            .request(request.method.clone(), url.clone())
            .bearer_auth(token);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        match builder.send().await {
            Ok(response) => Ok(response),
            Err(e) => {
                // Without a stored token the failure is a session problem.
                if self.tokens.access_token().await?.is_some() {
                    warn!(error = %e, "Authenticated request failed");
                    Err(AuthError::Network(e))
                } else {
                    Err(AuthError::AuthRequired)
                }
            }
        }
    }

    /// Resolve `endpoint` against the configured server. Absolute URLs pass through.
    async fn endpoint_url(&self, endpoint: &str) -> AuthResult<Url> {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            return Ok(Url::parse(endpoint)?);
        }

        let base = self.server_url().await?;
        let joined = format!(
            "{}/{}",
            base.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        );
        Ok(Url::parse(&joined)?)
    }

    /// Remove every stored token. Always succeeds on an already-empty store.
    pub async fn logout(&self) -> AuthResult<()> {
        self.tokens.clear().await?;
        self.advance(AuthMachineInput::SessionCleared);
        info!("Logged out");
        Ok(())
    }

    /// Install a static access token (no refresh token, no expiry).
    pub async fn set_static_token(&self, token: &str) -> AuthResult<()> {
        self.tokens.set_access_token(token).await?;
        self.advance(if token.is_empty() {
            AuthMachineInput::SessionCleared
        } else {
            AuthMachineInput::TokenFound
        });
        info!("Static access token installed");
        Ok(())
    }

    pub async fn server_url(&self) -> AuthResult<String> {
        Ok(self.tokens.server_url().await?)
    }

    /// Store a new CMS base URL after checking it parses as http(s).
    pub async fn set_server_url(&self, url: &str) -> AuthResult<()> {
        let parsed = Url::parse(url)?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AuthError::Config(format!(
                "Unsupported URL scheme: {}",
                parsed.scheme()
            )));
        }

        let normalized = url.trim_end_matches('/');
        self.tokens.set_server_url(normalized).await?;
        info!(server_url = %normalized, "Server URL updated");
        Ok(())
    }

    /// Current session state as stored, plus the FSM state.
    pub async fn status(&self) -> AuthResult<AuthSnapshot> {
        let snapshot = self.tokens.snapshot().await?;
        let now = now_millis();

        Ok(AuthSnapshot {
            state: self.fsm_state(),
            is_logged_in: snapshot.is_logged_in,
            is_valid: snapshot.is_valid_at(now),
            has_access_token: snapshot.has_access_token(),
            has_refresh_token: snapshot.has_refresh_token(),
            expires_at: snapshot.expires_at,
            expires_in_secs: snapshot.expires_in_ms(now).map(|ms| ms / 1000),
            server_url: self.tokens.server_url().await?,
        })
    }
}

async fn parse_grant(response: Response) -> AuthResult<GrantBody> {
    let text = response.text().await?;
    let envelope: GrantEnvelope = serde_json::from_str(&text)
        .map_err(|e| AuthError::InvalidResponse(format!("Malformed token response: {}", e)))?;

    let body = envelope.into_body();
    if body.access_token.is_empty() {
        return Err(AuthError::InvalidResponse(
            "Token response carried an empty access token".to_string(),
        ));
    }
    let representable = body
        .expires
        .checked_mul(1000)
        .and_then(|ms| now_millis().checked_add(ms))
        .is_some();
    if body.expires <= 0 || !representable {
        return Err(AuthError::InvalidResponse(format!(
            "Token response carried an unusable lifetime: {}",
            body.expires
        )));
    }
    Ok(body)
}
