//! Session manager behavior against a scripted CMS.

use async_trait::async_trait;
use panelkit_auth::{ApiRequest, AuthError, AuthState, Credentials, SessionManager};
use panelkit_storage::{
    now_millis, PlatformStore, SharedMemoryStore, StorageChanges, StorageMap, StorageResult,
    StorageService, TokenStore,
};
use panelkit_testkit::{MockCms, MockResponse};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tokio::sync::broadcast;

fn manager_for(server_url: &str) -> SessionManager {
    let storage = Arc::new(StorageService::in_memory());
    let tokens = TokenStore::new(storage, server_url);
    SessionManager::new(tokens, Duration::from_secs(5)).unwrap()
}

/// Store an access token that expired a minute ago, with refresh token `R1`.
async fn store_expired_session(manager: &SessionManager) {
    manager
        .tokens()
        .set_tokens("T1", Some("R1"), 3600)
        .await
        .unwrap();
    manager
        .tokens()
        .set_token_expiration(now_millis() - 60_000)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_login_scenario() {
    let cms = MockCms::start(|req| match req.route() {
        "/auth/login" => MockResponse::token_grant("T1", "R1", 3600),
        _ => MockResponse::status(404),
    })
    .await
    .unwrap();
    let manager = manager_for(&cms.url());

    assert!(!manager.validate_token().await.unwrap());

    let before = now_millis();
    let grant = manager
        .authenticate(&Credentials::new("a@b.com", "x"))
        .await
        .unwrap();
    let after = now_millis();

    assert_eq!(grant.access_token, "T1");
    assert_eq!(grant.refresh_token.as_deref(), Some("R1"));
    assert_eq!(grant.expires_in, 3600);
    assert!(grant.expires_at >= before + 3_600_000 && grant.expires_at <= after + 3_600_000);

    let stored = manager.tokens().token_expiration().await.unwrap().unwrap();
    assert_eq!(stored, grant.expires_at);
    assert!(manager.validate_token().await.unwrap());
    assert!(manager.tokens().is_logged_in().await.unwrap());
    assert_eq!(manager.fsm_state(), AuthState::Valid);

    let login = &cms.requests()[0];
    assert_eq!(login.method, "POST");
    assert_eq!(login.json(), json!({"email": "a@b.com", "password": "x"}));
}

#[tokio::test]
async fn test_login_rejected_propagates_status() {
    let cms = MockCms::start(|_| MockResponse::status(401)).await.unwrap();
    let manager = manager_for(&cms.url());

    let err = manager
        .authenticate(&Credentials::new("a@b.com", "wrong"))
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::InvalidCredentials { status: 401, .. }));
    assert_eq!(manager.tokens().access_token().await.unwrap(), None);
    assert_eq!(manager.fsm_state(), AuthState::Unauthenticated);
}

#[tokio::test]
async fn test_login_server_error() {
    let cms = MockCms::start(|_| MockResponse::status(503)).await.unwrap();
    let manager = manager_for(&cms.url());

    let err = manager
        .authenticate(&Credentials::new("a@b.com", "x"))
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(503));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_login_unreachable_server_is_network_error() {
    let manager = manager_for("http://127.0.0.1:1");

    let err = manager
        .authenticate(&Credentials::new("a@b.com", "x"))
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::Network(_)));
}

#[tokio::test]
async fn test_refresh_scenario_installs_new_tokens() {
    let cms = MockCms::start(|req| match req.route() {
        "/auth/refresh" => MockResponse::token_grant("T2", "R2", 3600),
        _ => MockResponse::status(404),
    })
    .await
    .unwrap();
    let manager = manager_for(&cms.url());
    store_expired_session(&manager).await;

    assert!(!manager.validate_token().await.unwrap());
    assert!(manager.refresh_token().await.unwrap());

    let tokens = manager.tokens();
    assert_eq!(tokens.access_token().await.unwrap().as_deref(), Some("T2"));
    assert_eq!(tokens.refresh_token().await.unwrap().as_deref(), Some("R2"));
    assert!(manager.validate_token().await.unwrap());

    let refresh = &cms.requests()[0];
    assert_eq!(refresh.json(), json!({"refresh_token": "R1"}));
}

#[tokio::test]
async fn test_refresh_rejected_clears_session() {
    let cms = MockCms::start(|_| MockResponse::status(401)).await.unwrap();
    let manager = manager_for(&cms.url());
    store_expired_session(&manager).await;

    assert!(!manager.refresh_token().await.unwrap());

    let snapshot = manager.tokens().snapshot().await.unwrap();
    assert_eq!(snapshot.access_token, None);
    assert_eq!(snapshot.refresh_token, None);
    assert_eq!(snapshot.expires_at, None);
    assert!(!snapshot.is_logged_in);
    assert_eq!(manager.fsm_state(), AuthState::Unauthenticated);
}

#[tokio::test]
async fn test_refresh_malformed_body_clears_session() {
    let cms = MockCms::start(|_| MockResponse::text(200, "<html>oops</html>"))
        .await
        .unwrap();
    let manager = manager_for(&cms.url());
    store_expired_session(&manager).await;

    assert!(!manager.refresh_token().await.unwrap());
    assert_eq!(manager.tokens().refresh_token().await.unwrap(), None);
}

#[tokio::test]
async fn test_refresh_without_new_refresh_token_keeps_old_one() {
    let cms = MockCms::start(|_| {
        MockResponse::ok(json!({"data": {"access_token": "T2", "expires": 3600}}))
    })
    .await
    .unwrap();
    let manager = manager_for(&cms.url());
    store_expired_session(&manager).await;

    assert!(manager.refresh_token().await.unwrap());
    assert_eq!(
        manager.tokens().refresh_token().await.unwrap().as_deref(),
        Some("R1")
    );
}

#[tokio::test]
async fn test_concurrent_refreshes_share_one_request() {
    let cms = MockCms::start(|_| {
        MockResponse::token_grant("T2", "R2", 3600).delayed(Duration::from_millis(200))
    })
    .await
    .unwrap();
    let manager = manager_for(&cms.url());
    store_expired_session(&manager).await;

    let (first, second) = tokio::join!(manager.refresh_token(), manager.refresh_token());

    assert!(first.unwrap());
    assert!(second.unwrap());
    assert_eq!(cms.count("/auth/refresh"), 1);
}

/// Applies writes immediately but resolves `set` only after `settle`,
/// like a file store that renames before its write call returns.
struct SlowSettleStore {
    inner: SharedMemoryStore,
    settle: Duration,
}

#[async_trait]
impl PlatformStore for SlowSettleStore {
    async fn get(&self, keys: &[String]) -> StorageResult<StorageMap> {
        self.inner.get(keys).await
    }

    async fn get_all(&self) -> StorageResult<StorageMap> {
        self.inner.get_all().await
    }

    async fn set(&self, items: StorageMap) -> StorageResult<()> {
        self.inner.set(items).await?;
        tokio::time::sleep(self.settle).await;
        Ok(())
    }

    async fn remove(&self, keys: &[String]) -> StorageResult<()> {
        self.inner.remove(keys).await
    }

    async fn clear(&self) -> StorageResult<()> {
        self.inner.clear().await
    }

    fn watch(&self) -> broadcast::Receiver<StorageChanges> {
        self.inner.watch()
    }
}

#[tokio::test]
async fn test_waiter_shares_refresh_that_wrote_before_settling() {
    let cms = MockCms::start(|_| MockResponse::token_grant("T2", "R2", 3600))
        .await
        .unwrap();
    let store = SlowSettleStore {
        inner: SharedMemoryStore::new(),
        settle: Duration::from_millis(300),
    };
    let storage = Arc::new(StorageService::with_platform(Arc::new(store)));
    let tokens = TokenStore::new(storage, cms.url());
    let manager = Arc::new(SessionManager::new(tokens, Duration::from_secs(5)).unwrap());
    store_expired_session(&manager).await;

    let leader = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.refresh_token().await })
    };
    // The new tokens are visible by now, but the leader still holds the lock.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(
        manager.tokens().access_token().await.unwrap().as_deref(),
        Some("T2")
    );

    let waiter = manager.refresh_token().await.unwrap();

    assert!(leader.await.unwrap().unwrap());
    assert!(waiter);
    assert!(manager.validate_token().await.unwrap());
    assert_eq!(cms.count("/auth/refresh"), 1);
}

#[tokio::test]
async fn test_waiter_reports_failed_shared_refresh() {
    let cms = MockCms::start(|_| MockResponse::status(401).delayed(Duration::from_millis(200)))
        .await
        .unwrap();
    let manager = manager_for(&cms.url());
    store_expired_session(&manager).await;

    let (first, second) = tokio::join!(manager.refresh_token(), manager.refresh_token());

    assert!(!first.unwrap());
    assert!(!second.unwrap());
    assert_eq!(cms.count("/auth/refresh"), 1);
}

#[tokio::test]
async fn test_refresh_with_unusable_lifetime_clears_session() {
    for expires in [0, -60, i64::MAX / 10] {
        let cms = MockCms::start(move |_| MockResponse::token_grant("T2", "R2", expires))
            .await
            .unwrap();
        let manager = manager_for(&cms.url());
        store_expired_session(&manager).await;

        assert!(!manager.refresh_token().await.unwrap(), "expires = {}", expires);
        let snapshot = manager.tokens().snapshot().await.unwrap();
        assert_eq!(snapshot.access_token, None);
        assert_eq!(snapshot.refresh_token, None);
    }
}

#[tokio::test]
async fn test_login_with_unusable_lifetime_is_invalid_response() {
    let cms = MockCms::start(|_| MockResponse::token_grant("T1", "R1", i64::MAX))
        .await
        .unwrap();
    let manager = manager_for(&cms.url());

    let err = manager
        .authenticate(&Credentials::new("a@b.com", "x"))
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::InvalidResponse(_)));
    assert_eq!(manager.tokens().access_token().await.unwrap(), None);
}

#[tokio::test]
async fn test_expired_token_is_refreshed_before_request() {
    let cms = MockCms::start(|req| match req.route() {
        "/auth/refresh" => MockResponse::token_grant("T2", "R2", 3600),
        "/items/module_options" if req.bearer() == Some("T2") => {
            MockResponse::ok(json!({"data": [{"id": 7}]}))
        }
        _ => MockResponse::status(401),
    })
    .await
    .unwrap();
    let manager = manager_for(&cms.url());
    store_expired_session(&manager).await;

    let response = manager
        .make_authenticated_request("/items/module_options", ApiRequest::get())
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["data"][0]["id"], 7);
    assert_eq!(cms.count("/auth/refresh"), 1);
    assert_eq!(cms.count("/items/module_options"), 1);
}

#[tokio::test]
async fn test_server_401_triggers_exactly_one_retry() {
    let cms = MockCms::start(|req| match req.route() {
        "/auth/refresh" => MockResponse::token_grant("T2", "R2", 3600),
        "/items/things" if req.bearer() == Some("T2") => MockResponse::ok(json!({"data": []})),
        _ => MockResponse::status(401),
    })
    .await
    .unwrap();
    let manager = manager_for(&cms.url());
    manager
        .tokens()
        .set_tokens("T1", Some("R1"), 3600)
        .await
        .unwrap();

    let response = manager
        .make_authenticated_request("items/things", ApiRequest::get())
        .await
        .unwrap();

    assert!(response.status().is_success());
    assert_eq!(cms.count("/auth/refresh"), 1);

    let bearers: Vec<_> = cms
        .requests()
        .iter()
        .filter(|r| r.route() == "/items/things")
        .map(|r| r.bearer().map(str::to_string))
        .collect();
    assert_eq!(bearers, vec![Some("T1".to_string()), Some("T2".to_string())]);
}

#[tokio::test]
async fn test_second_401_is_auth_required() {
    let cms = MockCms::start(|req| match req.route() {
        "/auth/refresh" => MockResponse::token_grant("T2", "R2", 3600),
        _ => MockResponse::status(401),
    })
    .await
    .unwrap();
    let manager = manager_for(&cms.url());
    manager
        .tokens()
        .set_tokens("T1", Some("R1"), 3600)
        .await
        .unwrap();

    let err = manager
        .make_authenticated_request("/items/things", ApiRequest::get())
        .await
        .unwrap_err();

    assert!(err.is_auth_required());
    assert_eq!(cms.count("/items/things"), 2);
    assert_eq!(cms.count("/auth/refresh"), 1);
}

#[tokio::test]
async fn test_request_without_session_is_auth_required() {
    let cms = MockCms::start(|_| MockResponse::ok(json!({}))).await.unwrap();
    let manager = manager_for(&cms.url());

    let err = manager
        .make_authenticated_request("/items/things", ApiRequest::get())
        .await
        .unwrap_err();

    assert!(err.is_auth_required());
    assert!(cms.requests().is_empty());
}

#[tokio::test]
async fn test_non_401_errors_are_returned_as_responses() {
    let cms = MockCms::start(|_| MockResponse::status(500)).await.unwrap();
    let manager = manager_for(&cms.url());
    manager.set_static_token("STATIC").await.unwrap();

    let response = manager
        .make_authenticated_request("/items/things", ApiRequest::get())
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 500);
    assert_eq!(cms.requests()[0].bearer(), Some("STATIC"));
}

#[tokio::test]
async fn test_transport_failure_with_token_is_network_error() {
    let manager = manager_for("http://127.0.0.1:1");
    manager
        .tokens()
        .set_tokens("T1", Some("R1"), 3600)
        .await
        .unwrap();

    let err = manager
        .make_authenticated_request("/items/things", ApiRequest::get())
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::Network(_)));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_request_sends_query_and_body() {
    let cms = MockCms::start(|_| MockResponse::ok(json!({"data": {"id": 1}})))
        .await
        .unwrap();
    let manager = manager_for(&cms.url());
    manager.set_static_token("STATIC").await.unwrap();

    manager
        .make_authenticated_request(
            "/items/module_results",
            ApiRequest::post(json!({"options_id": 1})).with_query("fields", "*"),
        )
        .await
        .unwrap();

    let request = &cms.requests()[0];
    assert_eq!(request.method, "POST");
    assert_eq!(request.path, "/items/module_results?fields=*");
    assert_eq!(request.json(), json!({"options_id": 1}));
}

#[tokio::test]
async fn test_logout_clears_every_token() {
    let manager = manager_for("http://127.0.0.1:1");
    manager
        .tokens()
        .set_tokens("T1", Some("R1"), 3600)
        .await
        .unwrap();

    manager.logout().await.unwrap();

    let snapshot = manager.tokens().snapshot().await.unwrap();
    assert_eq!(snapshot, Default::default());
    assert!(!manager.validate_token().await.unwrap());
}

#[tokio::test]
async fn test_session_survives_reopening_file_store() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("storage.json");
    let cms = MockCms::start(|_| MockResponse::token_grant("T1", "R1", 3600))
        .await
        .unwrap();

    {
        let storage = panelkit_storage::create_storage_service(path.clone());
        let manager =
            SessionManager::new(TokenStore::new(storage, cms.url()), Duration::from_secs(5))
                .unwrap();
        manager
            .authenticate(&Credentials::new("a@b.com", "x"))
            .await
            .unwrap();
    }

    let storage = panelkit_storage::create_storage_service(path);
    let manager =
        SessionManager::new(TokenStore::new(storage, cms.url()), Duration::from_secs(5)).unwrap();
    assert!(manager.validate_token().await.unwrap());
    assert_eq!(
        manager.tokens().access_token().await.unwrap().as_deref(),
        Some("T1")
    );
}
