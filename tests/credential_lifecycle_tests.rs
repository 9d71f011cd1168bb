// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Credential lifecycle tests against a mock Strava token endpoint.
//!
//! These tests verify that:
//! 1. A token outside the refresh margin is returned without any HTTP call
//! 2. Expiring and expired tokens are refreshed exactly once and persisted
//! 3. A rejected refresh deletes the record and asks for a reconnect
//! 4. Concurrent callers for one user share a single refresh
//! 5. Store failures surface as AuthFailure

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use mtb_tracker::config::Config;
use mtb_tracker::db::{CredentialStore, MemoryStore};
use mtb_tracker::error::AppError;
use mtb_tracker::models::Credential;
use mtb_tracker::services::{CredentialManager, OAuthClient, RefreshLocks};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;
use common::{credential_expiring_in, seed, token_json};

const USER: &str = "user-123";

fn manager(server: &MockServer, store: Arc<dyn CredentialStore>) -> CredentialManager {
    manager_with_locks(server, store, Arc::new(dashmap::DashMap::new()))
}

fn manager_with_locks(
    server: &MockServer,
    store: Arc<dyn CredentialStore>,
    locks: RefreshLocks,
) -> CredentialManager {
    let config = Config::test_default().with_strava_base(&server.uri());
    CredentialManager::new(
        OAuthClient::new(config.strava),
        store,
        locks,
        config.refresh_margin_secs,
    )
}

/// Refresh endpoint that answers slowly, so a refresh stays in flight.
async fn mount_slow_refresh(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(token_json(
                    "new_access",
                    "new_refresh",
                    Utc::now() + Duration::hours(6),
                ))
                .set_delay(std::time::Duration::from_millis(300)),
        )
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_refresh(server: &MockServer, expires_at: DateTime<Utc>, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=old_refresh"))
        .and(body_string_contains("client_id=test_client_id"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(token_json(
                "new_access",
                "new_refresh",
                expires_at,
            )),
        )
        .expect(expected_calls)
        .mount(server)
        .await;
}

// ═══════════════════════════════════════════════════════════════════════════
// GET VALID ACCESS TOKEN
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_valid_token_returned_without_refresh() {
    let server = MockServer::start().await;
    mount_refresh(&server, Utc::now() + Duration::hours(6), 0).await;

    let store = MemoryStore::new();
    let stored = credential_expiring_in(USER, Duration::hours(2));
    seed(&store, &stored).await;

    let token = manager(&server, Arc::new(store.clone()))
        .get_valid_access_token(USER)
        .await
        .unwrap();

    assert_eq!(token, "old_access");
    assert_eq!(store.get(USER).await.unwrap(), Some(stored));
}

#[tokio::test]
async fn test_expiring_token_is_refreshed_once() {
    let server = MockServer::start().await;
    let new_expiry = Utc::now() + Duration::hours(6);
    mount_refresh(&server, new_expiry, 1).await;

    let store = MemoryStore::new();
    let stored = credential_expiring_in(USER, Duration::seconds(60));
    seed(&store, &stored).await;

    let token = manager(&server, Arc::new(store.clone()))
        .get_valid_access_token(USER)
        .await
        .unwrap();
    assert_eq!(token, "new_access");

    let persisted = store.get(USER).await.unwrap().unwrap();
    assert_eq!(persisted.access_token, "new_access");
    assert_eq!(persisted.refresh_token, "new_refresh");
    assert_eq!(persisted.expires_at.timestamp(), new_expiry.timestamp());
    assert!(persisted.expires_at > stored.expires_at);
    assert_eq!(persisted.created_at, stored.created_at);
    assert!(persisted.updated_at > stored.updated_at);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_expired_token_is_refreshed() {
    let server = MockServer::start().await;
    mount_refresh(&server, Utc::now() + Duration::hours(6), 1).await;

    let store = MemoryStore::new();
    seed(&store, &credential_expiring_in(USER, Duration::hours(-1))).await;

    let token = manager(&server, Arc::new(store.clone()))
        .get_valid_access_token(USER)
        .await
        .unwrap();
    assert_eq!(token, "new_access");
}

#[tokio::test]
async fn test_second_call_after_refresh_uses_stored_token() {
    let server = MockServer::start().await;
    mount_refresh(&server, Utc::now() + Duration::hours(6), 1).await;

    let store = MemoryStore::new();
    seed(&store, &credential_expiring_in(USER, Duration::seconds(10))).await;
    let manager = manager(&server, Arc::new(store.clone()));

    assert_eq!(manager.get_valid_access_token(USER).await.unwrap(), "new_access");
    assert_eq!(manager.get_valid_access_token(USER).await.unwrap(), "new_access");
}

#[tokio::test]
async fn test_rejected_refresh_deletes_credential() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "message": "Bad Request",
            "errors": [{"resource": "RefreshToken", "field": "refresh_token", "code": "invalid"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = MemoryStore::new();
    seed(&store, &credential_expiring_in(USER, Duration::seconds(30))).await;
    let manager = manager(&server, Arc::new(store.clone()));

    let err = manager.get_valid_access_token(USER).await.unwrap_err();
    assert!(err.requires_reconnect(), "got {:?}", err);
    assert!(store.is_empty());

    // The record is gone, so the next call asks for a fresh connect
    let err = manager.get_valid_access_token(USER).await.unwrap_err();
    assert!(matches!(err, AppError::NoCredential));
}

#[tokio::test]
async fn test_rejected_refresh_releases_user_lock() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;

    let store = MemoryStore::new();
    seed(&store, &credential_expiring_in(USER, Duration::seconds(30))).await;
    let locks: RefreshLocks = Arc::new(dashmap::DashMap::new());
    let manager = manager_with_locks(&server, Arc::new(store.clone()), locks.clone());

    assert!(manager.get_valid_access_token(USER).await.is_err());
    assert!(locks.is_empty());
}

#[tokio::test]
async fn test_unparseable_refresh_response_is_auth_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let store = MemoryStore::new();
    seed(&store, &credential_expiring_in(USER, Duration::seconds(30))).await;

    let err = manager(&server, Arc::new(store.clone()))
        .get_valid_access_token(USER)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AuthFailure(_)));
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_missing_credential_is_no_credential() {
    let server = MockServer::start().await;
    mount_refresh(&server, Utc::now(), 0).await;

    let err = manager(&server, Arc::new(MemoryStore::new()))
        .get_valid_access_token("nobody")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NoCredential));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_share_one_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(token_json(
                    "new_access",
                    "new_refresh",
                    Utc::now() + Duration::hours(6),
                ))
                .set_delay(std::time::Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = MemoryStore::new();
    seed(&store, &credential_expiring_in(USER, Duration::seconds(60))).await;
    let manager = manager(&server, Arc::new(store.clone()));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.get_valid_access_token(USER).await })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), "new_access");
    }
    assert_eq!(store.len(), 1);
}

// ═══════════════════════════════════════════════════════════════════════════
// STORE FAILURES
// ═══════════════════════════════════════════════════════════════════════════

/// Store wrapper that fails selected operations.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    fail_get: AtomicBool,
    fail_upsert: AtomicBool,
    sweeps: AtomicUsize,
}

#[async_trait]
impl CredentialStore for FlakyStore {
    async fn get(&self, user_id: &str) -> Result<Option<Credential>, AppError> {
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(AppError::Database("connection reset".to_string()));
        }
        self.inner.get(user_id).await
    }

    async fn upsert(&self, credential: &Credential) -> Result<(), AppError> {
        if self.fail_upsert.load(Ordering::SeqCst) {
            return Err(AppError::Database("write rejected".to_string()));
        }
        self.inner.upsert(credential).await
    }

    async fn delete(&self, user_id: &str) -> Result<(), AppError> {
        self.inner.delete(user_id).await
    }

    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> Result<usize, AppError> {
        self.sweeps.fetch_add(1, Ordering::SeqCst);
        self.inner.delete_expired_before(cutoff).await
    }
}

#[tokio::test]
async fn test_store_read_failure_is_auth_failure_and_sweeps() {
    let server = MockServer::start().await;
    mount_refresh(&server, Utc::now(), 0).await;

    let store = Arc::new(FlakyStore::default());
    seed(store.as_ref(), &credential_expiring_in(USER, Duration::hours(2))).await;
    seed(
        store.as_ref(),
        &credential_expiring_in("stale-user", Duration::days(-3)),
    )
    .await;
    store.fail_get.store(true, Ordering::SeqCst);

    let err = manager(&server, store.clone())
        .get_valid_access_token(USER)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::AuthFailure(_)));
    assert_eq!(store.sweeps.load(Ordering::SeqCst), 1);
    assert_eq!(store.inner.len(), 1, "only the expired record is swept");
}

#[tokio::test]
async fn test_store_write_failure_after_refresh_is_auth_failure() {
    let server = MockServer::start().await;
    mount_refresh(&server, Utc::now() + Duration::hours(6), 1).await;

    let store = Arc::new(FlakyStore::default());
    seed(store.as_ref(), &credential_expiring_in(USER, Duration::seconds(60))).await;
    store.fail_upsert.store(true, Ordering::SeqCst);

    let err = manager(&server, store.clone())
        .get_valid_access_token(USER)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AuthFailure(_)));
}

// ═══════════════════════════════════════════════════════════════════════════
// CONNECT / DISCONNECT
// ═══════════════════════════════════════════════════════════════════════════

async fn mount_exchange(server: &MockServer, access: &str, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=auth-code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_json(
            access,
            "fresh_refresh",
            Utc::now() + Duration::hours(6),
        )))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_connect_creates_single_record() {
    let server = MockServer::start().await;
    mount_exchange(&server, "fresh_access", 1).await;

    let store = MemoryStore::new();
    let credential = manager(&server, Arc::new(store.clone()))
        .connect(USER, "auth-code")
        .await
        .unwrap();

    assert_eq!(credential.user_id, USER);
    assert_eq!(store.len(), 1);
    assert_eq!(store.get(USER).await.unwrap(), Some(credential));
}

#[tokio::test]
async fn test_reconnect_replaces_record_and_keeps_created_at() {
    let server = MockServer::start().await;
    mount_exchange(&server, "fresh_access", 1).await;

    let store = MemoryStore::new();
    let previous = credential_expiring_in(USER, Duration::hours(-10));
    seed(&store, &previous).await;

    let manager = manager(&server, Arc::new(store.clone()));
    manager.connect(USER, "auth-code").await.unwrap();

    let stored = store.get(USER).await.unwrap().unwrap();
    assert_eq!(store.len(), 1);
    assert_eq!(stored.access_token, "fresh_access");
    assert_eq!(stored.created_at, previous.created_at);
    assert_eq!(
        manager.get_valid_access_token(USER).await.unwrap(),
        "fresh_access"
    );
}

#[tokio::test]
async fn test_failed_exchange_stores_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(400))
        .expect(1)
        .mount(&server)
        .await;

    let store = MemoryStore::new();
    let err = manager(&server, Arc::new(store.clone()))
        .connect(USER, "used-code")
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::ExternalAuth(_)));
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_disconnect_and_status() {
    let server = MockServer::start().await;
    let store = MemoryStore::new();
    seed(&store, &credential_expiring_in(USER, Duration::seconds(100))).await;
    let manager = manager(&server, Arc::new(store.clone()));

    let status = manager.status(USER).await.unwrap();
    assert!(status.connected);
    assert_eq!(
        status.state,
        Some(mtb_tracker::models::CredentialState::Expiring)
    );

    manager.disconnect(USER).await.unwrap();
    assert!(!manager.status(USER).await.unwrap().connected);

    // Disconnecting twice is fine
    manager.disconnect(USER).await.unwrap();
}

#[tokio::test]
async fn test_sweep_expired_removes_only_expired() {
    let server = MockServer::start().await;
    let store = MemoryStore::new();
    seed(&store, &credential_expiring_in("a", Duration::hours(-1))).await;
    seed(&store, &credential_expiring_in("b", Duration::seconds(30))).await;
    seed(&store, &credential_expiring_in("c", Duration::hours(5))).await;

    let removed = manager(&server, Arc::new(store.clone()))
        .sweep_expired()
        .await
        .unwrap();

    assert_eq!(removed, 1);
    assert!(store.get("a").await.unwrap().is_none());
    assert!(store.get("b").await.unwrap().is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_disconnect_waits_for_refresh_in_flight() {
    let server = MockServer::start().await;
    mount_slow_refresh(&server).await;

    let store = MemoryStore::new();
    seed(&store, &credential_expiring_in(USER, Duration::seconds(60))).await;
    let manager = manager(&server, Arc::new(store.clone()));

    let refreshing = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.get_valid_access_token(USER).await })
    };
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    manager.disconnect(USER).await.unwrap();
    assert_eq!(refreshing.await.unwrap().unwrap(), "new_access");

    // The refreshed pair must not resurrect the disconnected record
    assert!(store.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reconnect_not_overwritten_by_refresh_in_flight() {
    let server = MockServer::start().await;
    mount_slow_refresh(&server).await;
    mount_exchange(&server, "fresh_access", 1).await;

    let store = MemoryStore::new();
    seed(&store, &credential_expiring_in(USER, Duration::seconds(60))).await;
    let manager = manager(&server, Arc::new(store.clone()));

    let refreshing = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.get_valid_access_token(USER).await })
    };
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    manager.connect(USER, "auth-code").await.unwrap();
    refreshing.await.unwrap().unwrap();

    let stored = store.get(USER).await.unwrap().unwrap();
    assert_eq!(stored.access_token, "fresh_access");
    assert_eq!(stored.refresh_token, "fresh_refresh");
}
