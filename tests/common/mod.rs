// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use chrono::{DateTime, Duration, Utc};
use mtb_tracker::config::Config;
use mtb_tracker::db::{CredentialStore, FirestoreDb, MemoryStore};
use mtb_tracker::models::Credential;
use mtb_tracker::routes::create_router;
use mtb_tracker::AppState;
use std::sync::Arc;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Create a test app backed by an in-memory store.
/// Returns the router, the shared state and the store for inspection.
#[allow(dead_code)]
pub fn create_test_app(config: Config) -> (axum::Router, Arc<AppState>, MemoryStore) {
    let store = MemoryStore::new();
    let state = Arc::new(AppState::new(config, Arc::new(store.clone())));
    (create_router(state.clone()), state, store)
}

/// Session token for `user_id`, signed with the test config's key.
#[allow(dead_code)]
pub fn create_test_jwt(user_id: &str) -> String {
    mtb_tracker::middleware::auth::create_jwt(user_id, &Config::test_default().jwt_signing_key)
        .unwrap()
}

/// A credential that expires `expires_in` from now.
#[allow(dead_code)]
pub fn credential_expiring_in(user_id: &str, expires_in: Duration) -> Credential {
    let now = Utc::now();
    Credential {
        user_id: user_id.to_string(),
        access_token: "old_access".to_string(),
        refresh_token: "old_refresh".to_string(),
        expires_at: now + expires_in,
        created_at: now - Duration::days(30),
        updated_at: now - Duration::hours(6),
    }
}

/// Store a credential, panicking on failure.
#[allow(dead_code)]
pub async fn seed(store: &dyn CredentialStore, credential: &Credential) {
    store.upsert(credential).await.unwrap();
}

/// JSON token response with the given expiry.
#[allow(dead_code)]
pub fn token_json(access: &str, refresh: &str, expires_at: DateTime<Utc>) -> serde_json::Value {
    serde_json::json!({
        "token_type": "Bearer",
        "access_token": access,
        "refresh_token": refresh,
        "expires_at": expires_at.timestamp(),
        "expires_in": (expires_at - Utc::now()).num_seconds(),
    })
}

/// Unique user ID for test isolation.
#[allow(dead_code)]
pub fn unique_user_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("test-user-{}", nanos)
}
