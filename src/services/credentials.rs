// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Credential lifecycle: connect, validate, refresh and evict.

use crate::db::CredentialStore;
use crate::error::AppError;
use crate::models::{Credential, CredentialState};
use crate::services::oauth::OAuthClient;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Shared refresh locks type for use in AppState.
pub type RefreshLocks = Arc<DashMap<String, Arc<Mutex<()>>>>;

/// Connection state reported to the frontend.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<CredentialState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Hands out access tokens that are valid for at least the refresh margin.
///
/// Callers only ever see two failures from [`get_valid_access_token`]:
/// `NoCredential` (connect) and `AuthFailure` (reconnect).
///
/// [`get_valid_access_token`]: CredentialManager::get_valid_access_token
#[derive(Clone)]
pub struct CredentialManager {
    oauth: OAuthClient,
    store: Arc<dyn CredentialStore>,
    /// Per-user mutex to serialize token refresh operations.
    refresh_locks: RefreshLocks,
    margin: Duration,
}

impl CredentialManager {
    pub fn new(
        oauth: OAuthClient,
        store: Arc<dyn CredentialStore>,
        refresh_locks: RefreshLocks,
        margin_secs: i64,
    ) -> Self {
        Self {
            oauth,
            store,
            refresh_locks,
            margin: Duration::seconds(margin_secs),
        }
    }

    pub fn oauth(&self) -> &OAuthClient {
        &self.oauth
    }

    // ─── Token Management ────────────────────────────────────────────────────

    /// Get a valid access token for the user, refreshing first if needed.
    ///
    /// 1. Read the stored credential; return it if outside the margin
    /// 2. Acquire the per-user refresh lock
    /// 3. Re-read (another task may have refreshed while we waited)
    /// 4. Refresh with Strava, persist, return the persisted token
    /// 5. On refresh failure delete the record
    pub async fn get_valid_access_token(&self, user_id: &str) -> Result<String, AppError> {
        let credential = self.load(user_id).await?;
        if !credential.state_at(Utc::now(), self.margin).needs_refresh() {
            return Ok(credential.access_token);
        }

        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let credential = self.load(user_id).await?;
        let state = credential.state_at(Utc::now(), self.margin);
        if !state.needs_refresh() {
            tracing::debug!(user_id, "Token already refreshed by another request");
            return Ok(credential.access_token);
        }

        tracing::info!(user_id, state = ?state, "Access token expiring, refreshing");

        let refreshed = match self.oauth.refresh(&credential.refresh_token).await {
            Ok(tokens) => tokens.into_credential(user_id, Utc::now()),
            Err(e) => Err(e),
        };

        let refreshed = match refreshed {
            Ok(c) => c.replacing(&credential),
            Err(e) => {
                self.evict(user_id).await;
                return Err(AppError::AuthFailure(format!("Token refresh failed: {}", e)));
            }
        };

        self.store.upsert(&refreshed).await.map_err(|e| {
            tracing::error!(user_id, error = %e, "Failed to persist refreshed token");
            AppError::AuthFailure(format!("Failed to persist refreshed token: {}", e))
        })?;

        tracing::info!(user_id, expires_at = %refreshed.expires_at, "Token refreshed and stored");
        Ok(refreshed.access_token)
    }

    /// Read the user's credential, collapsing failures to the two coarse outcomes.
    async fn load(&self, user_id: &str) -> Result<Credential, AppError> {
        match self.store.get(user_id).await {
            Ok(Some(c)) => Ok(c),
            Ok(None) => Err(AppError::NoCredential),
            Err(e) => {
                tracing::error!(user_id, error = %e, "Failed to read credential");
                // Opportunistic cleanup.
                match self.store.delete_expired_before(Utc::now()).await {
                    Ok(count) => tracing::info!(count, "Cleaned up expired credentials"),
                    Err(e) => tracing::warn!(error = %e, "Expired credential cleanup failed"),
                }
                Err(AppError::AuthFailure(format!("Credential store unavailable: {}", e)))
            }
        }
    }

    /// Per-user mutex serializing every write to that user's record.
    fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.refresh_locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop a credential whose refresh token is no longer usable.
    ///
    /// Called with the user's lock held.
    async fn evict(&self, user_id: &str) {
        tracing::warn!(user_id, "Refresh rejected, deleting stored credential");
        if let Err(e) = self.store.delete(user_id).await {
            tracing::error!(user_id, error = %e, "Failed to delete rejected credential");
        }
        self.refresh_locks.remove(user_id);
    }

    // ─── OAuth Callback Handling ─────────────────────────────────────────────

    /// Exchange an authorization code and store the resulting credential.
    ///
    /// A reconnect replaces the user's existing record but keeps its
    /// `created_at`.
    pub async fn connect(&self, user_id: &str, code: &str) -> Result<Credential, AppError> {
        let tokens = self.oauth.exchange(code).await?;
        let mut credential = tokens.into_credential(user_id, Utc::now())?;

        // Wait out any refresh in flight so it cannot overwrite the new pair.
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        match self.store.get(user_id).await {
            Ok(Some(previous)) => credential = credential.replacing(&previous),
            Ok(None) => {}
            Err(e) => tracing::warn!(user_id, error = %e, "Could not read previous credential"),
        }

        self.store.upsert(&credential).await?;

        tracing::info!(user_id, expires_at = %credential.expires_at, "Strava connected");
        Ok(credential)
    }

    /// Remove the user's credential.
    pub async fn disconnect(&self, user_id: &str) -> Result<(), AppError> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        self.store.delete(user_id).await?;
        self.refresh_locks.remove(user_id);
        tracing::info!(user_id, "Strava disconnected");
        Ok(())
    }

    /// Report the stored credential's state without refreshing it.
    pub async fn status(&self, user_id: &str) -> Result<ConnectionStatus, AppError> {
        let status = match self.store.get(user_id).await? {
            Some(c) => ConnectionStatus {
                connected: true,
                state: Some(c.state_at(Utc::now(), self.margin)),
                expires_at: Some(c.expires_at),
            },
            None => ConnectionStatus {
                connected: false,
                state: None,
                expires_at: None,
            },
        };
        Ok(status)
    }

    /// Housekeeping: delete records that expired without being refreshed.
    pub async fn sweep_expired(&self) -> Result<usize, AppError> {
        let count = self.store.delete_expired_before(Utc::now()).await?;
        tracing::info!(count, "Swept expired credentials");
        Ok(count)
    }
}
