// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Strava OAuth connect routes.
//!
//! The signed `state` parameter carries the user ID through Strava's
//! redirect, so the callback knows whose credential it is storing without
//! relying on a session cookie surviving the round trip.

use axum::{
    extract::{Query, State},
    response::Redirect,
    routing::get,
    Extension, Router,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use subtle::ConstantTimeEq;

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::AppState;

// Type alias for HMAC-SHA256
type HmacSha256 = Hmac<Sha256>;

/// How long a signed state stays acceptable.
const STATE_MAX_AGE_MS: u128 = 10 * 60 * 1000;

/// Routes reachable without a session (Strava redirects here).
pub fn public_routes() -> Router<Arc<AppState>> {
    Router::new().route("/auth/strava/callback", get(auth_callback))
}

/// Routes that need an authenticated user.
pub fn protected_routes() -> Router<Arc<AppState>> {
    Router::new().route("/auth/strava", get(auth_start))
}

/// Start OAuth flow - redirect to Strava authorization.
async fn auth_start(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Redirect> {
    let oauth_state = sign_state(&user.user_id, now_millis()?, &state.config.oauth_state_key)?;
    let auth_url = state.credentials.oauth().authorize_url(&oauth_state);

    tracing::info!(
        user_id = %user.user_id,
        client_id = %state.config.strava.client_id,
        "Starting OAuth flow, redirecting to Strava"
    );

    Ok(Redirect::temporary(&auth_url))
}

#[derive(Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// OAuth callback - exchange code for tokens and store them.
async fn auth_callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Result<Redirect> {
    let frontend_url = state.config.frontend_url.trim_end_matches('/').to_string();
    let fail = |reason: &str| {
        Redirect::temporary(&format!(
            "{}?error={}",
            frontend_url,
            urlencoding::encode(reason)
        ))
    };

    // Check for OAuth errors (e.g. the user pressed "Cancel")
    if let Some(error) = params.error {
        tracing::warn!(error = %error, "OAuth error from Strava");
        return Ok(fail(&error));
    }

    let user_id = match params.state.as_deref().and_then(|s| {
        verify_and_decode_state(s, &state.config.oauth_state_key, now_millis().ok()?)
    }) {
        Some(id) => id,
        None => {
            tracing::warn!("Invalid, expired or tampered OAuth state parameter");
            return Ok(fail("invalid_state"));
        }
    };

    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::BadRequest("Code is required".to_string()))?;

    tracing::info!(user_id = %user_id, "Exchanging authorization code for tokens");

    match state.credentials.connect(&user_id, &code).await {
        Ok(_) => Ok(Redirect::temporary(&format!("{}/dashboard", frontend_url))),
        Err(AppError::ExternalAuth(msg)) => {
            tracing::error!(user_id = %user_id, error = %msg, "Strava token exchange failed");
            Ok(fail("exchange_failed"))
        }
        Err(e) => Err(e),
    }
}

fn now_millis() -> Result<u128> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("System time error: {}", e)))?
        .as_millis())
}

fn signature(payload: &str, secret: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(payload.as_bytes());
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Encode `user_id|timestamp_hex|signature_hex` as URL-safe base64.
fn sign_state(user_id: &str, timestamp_ms: u128, secret: &[u8]) -> Result<String> {
    let payload = format!("{}|{:x}", user_id, timestamp_ms);
    let sig = signature(&payload, secret)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("HMAC init failed")))?;
    Ok(URL_SAFE_NO_PAD.encode(format!("{}|{}", payload, sig)))
}

/// Verify HMAC signature and age, returning the user ID from the state.
fn verify_and_decode_state(state: &str, secret: &[u8], now_ms: u128) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(state).ok()?;
    let state_str = String::from_utf8(bytes).ok()?;

    // Split from the right so user IDs may contain '|'.
    let mut parts = state_str.rsplitn(3, '|');
    let signature_hex = parts.next()?;
    let timestamp_hex = parts.next()?;
    let user_id = parts.next()?;

    let payload = format!("{}|{}", user_id, timestamp_hex);
    let expected = signature(&payload, secret)?;
    if !bool::from(expected.as_bytes().ct_eq(signature_hex.as_bytes())) {
        tracing::error!("OAuth state signature mismatch! Potential tampering.");
        return None;
    }

    let issued_ms = u128::from_str_radix(timestamp_hex, 16).ok()?;
    if now_ms.saturating_sub(issued_ms) > STATE_MAX_AGE_MS || issued_ms > now_ms + 60_000 {
        return None;
    }

    (!user_id.is_empty()).then(|| user_id.to_string())
}
