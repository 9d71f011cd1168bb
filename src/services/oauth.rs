// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Strava OAuth client: authorization URL, code exchange and token refresh.
//!
//! Neither call retries. Authorization codes are single-use, and a rejected
//! refresh token stays rejected.

use crate::config::StravaConfig;
use crate::error::AppError;
use crate::models::Credential;
use crate::time_utils::from_unix_seconds;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

/// Scopes requested during authorization.
const OAUTH_SCOPE: &str = "read,activity:read_all";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Strava OAuth client.
#[derive(Clone)]
pub struct OAuthClient {
    http: reqwest::Client,
    config: StravaConfig,
}

impl OAuthClient {
    pub fn new(config: StravaConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { http, config }
    }

    /// Browser URL that starts the authorization flow.
    pub fn authorize_url(&self, state: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&approval_prompt=auto&scope={}&state={}",
            self.config.authorize_endpoint,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode(OAUTH_SCOPE),
            urlencoding::encode(state),
        )
    }

    /// Exchange an authorization code for a token pair.
    pub async fn exchange(&self, code: &str) -> Result<TokenResponse, AppError> {
        self.post_token(&[
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
        ])
        .await
    }

    /// Obtain a new token pair with a refresh token.
    ///
    /// Any failure here is permanent for that refresh token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AppError> {
        self.post_token(&[
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ])
        .await
    }

    async fn post_token(&self, form: &[(&str, &str)]) -> Result<TokenResponse, AppError> {
        let grant_type = form
            .iter()
            .find(|(k, _)| *k == "grant_type")
            .map(|(_, v)| *v)
            .unwrap_or_default();

        let response = self
            .http
            .post(&self.config.token_endpoint)
            .form(form)
            .send()
            .await
            .map_err(|e| AppError::ExternalAuth(format!("Token request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, grant_type, body = %body, "Strava token request rejected");
            return Err(AppError::ExternalAuth(format!(
                "Token request failed with status {}",
                status
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::ExternalAuth(format!("Failed to parse token response: {}", e)))
    }
}

/// Token response from Strava (exchange and refresh share the shape).
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Expiry as seconds since the epoch
    pub expires_at: i64,
}

impl TokenResponse {
    /// Build the stored credential for `user_id`, timestamped `now`.
    pub fn into_credential(
        self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Credential, AppError> {
        let expires_at = from_unix_seconds(self.expires_at).ok_or_else(|| {
            AppError::ExternalAuth(format!("Invalid expires_at: {}", self.expires_at))
        })?;

        Ok(Credential {
            user_id: user_id.to_string(),
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            created_at: now,
            updated_at: now,
        })
    }
}
