// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Everything is read once at startup. The Strava-facing settings are split
//! out into [`StravaConfig`] so the OAuth and activity clients receive them
//! explicitly at construction.

use std::env;

const DEFAULT_TOKEN_ENDPOINT: &str = "https://www.strava.com/oauth/token";
const DEFAULT_AUTHORIZE_ENDPOINT: &str = "https://www.strava.com/oauth/authorize";
const DEFAULT_DATA_ENDPOINT: &str = "https://www.strava.com/api/v3";

/// Margin before token expiration when we proactively refresh (5 minutes).
pub const DEFAULT_REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// Page size used when the caller does not ask for one.
pub const DEFAULT_PER_PAGE: u32 = 30;

/// Which credential store backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Firestore,
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firestore" => Ok(Self::Firestore),
            "memory" => Ok(Self::Memory),
            _ => Err(ConfigError::Invalid("STORE_BACKEND")),
        }
    }
}

/// OAuth client credentials and provider endpoints.
#[derive(Debug, Clone)]
pub struct StravaConfig {
    /// Strava OAuth client ID (public)
    pub client_id: String,
    /// Strava OAuth client secret
    pub client_secret: String,
    /// Callback URL registered with Strava
    pub redirect_uri: String,
    /// Token exchange/refresh endpoint
    pub token_endpoint: String,
    /// Browser authorization endpoint
    pub authorize_endpoint: String,
    /// Base URL of the data API (without trailing slash)
    pub data_endpoint: String,
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub strava: StravaConfig,
    /// Frontend URL for OAuth redirects
    pub frontend_url: String,
    /// Public base URL of this API
    pub api_url: String,
    /// GCP project ID (Firestore)
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,
    pub store_backend: StoreBackend,
    /// JWT verification key shared with the identity provider (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// HMAC key for the OAuth `state` parameter
    pub oauth_state_key: Vec<u8>,
    /// Remaining lifetime below which a token is refreshed
    pub refresh_margin_secs: i64,
    /// Activities requested per remote call
    pub activities_per_page: u32,
}

impl Config {
    /// Config for tests only. Endpoints point at localhost.
    pub fn test_default() -> Self {
        Self {
            strava: StravaConfig {
                client_id: "test_client_id".to_string(),
                client_secret: "test_secret".to_string(),
                redirect_uri: "http://localhost:8080/auth/strava/callback".to_string(),
                token_endpoint: "http://127.0.0.1:9/oauth/token".to_string(),
                authorize_endpoint: DEFAULT_AUTHORIZE_ENDPOINT.to_string(),
                data_endpoint: "http://127.0.0.1:9/api/v3".to_string(),
            },
            frontend_url: "http://localhost:5173".to_string(),
            api_url: "http://localhost:8080".to_string(),
            gcp_project_id: "test-project".to_string(),
            port: 8080,
            store_backend: StoreBackend::Memory,
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            oauth_state_key: b"test_state_key_32_bytes_minimum!".to_vec(),
            refresh_margin_secs: DEFAULT_REFRESH_MARGIN_SECS,
            activities_per_page: DEFAULT_PER_PAGE,
        }
    }

    /// Point both Strava endpoints at a mock server (tests).
    pub fn with_strava_base(mut self, base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        self.strava.token_endpoint = format!("{}/oauth/token", base);
        self.strava.data_endpoint = format!("{}/api/v3", base);
        self
    }

    /// Load configuration from environment variables.
    ///
    /// A `.env` file is honored for local development.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let api_url = env::var("API_URL")
            .map(|v| v.trim_end_matches('/').to_string())
            .unwrap_or_else(|_| "http://localhost:8080".to_string());

        let strava = StravaConfig {
            client_id: env::var("STRAVA_CLIENT_ID")
                .map_err(|_| ConfigError::Missing("STRAVA_CLIENT_ID"))?,
            client_secret: env::var("STRAVA_CLIENT_SECRET")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("STRAVA_CLIENT_SECRET"))?,
            redirect_uri: env::var("STRAVA_REDIRECT_URI")
                .unwrap_or_else(|_| format!("{}/auth/strava/callback", api_url)),
            token_endpoint: env::var("STRAVA_TOKEN_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_TOKEN_ENDPOINT.to_string()),
            authorize_endpoint: env::var("STRAVA_AUTHORIZE_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_AUTHORIZE_ENDPOINT.to_string()),
            data_endpoint: env::var("STRAVA_DATA_ENDPOINT")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| DEFAULT_DATA_ENDPOINT.to_string()),
        };

        let gcp_project_id = env::var("GCP_PROJECT_ID").ok();
        let store_backend = match env::var("STORE_BACKEND") {
            Ok(raw) => raw.parse()?,
            Err(_) if gcp_project_id.is_some() => StoreBackend::Firestore,
            Err(_) => StoreBackend::Memory,
        };

        let jwt_signing_key = env::var("JWT_SIGNING_KEY")
            .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
            .into_bytes();
        let oauth_state_key = env::var("OAUTH_STATE_KEY")
            .map(|v| v.into_bytes())
            .unwrap_or_else(|_| jwt_signing_key.clone());

        let refresh_margin_secs = match env::var("TOKEN_REFRESH_MARGIN_SECS") {
            Ok(raw) => raw
                .trim()
                .parse::<i64>()
                .ok()
                .filter(|v| *v >= 0)
                .ok_or(ConfigError::Invalid("TOKEN_REFRESH_MARGIN_SECS"))?,
            Err(_) => DEFAULT_REFRESH_MARGIN_SECS,
        };

        let activities_per_page = match env::var("ACTIVITIES_PER_PAGE") {
            Ok(raw) => raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|v| (1..=200).contains(v))
                .ok_or(ConfigError::Invalid("ACTIVITIES_PER_PAGE"))?,
            Err(_) => DEFAULT_PER_PAGE,
        };

        Ok(Self {
            strava,
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            api_url,
            gcp_project_id: gcp_project_id.unwrap_or_else(|| "local-dev".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            store_backend,
            jwt_signing_key,
            oauth_state_key,
            refresh_margin_secs,
            activities_per_page,
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}
