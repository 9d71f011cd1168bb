// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid or expired token")]
    InvalidToken,

    /// No stored Strava credential; the user has to connect.
    #[error("No Strava credential stored")]
    NoCredential,

    /// The stored credential could not be made valid; the user has to reconnect.
    #[error("Strava authorization failed: {0}")]
    AuthFailure(String),

    #[error("Strava OAuth error: {0}")]
    ExternalAuth(String),

    #[error("Strava API error: {0}")]
    ExternalData(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Message used for HTTP 401 from the data API.
    pub const STRAVA_TOKEN_ERROR: &'static str = "Strava rejected the access token";
    /// Message used for HTTP 429 from Strava.
    pub const STRAVA_RATE_LIMIT: &'static str = "Strava rate limit exceeded";

    /// True when the user must (re)authorize before anything else will work.
    pub fn requires_reconnect(&self) -> bool {
        matches!(self, AppError::AuthFailure(_))
    }

    /// True when the user has never connected (or was disconnected).
    pub fn requires_connect(&self) -> bool {
        matches!(self, AppError::NoCredential)
    }

    /// True for data API errors caused by a rejected access token.
    pub fn is_strava_token_error(&self) -> bool {
        matches!(self, AppError::ExternalData(msg) if msg == Self::STRAVA_TOKEN_ERROR)
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            AppError::InvalidToken => (StatusCode::UNAUTHORIZED, "invalid_token", None),
            AppError::NoCredential => (StatusCode::NOT_FOUND, "not_connected", None),
            AppError::AuthFailure(msg) => {
                tracing::warn!(reason = %msg, "Strava authorization lost");
                (StatusCode::UNAUTHORIZED, "reconnect_required", None)
            }
            AppError::ExternalAuth(msg) => {
                (StatusCode::BAD_GATEWAY, "strava_auth_error", Some(msg.clone()))
            }
            AppError::ExternalData(msg) => {
                (StatusCode::BAD_GATEWAY, "strava_error", Some(msg.clone()))
            }
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "validation_error", Some(msg.clone()))
            }
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
