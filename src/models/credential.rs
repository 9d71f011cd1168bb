// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Stored Strava OAuth credential.

use crate::time_utils::{format_utc_rfc3339, parse_utc_rfc3339};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// OAuth token pair for one user. At most one exists per `user_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    /// Identity-provider user ID (also used as document ID)
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: String,
    /// After this instant the access token must not be used
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Freshness of a credential relative to the refresh margin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialState {
    /// More than the margin remains.
    Valid,
    /// Not yet expired but within the margin.
    Expiring,
    /// Already past `expires_at`.
    Expired,
}

impl CredentialState {
    pub fn needs_refresh(self) -> bool {
        !matches!(self, CredentialState::Valid)
    }
}

impl Credential {
    pub fn state_at(&self, now: DateTime<Utc>, margin: Duration) -> CredentialState {
        let remaining = self.expires_at - now;
        if remaining > margin {
            CredentialState::Valid
        } else if remaining >= Duration::zero() {
            CredentialState::Expiring
        } else {
            CredentialState::Expired
        }
    }

    /// Carry over bookkeeping from the record this one replaces.
    pub fn replacing(mut self, previous: &Credential) -> Self {
        self.user_id = previous.user_id.clone();
        self.created_at = previous.created_at;
        self
    }
}

/// Persisted credential layout (Firestore document).
///
/// Timestamps are RFC3339 strings with a `Z` suffix so range filters on
/// `expires_at` compare correctly as strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&Credential> for CredentialRecord {
    fn from(c: &Credential) -> Self {
        Self {
            user_id: c.user_id.clone(),
            access_token: c.access_token.clone(),
            refresh_token: c.refresh_token.clone(),
            expires_at: format_utc_rfc3339(c.expires_at),
            created_at: format_utc_rfc3339(c.created_at),
            updated_at: format_utc_rfc3339(c.updated_at),
        }
    }
}

impl TryFrom<CredentialRecord> for Credential {
    type Error = anyhow::Error;

    fn try_from(r: CredentialRecord) -> Result<Self, Self::Error> {
        let parse = |field: &str, raw: &str| {
            parse_utc_rfc3339(raw)
                .ok_or_else(|| anyhow::anyhow!("Invalid {} for user {}: {}", field, r.user_id, raw))
        };
        let expires_at = parse("expires_at", &r.expires_at)?;
        let created_at = parse("created_at", &r.created_at)?;
        // Older records may lack a distinct update time.
        let updated_at = parse_utc_rfc3339(&r.updated_at).unwrap_or(created_at);

        Ok(Self {
            user_id: r.user_id,
            access_token: r.access_token,
            refresh_token: r.refresh_token,
            expires_at,
            created_at,
            updated_at,
        })
    }
}
