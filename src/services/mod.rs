// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod activity;
pub mod credentials;
pub mod oauth;
pub mod strava;

pub use activity::{ActivityAggregator, ActivityFilter, ActivityView};
pub use credentials::{ConnectionStatus, CredentialManager, RefreshLocks};
pub use oauth::{OAuthClient, TokenResponse};
pub use strava::{ActivityQuery, StravaClient};
