// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! MTB-Tracker: keep a Strava connection alive and show recent rides
//!
//! This crate provides the backend API that stores each user's Strava
//! credential, refreshes it before it expires, and serves their activity
//! history filtered by date range and activity type.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::CredentialStore;
use services::{ActivityAggregator, CredentialManager, OAuthClient, StravaClient};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub credentials: CredentialManager,
    pub activities: ActivityAggregator,
}

impl AppState {
    /// Wire the Strava clients and services around a credential store.
    pub fn new(config: Config, store: Arc<dyn CredentialStore>) -> Self {
        let refresh_locks = Arc::new(dashmap::DashMap::new());
        let credentials = CredentialManager::new(
            OAuthClient::new(config.strava.clone()),
            store,
            refresh_locks,
            config.refresh_margin_secs,
        );
        let activities = ActivityAggregator::new(
            credentials.clone(),
            StravaClient::new(&config.strava),
            config.activities_per_page,
        );

        Self {
            config,
            credentials,
            activities,
        }
    }
}
