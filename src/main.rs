// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! MTB-Tracker API Server
//!
//! Keeps each user's Strava connection alive and serves their recent
//! rides, runs and other activities to the dashboard.

use mtb_tracker::{
    config::{Config, StoreBackend},
    db::{CredentialStore, FirestoreDb, MemoryStore},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(
        port = config.port,
        backend = ?config.store_backend,
        refresh_margin_secs = config.refresh_margin_secs,
        "Starting MTB-Tracker API"
    );

    let store: Arc<dyn CredentialStore> = match config.store_backend {
        StoreBackend::Firestore => Arc::new(FirestoreDb::new(&config.gcp_project_id).await?),
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory credential store; credentials are lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    // Drop anything that expired while we were down
    let state = Arc::new(AppState::new(config.clone(), store));
    match state.credentials.sweep_expired().await {
        Ok(removed) => tracing::info!(removed, "Startup sweep of expired credentials"),
        Err(e) => tracing::warn!(error = %e, "Startup sweep failed"),
    }

    // Build router
    let app = mtb_tracker::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mtb_tracker=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
