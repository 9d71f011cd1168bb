// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for authenticated users.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{Activity, ActivityKind, DateRange, RangePreset};
use crate::services::{ActivityFilter, ConnectionStatus};
use crate::time_utils::{format_utc_rfc3339, parse_utc_rfc3339};
use crate::AppState;
use axum::{
    extract::{Query, State},
    routing::get,
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

const MAX_LIMIT: usize = 100;

/// API routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/connection",
            get(get_connection).delete(delete_connection),
        )
        .route("/api/activities", get(get_activities))
}

// ─── Connection ──────────────────────────────────────────────

/// Report whether the user has a stored Strava credential.
async fn get_connection(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ConnectionStatus>> {
    Ok(Json(state.credentials.status(&user.user_id).await?))
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct DisconnectResponse {
    pub success: bool,
}

/// Forget the user's Strava credential.
async fn delete_connection(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<DisconnectResponse>> {
    state.credentials.disconnect(&user.user_id).await?;
    Ok(Json(DisconnectResponse { success: true }))
}

// ─── Activities ──────────────────────────────────────────────

#[derive(Deserialize)]
struct ActivitiesQuery {
    /// Partition: ride, run or other
    #[serde(rename = "type", default = "default_type")]
    kind: String,
    /// Preset window (3m, 6m, 12m, all); ignored when start/end are given
    #[serde(default)]
    range: RangePreset,
    /// Explicit window start (RFC3339)
    start: Option<String>,
    /// Explicit window end (RFC3339)
    end: Option<String>,
    /// Keep only the N most recent
    limit: Option<usize>,
}

fn default_type() -> String {
    "ride".to_string()
}

fn parse_timestamp(name: &str, raw: &str) -> Result<chrono::DateTime<chrono::Utc>> {
    parse_utc_rfc3339(raw).ok_or_else(|| {
        AppError::BadRequest(format!(
            "Invalid '{}' parameter: must be RFC3339 datetime",
            name
        ))
    })
}

impl ActivitiesQuery {
    fn into_filter(self, now: chrono::DateTime<chrono::Utc>) -> Result<ActivityFilter> {
        let kind: ActivityKind = self.kind.parse()?;

        let range = match (self.start.as_deref(), self.end.as_deref()) {
            (Some(start), Some(end)) => {
                DateRange::new(parse_timestamp("start", start)?, parse_timestamp("end", end)?)?
            }
            (None, None) => self.range.range_ending(now),
            _ => {
                return Err(AppError::BadRequest(
                    "'start' and 'end' must be given together".to_string(),
                ))
            }
        };

        let limit = match self.limit {
            Some(0) => {
                return Err(AppError::BadRequest(
                    "Limit must be greater than 0".to_string(),
                ))
            }
            Some(n) => Some(n.min(MAX_LIMIT)),
            None => None,
        };

        Ok(ActivityFilter { range, kind, limit })
    }
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ActivitiesResponse {
    pub activities: Vec<ActivitySummary>,
    #[cfg_attr(feature = "binding-generation", ts(type = "string"))]
    pub kind: ActivityKind,
    pub start: String,
    pub end: String,
    /// Activities Strava returned for the window, before type filtering
    pub total_fetched: u32,
}

#[derive(Serialize, Clone, Debug)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ActivitySummary {
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub id: u64,
    pub name: String,
    #[serde(rename = "type")]
    pub activity_type: String,
    pub start_date: String,
    pub distance_meters: f64,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub moving_time_seconds: u64,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub elapsed_time_seconds: u64,
    pub elevation_gain_meters: f64,
    pub average_speed_mps: f64,
    pub location_city: Option<String>,
}

impl From<Activity> for ActivitySummary {
    fn from(a: Activity) -> Self {
        Self {
            id: a.id,
            name: a.name,
            activity_type: a.activity_type,
            start_date: format_utc_rfc3339(a.start_time),
            distance_meters: a.distance_meters,
            moving_time_seconds: a.moving_time_seconds,
            elapsed_time_seconds: a.elapsed_time_seconds,
            elevation_gain_meters: a.elevation_gain_meters,
            average_speed_mps: a.average_speed_mps,
            location_city: a.location_city,
        }
    }
}

/// Get the user's activities for one partition and date window.
async fn get_activities(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<ActivitiesQuery>,
) -> Result<Json<ActivitiesResponse>> {
    let filter = params.into_filter(chrono::Utc::now())?;

    tracing::debug!(
        user_id = %user.user_id,
        kind = filter.kind.as_str(),
        start = %filter.range.start(),
        end = %filter.range.end(),
        limit = ?filter.limit,
        "Fetching activities"
    );

    let view = state
        .activities
        .list_activities(&user.user_id, &filter)
        .await?;

    Ok(Json(ActivitiesResponse {
        kind: view.kind,
        start: format_utc_rfc3339(view.range.start()),
        end: format_utc_rfc3339(view.range.end()),
        total_fetched: view.total_fetched as u32,
        activities: view.activities.into_iter().map(ActivitySummary::from).collect(),
    }))
}
