// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Strava data API client for listing athlete activities.
//!
//! One page per call and no retries; rate limits (429) and rejected tokens
//! (401) are reported with distinct messages so callers can tell them apart.

use crate::config::StravaConfig;
use crate::error::AppError;
use crate::models::Activity;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

/// Strava refuses `per_page` above this.
pub const MAX_PER_PAGE: u32 = 200;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Parameters for one activity list request.
#[derive(Debug, Clone, Copy)]
pub struct ActivityQuery {
    /// Latest start time to include
    pub before: Option<DateTime<Utc>>,
    /// Earliest start time to include
    pub after: Option<DateTime<Utc>>,
    pub per_page: u32,
}

impl ActivityQuery {
    /// Query string pairs; absent bounds are omitted entirely.
    ///
    /// Strava's `before`/`after` are exclusive whole seconds, so each bound is
    /// pushed out by one second to keep activities starting exactly on an
    /// edge. Callers trim to the exact inclusive window afterwards.
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("per_page", self.per_page.clamp(1, MAX_PER_PAGE).to_string())];
        if let Some(before) = self.before {
            // floor(before) + 1 is strictly later even with sub-second precision
            pairs.push(("before", (before.timestamp() + 1).to_string()));
        }
        if let Some(after) = self.after {
            pairs.push(("after", (after.timestamp() - 1).to_string()));
        }
        pairs
    }
}

/// Strava API client.
#[derive(Clone)]
pub struct StravaClient {
    http: reqwest::Client,
    base_url: String,
}

impl StravaClient {
    pub fn new(config: &StravaConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: config.data_endpoint.trim_end_matches('/').to_string(),
        }
    }

    /// List the athlete's activities (single page).
    pub async fn fetch_activities(
        &self,
        access_token: &str,
        query: &ActivityQuery,
    ) -> Result<Vec<Activity>, AppError> {
        let url = format!("{}/athlete/activities", self.base_url);

        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .query(&query.to_query_pairs())
            .send()
            .await
            .map_err(|e| AppError::ExternalData(e.to_string()))?;

        let summaries: Vec<StravaActivitySummary> = self.check_response_json(response).await?;

        tracing::debug!(count = summaries.len(), "Fetched activities from Strava");
        Ok(summaries.into_iter().map(Activity::from).collect())
    }

    /// Check response and parse JSON body.
    async fn check_response_json<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, AppError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            if status.as_u16() == 429 {
                tracing::warn!("Strava rate limit hit (429)");
                return Err(AppError::ExternalData(AppError::STRAVA_RATE_LIMIT.to_string()));
            }

            if status.as_u16() == 401 {
                return Err(AppError::ExternalData(
                    AppError::STRAVA_TOKEN_ERROR.to_string(),
                ));
            }

            return Err(AppError::ExternalData(format!("HTTP {}: {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::ExternalData(format!("JSON parse error: {}", e)))
    }
}

/// Summary activity as returned by `GET /athlete/activities`.
#[derive(Debug, Clone, Deserialize)]
pub struct StravaActivitySummary {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub activity_type: String,
    pub start_date: DateTime<Utc>,
    #[serde(default)]
    pub distance: f64,
    #[serde(default)]
    pub moving_time: u64,
    #[serde(default)]
    pub elapsed_time: u64,
    #[serde(default)]
    pub total_elevation_gain: f64,
    #[serde(default)]
    pub average_speed: f64,
    #[serde(default)]
    pub location_city: Option<String>,
}

impl From<StravaActivitySummary> for Activity {
    fn from(s: StravaActivitySummary) -> Self {
        Activity {
            id: s.id,
            name: s.name,
            activity_type: s.activity_type,
            start_time: s.start_date,
            distance_meters: s.distance.max(0.0),
            moving_time_seconds: s.moving_time,
            elapsed_time_seconds: s.elapsed_time,
            elevation_gain_meters: s.total_elevation_gain.max(0.0),
            average_speed_mps: s.average_speed.max(0.0),
            location_city: s.location_city.filter(|c| !c.is_empty()),
        }
    }
}
