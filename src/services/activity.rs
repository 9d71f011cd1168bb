// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Activity aggregation for the dashboard.
//!
//! Handles the core workflow:
//! 1. Get a valid access token for the user
//! 2. Fetch one page of activities for the requested window
//! 3. Sort newest first (ties broken by ID, descending)
//! 4. Keep the requested type partition
//! 5. Narrow to the date range on our side

use crate::error::{AppError, Result};
use crate::models::{Activity, ActivityKind, DateRange};
use crate::services::credentials::CredentialManager;
use crate::services::strava::{ActivityQuery, StravaClient};
use serde::Serialize;
use std::collections::HashMap;

/// What the dashboard asked for.
#[derive(Debug, Clone, Copy)]
pub struct ActivityFilter {
    pub range: DateRange,
    pub kind: ActivityKind,
    /// Keep only the N most recent matches
    pub limit: Option<usize>,
}

/// Sorted, classified activities plus the window they were fetched for.
#[derive(Debug, Clone, Serialize)]
pub struct ActivityView {
    pub kind: ActivityKind,
    /// Window the remote fetch covered
    pub fetched_range: DateRange,
    /// Window `activities` is currently narrowed to
    pub range: DateRange,
    pub activities: Vec<Activity>,
    /// Activities returned by Strava before partitioning and filtering
    pub total_fetched: usize,
    /// Most-recent cap applied to every range this view shows
    pub limit: Option<usize>,
    /// Full sorted partition, kept so narrowing needs no remote call
    #[serde(skip)]
    partition: Vec<Activity>,
}

impl ActivityView {
    /// Build a view from a raw page of activities.
    pub fn build(raw: Vec<Activity>, filter: &ActivityFilter) -> Self {
        let total_fetched = raw.len();
        let partition = partition_by_kind(sort_newest_first(raw))
            .remove(&filter.kind)
            .unwrap_or_default();

        Self {
            kind: filter.kind,
            fetched_range: filter.range,
            range: filter.range,
            activities: select(&partition, &filter.range, filter.limit),
            total_fetched,
            limit: filter.limit,
            partition,
        }
    }

    /// Re-apply a narrower date range without fetching again.
    ///
    /// Fails if `range` reaches outside the fetched window; the caller has to
    /// issue a fresh fetch in that case.
    pub fn narrow(&self, range: DateRange) -> Result<ActivityView> {
        if !self.fetched_range.covers(&range) {
            return Err(AppError::Validation(
                "Requested range exceeds the fetched window; fetch again".to_string(),
            ));
        }

        Ok(ActivityView {
            kind: self.kind,
            fetched_range: self.fetched_range,
            range,
            activities: select(&self.partition, &range, self.limit),
            total_fetched: self.total_fetched,
            limit: self.limit,
            partition: self.partition.clone(),
        })
    }
}

/// Fetches and classifies a user's activities.
#[derive(Clone)]
pub struct ActivityAggregator {
    credentials: CredentialManager,
    strava: StravaClient,
    per_page: u32,
}

impl ActivityAggregator {
    pub fn new(credentials: CredentialManager, strava: StravaClient, per_page: u32) -> Self {
        Self {
            credentials,
            strava,
            per_page,
        }
    }

    /// List the user's activities matching `filter`.
    ///
    /// Credential failures pass through unchanged (`NoCredential`,
    /// `AuthFailure`); fetch failures are `ExternalData`.
    pub async fn list_activities(
        &self,
        user_id: &str,
        filter: &ActivityFilter,
    ) -> Result<ActivityView> {
        let access_token = self.credentials.get_valid_access_token(user_id).await?;

        let query = ActivityQuery {
            after: Some(filter.range.start()),
            before: Some(filter.range.end()),
            per_page: self.per_page,
        };
        let raw = self
            .strava
            .fetch_activities(&access_token, &query)
            .await
            .inspect_err(|e| {
                if e.is_strava_token_error() {
                    tracing::warn!(user_id, "Strava rejected a token we considered valid");
                }
            })?;

        let view = ActivityView::build(raw, filter);

        tracing::info!(
            user_id,
            kind = filter.kind.as_str(),
            fetched = view.total_fetched,
            returned = view.activities.len(),
            "Listed activities"
        );

        Ok(view)
    }
}

/// Range-filter a sorted partition and keep the `limit` most recent.
fn select(partition: &[Activity], range: &DateRange, limit: Option<usize>) -> Vec<Activity> {
    let mut activities = filter_by_range(partition, range);
    if let Some(limit) = limit {
        activities.truncate(limit);
    }
    activities
}

/// Sort by start time descending, then ID descending.
pub fn sort_newest_first(mut activities: Vec<Activity>) -> Vec<Activity> {
    activities.sort_by(|a, b| {
        b.start_time
            .cmp(&a.start_time)
            .then_with(|| b.id.cmp(&a.id))
    });
    activities
}

/// Split activities into disjoint partitions, preserving order within each.
pub fn partition_by_kind(activities: Vec<Activity>) -> HashMap<ActivityKind, Vec<Activity>> {
    let mut partitions: HashMap<ActivityKind, Vec<Activity>> = HashMap::new();
    for activity in activities {
        partitions.entry(activity.kind()).or_default().push(activity);
    }
    partitions
}

/// Keep activities whose start time falls inside `range` (inclusive).
pub fn filter_by_range(activities: &[Activity], range: &DateRange) -> Vec<Activity> {
    activities
        .iter()
        .filter(|a| range.contains(a.start_time))
        .cloned()
        .collect()
}
