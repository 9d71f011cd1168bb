// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Strava activity model, type partitions and date ranges.

use crate::error::AppError;
use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};

/// Activity as returned by the Strava data API (not persisted).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Activity {
    /// Strava activity ID
    pub id: u64,
    /// Activity name/title
    pub name: String,
    /// Strava type tag (Ride, Run, Hike, etc.)
    pub activity_type: String,
    pub start_time: DateTime<Utc>,
    pub distance_meters: f64,
    pub moving_time_seconds: u64,
    pub elapsed_time_seconds: u64,
    pub elevation_gain_meters: f64,
    pub average_speed_mps: f64,
    pub location_city: Option<String>,
}

impl Activity {
    pub fn kind(&self) -> ActivityKind {
        ActivityKind::classify(&self.activity_type)
    }
}

/// Disjoint partition of activity types used for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Ride,
    Run,
    Other,
}

impl ActivityKind {
    const RIDE_TYPES: &'static [&'static str] = &[
        "Ride",
        "MountainBikeRide",
        "GravelRide",
        "EBikeRide",
        "EMountainBikeRide",
        "VirtualRide",
    ];
    const RUN_TYPES: &'static [&'static str] = &["Run", "TrailRun", "VirtualRun"];

    /// Classify a Strava type tag. Unknown tags land in `Other`.
    pub fn classify(activity_type: &str) -> Self {
        if Self::RIDE_TYPES.contains(&activity_type) {
            ActivityKind::Ride
        } else if Self::RUN_TYPES.contains(&activity_type) {
            ActivityKind::Run
        } else {
            ActivityKind::Other
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActivityKind::Ride => "ride",
            ActivityKind::Run => "run",
            ActivityKind::Other => "other",
        }
    }
}

impl std::str::FromStr for ActivityKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ride" | "mtb" => Ok(ActivityKind::Ride),
            "run" => Ok(ActivityKind::Run),
            "other" => Ok(ActivityKind::Other),
            other => Err(AppError::Validation(format!(
                "Unknown activity type '{}'",
                other
            ))),
        }
    }
}

/// Inclusive time window used as a query and filter parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, AppError> {
        if start > end {
            return Err(AppError::Validation(format!(
                "Range start {} is after end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t <= self.end
    }

    /// True when `other` lies entirely inside this range.
    pub fn covers(&self, other: &DateRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// Preset windows offered by the date selector, all ending now.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum RangePreset {
    #[default]
    #[serde(rename = "3m")]
    LastThreeMonths,
    #[serde(rename = "6m")]
    LastSixMonths,
    #[serde(rename = "12m")]
    LastTwelveMonths,
    /// Five years back.
    #[serde(rename = "all")]
    AllTime,
}

impl RangePreset {
    pub fn months(self) -> u32 {
        match self {
            RangePreset::LastThreeMonths => 3,
            RangePreset::LastSixMonths => 6,
            RangePreset::LastTwelveMonths => 12,
            RangePreset::AllTime => 5 * 12,
        }
    }

    pub fn range_ending(self, now: DateTime<Utc>) -> DateRange {
        let start = now
            .checked_sub_months(Months::new(self.months()))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        DateRange { start, end: now }
    }
}
