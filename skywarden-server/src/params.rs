// Skywarden - Multi-kit drone surveillance analytics
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Common query parameter shapes and validation.
//!
//! Bad parameters are always a 400 with the offending field named; they
//! never surface as a 500.

use chrono::Utc;
use serde::Deserialize;

use skywarden::timerange::TimeRange;
use skywarden_store::queries::{SignalQuery, TrackQuery};

use crate::error::ApiError;

/// Hard cap on result rows per query.
pub const MAX_LIMIT: i64 = 10_000;

/// Parameters of `/api/drones` and `/api/export/csv`.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackParams {
    #[serde(default = "default_time_range")]
    pub time_range: String,
    pub kit_id: Option<String>,
    pub rid_make: Option<String>,
    pub track_type: Option<String>,
    pub limit: Option<i64>,
    pub deduplicate: Option<bool>,
}

fn default_time_range() -> String {
    "1h".to_string()
}

impl TrackParams {
    /// Validate into a repository query.
    pub fn to_query(&self, default_limit: i64) -> Result<TrackQuery, ApiError> {
        let range = TimeRange::parse(&self.time_range, Utc::now())?;

        if let Some(track_type) = self.track_type.as_deref() {
            if track_type != "drone" && track_type != "aircraft" {
                return Err(ApiError::bad_request(format!(
                    "Invalid parameter 'track_type': expected drone or aircraft, got {track_type:?}"
                )));
            }
        }

        Ok(TrackQuery {
            range,
            kit_ids: split_kit_ids(self.kit_id.as_deref()),
            rid_make: self.rid_make.clone(),
            track_type: self.track_type.clone(),
            limit: clamp_limit(self.limit, default_limit)?,
            deduplicate: self.deduplicate.unwrap_or(true),
        })
    }
}

/// Parameters of `/api/signals`.
#[derive(Debug, Clone, Deserialize)]
pub struct SignalParams {
    #[serde(default = "default_time_range")]
    pub time_range: String,
    pub kit_id: Option<String>,
    pub detection_type: Option<String>,
    pub limit: Option<i64>,
}

impl SignalParams {
    pub fn to_query(&self) -> Result<SignalQuery, ApiError> {
        let range = TimeRange::parse(&self.time_range, Utc::now())?;

        if let Some(detection_type) = self.detection_type.as_deref() {
            if detection_type != "analog" && detection_type != "dji" {
                return Err(ApiError::bad_request(format!(
                    "Invalid parameter 'detection_type': expected analog or dji, got {detection_type:?}"
                )));
            }
        }

        Ok(SignalQuery {
            range,
            kit_ids: split_kit_ids(self.kit_id.as_deref()),
            detection_type: self.detection_type.clone(),
            limit: clamp_limit(self.limit, 1000)?,
        })
    }
}

/// Comma-separated kit list to a vector; empty means no filter.
pub fn split_kit_ids(kit_id: Option<&str>) -> Option<Vec<String>> {
    let raw = kit_id?;
    let kits: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    (!kits.is_empty()).then_some(kits)
}

/// Bound a requested limit into [1, MAX_LIMIT].
pub fn clamp_limit(limit: Option<i64>, default: i64) -> Result<i64, ApiError> {
    let limit = limit.unwrap_or(default);
    if limit < 1 {
        return Err(ApiError::bad_request(
            "Invalid parameter 'limit': must be at least 1",
        ));
    }
    if limit > MAX_LIMIT {
        return Err(ApiError::bad_request(format!(
            "Invalid parameter 'limit': must be at most {MAX_LIMIT}"
        )));
    }
    Ok(limit)
}

/// Validate an integer parameter into an inclusive range.
pub fn in_range<T: PartialOrd + Copy + std::fmt::Display>(
    field: &str,
    value: T,
    min: T,
    max: T,
) -> Result<T, ApiError> {
    if value < min || value > max {
        return Err(ApiError::bad_request(format!(
            "Invalid parameter '{field}': must be between {min} and {max}"
        )));
    }
    Ok(value)
}
