// Skywarden - Multi-kit drone surveillance analytics
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Track queries and per-drone flight paths.

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use skywarden::timerange::TimeRange;

use crate::error::ApiError;
use crate::params::{clamp_limit, TrackParams};
use crate::state::SharedState;

/// GET /api/drones
///
/// By default deduplicates to the latest detection per drone id; the raw
/// feed is available with `deduplicate=false`. `count` is unique drones in
/// the window, `total_detections` is raw rows.
pub async fn query_drones(
    State(state): State<SharedState>,
    Query(params): Query<TrackParams>,
) -> Result<Json<Value>, ApiError> {
    let query = params.to_query(1000)?;

    let drones = state.repo.query_tracks(&query).await?;
    let counts = state.repo.track_counts(&query).await?;

    Ok(Json(json!({
        "drones": drones,
        "count": counts.unique_drones,
        "total_detections": counts.total_detections,
        "time_range": {
            "start": query.range.start,
            "end": query.range.end,
        },
    })))
}

#[derive(Debug, Deserialize)]
pub struct DroneTrackParams {
    #[serde(default = "default_time_range")]
    pub time_range: String,
    pub limit: Option<i64>,
}

fn default_time_range() -> String {
    "1h".to_string()
}

/// Track-point limit for the polyline endpoint.
const MAX_TRACK_POINTS: i64 = 2000;

/// GET /api/drones/{id}/track
///
/// Chronological polyline points for one drone.
pub async fn drone_track(
    State(state): State<SharedState>,
    Path(drone_id): Path<String>,
    Query(params): Query<DroneTrackParams>,
) -> Result<Json<Value>, ApiError> {
    let range = TimeRange::parse(&params.time_range, Utc::now())?;
    let limit = clamp_limit(params.limit, 500)?.min(MAX_TRACK_POINTS);

    let track = state.repo.drone_track(&drone_id, &range, limit).await?;

    Ok(Json(json!({
        "drone_id": drone_id,
        "point_count": track.len(),
        "track": track,
        "time_range": {
            "start": range.start,
            "end": range.end,
        },
    })))
}
