// Skywarden - Multi-kit drone surveillance analytics
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! RSSI location estimation and spoofing detection endpoint.
//!
//! Pulls the target drone's sightings around a timestamp, resolves each
//! observing kit's own position from its health telemetry, and runs the
//! core estimator. When the drone also reported GPS, the disagreement
//! feeds the spoofing score.

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;

use skywarden::estimate::{Estimator, Observation};
use skywarden::geo::haversine_m;
use skywarden::pathloss::PathLoss;
use skywarden::records::TrackRecord;

use crate::error::ApiError;
use crate::params::in_range;
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct EstimateParams {
    /// ISO timestamp to centre the window on; default now
    pub timestamp: Option<String>,
    #[serde(default = "default_window")]
    pub time_window_seconds: i64,
    /// Per-request path-loss overrides
    pub tx_power_dbm: Option<f64>,
    pub path_loss_exponent: Option<f64>,
}

fn default_window() -> i64 {
    30
}

/// GET /api/analysis/estimate-location/{drone_id}
pub async fn estimate_location(
    State(state): State<SharedState>,
    Path(drone_id): Path<String>,
    Query(params): Query<EstimateParams>,
) -> Result<Json<Value>, ApiError> {
    let window = in_range("time_window_seconds", params.time_window_seconds, 5, 300)?;
    let target = match &params.timestamp {
        Some(raw) => parse_timestamp(raw)?,
        None => Utc::now(),
    };
    let start = target - Duration::seconds(window);
    let end = target + Duration::seconds(window);

    let rows = state.repo.drone_observations(&drone_id, start, end).await?;
    if rows.is_empty() {
        return Err(ApiError::not_found(format!(
            "No observations found for drone {drone_id} in time window"
        )));
    }

    // Best (strongest) sighting with a numeric RSSI per kit.
    let mut best_per_kit: BTreeMap<&str, &TrackRecord> = BTreeMap::new();
    for row in rows.iter().filter(|row| row.rssi.is_some()) {
        best_per_kit
            .entry(row.kit_id.as_str())
            .and_modify(|existing| {
                if row.rssi > existing.rssi {
                    *existing = row;
                }
            })
            .or_insert(row);
    }
    if best_per_kit.is_empty() {
        return Err(ApiError::bad_request(
            "No kit observations with RSSI data available",
        ));
    }

    // Resolve each kit's own position from its health telemetry.
    let mut observations = Vec::new();
    for (kit_id, row) in &best_per_kit {
        let position = state
            .repo
            .kit_position_near(kit_id, target, start, end)
            .await?;
        if let Some((kit_lat, kit_lon)) = position {
            observations.push(Observation {
                kit_id: (*kit_id).to_string(),
                kit_lat,
                kit_lon,
                rssi: row.rssi,
                freq: row.freq,
            });
        }
    }
    if observations.is_empty() {
        return Err(ApiError::bad_request(
            "No kit position data available. Ensure kits report GPS in system health.",
        ));
    }

    let pathloss = PathLoss {
        tx_power_dbm: params.tx_power_dbm.unwrap_or(state.pathloss.tx_power_dbm),
        exponent: params.path_loss_exponent.unwrap_or(state.pathloss.exponent),
    };
    let estimator = Estimator::new(pathloss);
    let estimate = estimator.estimate(&observations).map_err(ApiError::from)?;

    // Reported position from the sighting closest to the target time.
    let actual = rows
        .iter()
        .filter(|row| row.position().is_some())
        .min_by_key(|row| (row.time - target).num_seconds().abs())
        .and_then(|row| row.position());

    let error_meters = actual.map(|(lat, lon)| {
        let error = haversine_m(estimate.lat, estimate.lon, lat, lon);
        (error * 10.0).round() / 10.0
    });
    let spoofing = error_meters
        .map(|error| estimator.assess_spoofing(error, estimate.confidence_radius_m));

    Ok(Json(json!({
        "drone_id": drone_id,
        "timestamp": target,
        "algorithm": estimate.algorithm,
        "observations": observations,
        "estimated_distances": estimate.distances,
        "estimated": { "lat": estimate.lat, "lon": estimate.lon },
        "actual": actual.map(|(lat, lon)| json!({ "lat": lat, "lon": lon })),
        "error_meters": error_meters,
        "confidence_radius_m": estimate.confidence_radius_m,
        "spoofing_score": spoofing.as_ref().map(|s| s.score),
        "spoofing_suspected": spoofing.as_ref().map(|s| s.suspected),
        "spoofing_reason": spoofing.as_ref().and_then(|s| s.reason.clone()),
    })))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ApiError> {
    let normalised = raw.replace('Z', "+00:00");
    DateTime::parse_from_rfc3339(&normalised)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| ApiError::bad_request("Invalid timestamp format. Use ISO 8601."))
}
