// Skywarden - Multi-kit drone surveillance analytics
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Pattern-detection endpoints.
//!
//! Each handler resolves its window, pulls the rows once, and runs the
//! corresponding pure detector from the core crate. Envelopes echo the
//! parameters so a dashboard can label its panels from the response alone.

use axum::extract::{Query, State};
use axum::Json;
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use skywarden::patterns::{anomalies, coordinated, multikit, pilot, repeated, security};
use skywarden::records::TrackRecord;

use crate::error::ApiError;
use crate::params::in_range;
use crate::state::SharedState;

/// Row cap for one pattern window fetch.
const PATTERN_FETCH_LIMIT: i64 = 50_000;

/// Result-list caps, matching the read API's envelope sizes.
const MAX_GROUPS: usize = 100;
const MAX_ANOMALIES: usize = 200;
const MAX_ALERTS: usize = 500;

async fn window_tracks(
    state: &SharedState,
    window: Duration,
) -> Result<Vec<TrackRecord>, ApiError> {
    let end = Utc::now();
    let start = end - window;
    Ok(state
        .repo
        .tracks_in_window(start, end, PATTERN_FETCH_LIMIT)
        .await?)
}

// -- Repeated contacts ------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RepeatedParams {
    #[serde(default = "default_24")]
    pub time_window_hours: i64,
    #[serde(default = "default_min_appearances")]
    pub min_appearances: usize,
}

fn default_24() -> i64 {
    24
}

fn default_min_appearances() -> usize {
    2
}

/// GET /api/patterns/repeated-drones
pub async fn repeated_drones(
    State(state): State<SharedState>,
    Query(params): Query<RepeatedParams>,
) -> Result<Json<Value>, ApiError> {
    let hours = in_range("time_window_hours", params.time_window_hours, 1, 168)?;
    let min_appearances = in_range("min_appearances", params.min_appearances, 2, 1000)?;

    let tracks = window_tracks(&state, Duration::hours(hours)).await?;
    let mut results = repeated::repeated_contacts(&tracks, min_appearances);
    results.truncate(MAX_GROUPS);

    Ok(Json(json!({
        "repeated_drones": results,
        "count": results.len(),
        "time_window_hours": hours,
        "min_appearances": min_appearances,
    })))
}

// -- Coordinated activity ---------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CoordinatedParams {
    #[serde(default = "default_60")]
    pub time_window_minutes: i64,
    #[serde(default = "default_distance")]
    pub distance_threshold_m: f64,
}

fn default_60() -> i64 {
    60
}

fn default_distance() -> f64 {
    500.0
}

/// GET /api/patterns/coordinated
pub async fn coordinated(
    State(state): State<SharedState>,
    Query(params): Query<CoordinatedParams>,
) -> Result<Json<Value>, ApiError> {
    let minutes = in_range("time_window_minutes", params.time_window_minutes, 1, 1440)?;
    let distance = in_range("distance_threshold_m", params.distance_threshold_m, 10.0, 100_000.0)?;

    let tracks = window_tracks(&state, Duration::minutes(minutes)).await?;
    let mut groups = coordinated::coordinated_groups(&tracks, distance, minutes * 60);
    groups.truncate(MAX_GROUPS);

    Ok(Json(json!({
        "coordinated_groups": groups,
        "count": groups.len(),
        "time_window_minutes": minutes,
        "distance_threshold_m": distance,
    })))
}

// -- Pilot reuse ------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct PilotReuseParams {
    #[serde(default = "default_24")]
    pub time_window_hours: i64,
    #[serde(default = "default_proximity")]
    pub proximity_threshold_m: f64,
}

fn default_proximity() -> f64 {
    50.0
}

/// GET /api/patterns/pilot-reuse
pub async fn pilot_reuse(
    State(state): State<SharedState>,
    Query(params): Query<PilotReuseParams>,
) -> Result<Json<Value>, ApiError> {
    let hours = in_range("time_window_hours", params.time_window_hours, 1, 168)?;
    let proximity = in_range("proximity_threshold_m", params.proximity_threshold_m, 10.0, 10_000.0)?;

    let tracks = window_tracks(&state, Duration::hours(hours)).await?;
    let mut results = pilot::pilot_reuse(&tracks, proximity);
    results.truncate(MAX_GROUPS);

    Ok(Json(json!({
        "pilot_reuse": results,
        "count": results.len(),
        "time_window_hours": hours,
        "proximity_threshold_m": proximity,
    })))
}

// -- Anomalies --------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct AnomalyParams {
    #[serde(default = "default_1")]
    pub time_window_hours: i64,
}

fn default_1() -> i64 {
    1
}

/// GET /api/patterns/anomalies
pub async fn anomalies(
    State(state): State<SharedState>,
    Query(params): Query<AnomalyParams>,
) -> Result<Json<Value>, ApiError> {
    let hours = in_range("time_window_hours", params.time_window_hours, 1, 24)?;

    let tracks = window_tracks(&state, Duration::hours(hours)).await?;
    let mut results = anomalies::detect_anomalies(&tracks);
    results.truncate(MAX_ANOMALIES);

    Ok(Json(json!({
        "anomalies": results,
        "count": results.len(),
        "time_window_hours": hours,
    })))
}

// -- Multi-kit correlation --------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct MultiKitParams {
    #[serde(default = "default_15")]
    pub time_window_minutes: i64,
}

fn default_15() -> i64 {
    15
}

/// GET /api/patterns/multi-kit
pub async fn multi_kit(
    State(state): State<SharedState>,
    Query(params): Query<MultiKitParams>,
) -> Result<Json<Value>, ApiError> {
    let minutes = in_range("time_window_minutes", params.time_window_minutes, 1, 10_080)?;

    let tracks = window_tracks(&state, Duration::minutes(minutes)).await?;
    let mut results = multikit::multi_kit_detections(&tracks);
    results.truncate(MAX_GROUPS);

    Ok(Json(json!({
        "multi_kit_detections": results,
        "count": results.len(),
        "time_window_minutes": minutes,
    })))
}

// -- Security alerts --------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SecurityAlertParams {
    #[serde(default = "default_4")]
    pub time_window_hours: i64,
}

fn default_4() -> i64 {
    4
}

/// GET /api/patterns/security-alerts
pub async fn security_alerts(
    State(state): State<SharedState>,
    Query(params): Query<SecurityAlertParams>,
) -> Result<Json<Value>, ApiError> {
    let hours = in_range("time_window_hours", params.time_window_hours, 1, 24)?;

    let tracks = window_tracks(&state, Duration::hours(hours)).await?;
    let mut alerts = security::security_alerts(&tracks, &security::AlertWeights::default());
    alerts.truncate(MAX_ALERTS);

    let mut threat_summary = json!({ "critical": 0, "high": 0, "medium": 0, "low": 0 });
    for alert in &alerts {
        let level = alert.threat_level.as_str();
        threat_summary[level] = json!(threat_summary[level].as_u64().unwrap_or(0) + 1);
    }

    Ok(Json(json!({
        "alerts": alerts,
        "count": alerts.len(),
        "time_window_hours": hours,
        "threat_summary": threat_summary,
    })))
}

// -- Loitering --------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct LoiteringParams {
    pub lat: f64,
    pub lon: f64,
    #[serde(default = "default_radius")]
    pub radius_m: f64,
    #[serde(default = "default_5")]
    pub min_duration_minutes: i64,
    #[serde(default = "default_24")]
    pub time_window_hours: i64,
}

fn default_radius() -> f64 {
    500.0
}

fn default_5() -> i64 {
    5
}

/// GET /api/patterns/loitering
pub async fn loitering(
    State(state): State<SharedState>,
    Query(params): Query<LoiteringParams>,
) -> Result<Json<Value>, ApiError> {
    if !(-90.0..=90.0).contains(&params.lat) || !(-180.0..=180.0).contains(&params.lon) {
        return Err(ApiError::bad_request(
            "Invalid parameter 'lat'/'lon': not a WGS84 coordinate",
        ));
    }
    let radius = in_range("radius_m", params.radius_m, 50.0, 5000.0)?;
    let min_duration = in_range("min_duration_minutes", params.min_duration_minutes, 1, 120)?;
    let hours = in_range("time_window_hours", params.time_window_hours, 1, 168)?;

    let tracks = window_tracks(&state, Duration::hours(hours)).await?;
    let results = security::detect_loitering(
        &tracks,
        params.lat,
        params.lon,
        radius,
        min_duration as f64,
    );

    Ok(Json(json!({
        "loitering_drones": results,
        "count": results.len(),
        "search_area": {
            "center_lat": params.lat,
            "center_lon": params.lon,
            "radius_m": radius,
        },
        "parameters": {
            "min_duration_minutes": min_duration,
            "time_window_hours": hours,
        },
    })))
}

// -- Rapid descent ----------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RapidDescentParams {
    #[serde(default = "default_60")]
    pub time_window_minutes: i64,
    #[serde(default = "default_rate")]
    pub min_descent_rate_mps: f64,
    #[serde(default = "default_descent")]
    pub min_descent_m: f64,
}

fn default_rate() -> f64 {
    5.0
}

fn default_descent() -> f64 {
    30.0
}

/// GET /api/patterns/rapid-descent
pub async fn rapid_descent(
    State(state): State<SharedState>,
    Query(params): Query<RapidDescentParams>,
) -> Result<Json<Value>, ApiError> {
    let minutes = in_range("time_window_minutes", params.time_window_minutes, 5, 1440)?;
    let min_rate = in_range("min_descent_rate_mps", params.min_descent_rate_mps, 1.0, 50.0)?;
    let min_descent = in_range("min_descent_m", params.min_descent_m, 10.0, 500.0)?;

    let tracks = window_tracks(&state, Duration::minutes(minutes)).await?;
    let events = security::detect_rapid_descent(&tracks, min_descent, min_rate);
    let payload_drops = events.iter().filter(|e| e.possible_payload_drop).count();

    Ok(Json(json!({
        "descent_events": events,
        "count": events.len(),
        "possible_payload_drops": payload_drops,
        "parameters": {
            "time_window_minutes": minutes,
            "min_descent_rate_mps": min_rate,
            "min_descent_m": min_descent,
        },
    })))
}

// -- Night activity ---------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct NightActivityParams {
    #[serde(default = "default_24")]
    pub time_window_hours: i64,
    #[serde(default = "default_night_start")]
    pub night_start_hour: u32,
    #[serde(default = "default_night_end")]
    pub night_end_hour: u32,
}

fn default_night_start() -> u32 {
    22
}

fn default_night_end() -> u32 {
    5
}

/// GET /api/patterns/night-activity
pub async fn night_activity(
    State(state): State<SharedState>,
    Query(params): Query<NightActivityParams>,
) -> Result<Json<Value>, ApiError> {
    let hours = in_range("time_window_hours", params.time_window_hours, 1, 168)?;
    let night_start = in_range("night_start_hour", params.night_start_hour, 0, 23)?;
    let night_end = in_range("night_end_hour", params.night_end_hour, 0, 23)?;

    let tracks = window_tracks(&state, Duration::hours(hours)).await?;
    let results = security::detect_night_activity(&tracks, night_start, night_end);

    let mut risk_summary = json!({ "critical": 0, "high": 0, "medium": 0, "low": 0 });
    for drone in &results {
        let level = drone.risk_level.as_str();
        risk_summary[level] = json!(risk_summary[level].as_u64().unwrap_or(0) + 1);
    }

    Ok(Json(json!({
        "night_activity": results,
        "count": results.len(),
        "risk_summary": risk_summary,
        "parameters": {
            "time_window_hours": hours,
            "night_start_hour": night_start,
            "night_end_hour": night_end,
        },
    })))
}
