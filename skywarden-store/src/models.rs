// Skywarden - Multi-kit drone surveillance analytics
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Store-side row types.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A registered kit as stored, with the persisted (supervisor-written)
/// status. The read API re-derives status from `last_seen` before
/// returning it.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Kit {
    pub kit_id: String,
    pub name: Option<String>,
    pub location: Option<String>,
    pub api_url: Option<String>,
    /// "http", "mqtt", or "both"
    pub source: String,
    pub status: String,
    pub enabled: bool,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

/// One point of a drone's flight path polyline.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TrackPoint {
    pub time: DateTime<Utc>,
    pub kit_id: String,
    pub lat: f64,
    pub lon: f64,
    pub alt: Option<f64>,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    pub rssi: Option<i32>,
}

/// Aggregate counts for a track query window.
#[derive(Debug, Clone, Copy, Serialize, sqlx::FromRow)]
pub struct TrackCounts {
    pub total_detections: i64,
    pub unique_drones: i64,
}

/// Per-kit row of the polling overview.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct KitPollStatus {
    pub kit_id: String,
    pub name: Option<String>,
    pub api_url: Option<String>,
    pub status: String,
    pub enabled: bool,
    pub last_seen: Option<DateTime<Utc>>,
}
