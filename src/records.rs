//! Normalised record types
//!
//! Flat structs for the four telemetry streams. Both ingest paths (HTTP
//! collector and bus subscriber) converge on these shapes before anything is
//! written; the persistence writer stores them verbatim and computes nothing.
//!
//! Optional fields are `Option<T>`, never sentinel values. The composite
//! keys mirror the store's primary keys: replaying a batch is a no-op.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a kit's telemetry arrives from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KitSource {
    /// Polled over the kit's HTTP API
    Http,
    /// Pushed over the message bus
    Mqtt,
    /// Both paths observed (hybrid)
    Both,
}

impl KitSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Mqtt => "mqtt",
            Self::Both => "both",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "http" => Some(Self::Http),
            "mqtt" => Some(Self::Mqtt),
            "both" => Some(Self::Both),
            _ => None,
        }
    }

    /// Monotone source lattice: `http ∨ mqtt = both`, and `both` absorbs
    /// everything. Used when a kit is observed on a second ingest path.
    pub fn join(self, other: Self) -> Self {
        if self == other {
            self
        } else {
            Self::Both
        }
    }
}

/// One observation of a drone or aircraft by one kit.
///
/// Key: `(time, kit_id, drone_id)`. The same airframe seen by N kits at one
/// timestamp yields N rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TrackRecord {
    pub time: DateTime<Utc>,
    pub kit_id: String,
    pub drone_id: String,
    // Position
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub alt: Option<f64>,
    // Kinematics
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    pub vspeed: Option<f64>,
    pub height: Option<f64>,
    pub direction: Option<f64>,
    // Operational state
    pub op_status: Option<String>,
    pub runtime: Option<i64>,
    // Remote ID
    pub id_type: Option<String>,
    pub ua_type: Option<String>,
    pub operator_id: Option<String>,
    pub caa_id: Option<String>,
    pub rid_make: Option<String>,
    pub rid_model: Option<String>,
    pub rid_source: Option<String>,
    // Pilot / home positions
    pub pilot_lat: Option<f64>,
    pub pilot_lon: Option<f64>,
    pub home_lat: Option<f64>,
    pub home_lon: Option<f64>,
    // RF metadata
    pub mac: Option<String>,
    pub rssi: Option<i32>,
    pub freq: Option<f64>,
    /// "drone" or "aircraft"
    pub track_type: String,
}

impl TrackRecord {
    /// An empty record for the given key; used by ingest normalisation.
    pub fn new(time: DateTime<Utc>, kit_id: impl Into<String>, drone_id: impl Into<String>) -> Self {
        Self {
            time,
            kit_id: kit_id.into(),
            drone_id: drone_id.into(),
            lat: None,
            lon: None,
            alt: None,
            speed: None,
            heading: None,
            vspeed: None,
            height: None,
            direction: None,
            op_status: None,
            runtime: None,
            id_type: None,
            ua_type: None,
            operator_id: None,
            caa_id: None,
            rid_make: None,
            rid_model: None,
            rid_source: None,
            pilot_lat: None,
            pilot_lon: None,
            home_lat: None,
            home_lon: None,
            mac: None,
            rssi: None,
            freq: None,
            track_type: "drone".to_string(),
        }
    }

    /// Position if reported; (0, 0) counts as not reported.
    pub fn position(&self) -> Option<(f64, f64)> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) if lat != 0.0 || lon != 0.0 => Some((lat, lon)),
            _ => None,
        }
    }

    /// Pilot position if reported.
    pub fn pilot_position(&self) -> Option<(f64, f64)> {
        match (self.pilot_lat, self.pilot_lon) {
            (Some(lat), Some(lon)) if lat != 0.0 || lon != 0.0 => Some((lat, lon)),
            _ => None,
        }
    }

    pub fn is_drone(&self) -> bool {
        self.track_type == "drone"
    }
}

/// One RF signal detection (primarily FPV video) by one kit.
///
/// Key: `(time, kit_id, freq_mhz)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SignalRecord {
    pub time: DateTime<Utc>,
    pub kit_id: String,
    pub freq_mhz: f64,
    pub power_dbm: Option<f64>,
    pub bandwidth_mhz: Option<f64>,
    // Observer position
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub alt: Option<f64>,
    /// "analog" or "dji"
    pub detection_type: Option<String>,
    /// PAL/NTSC video confidence in [0, 1]
    pub pal_conf: Option<f64>,
    pub ntsc_conf: Option<f64>,
    /// Detection stage: "guard" or "confirm"
    pub source: Option<String>,
    pub signal_type: Option<String>,
}

/// One kit health sample.
///
/// Key: `(time, kit_id)`. Carries the kit's own GPS fix, which the location
/// estimator uses as the observer position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct HealthRecord {
    pub time: DateTime<Utc>,
    pub kit_id: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub alt: Option<f64>,
    pub cpu_percent: Option<f64>,
    pub memory_percent: Option<f64>,
    pub disk_percent: Option<f64>,
    pub uptime_hours: Option<f64>,
    pub temp_cpu: Option<f64>,
    pub temp_gpu: Option<f64>,
    // SDR temperatures
    pub pluto_temp: Option<f64>,
    pub zynq_temp: Option<f64>,
    // Kit GPS kinematics
    pub speed: Option<f64>,
    pub track: Option<f64>,
    pub gps_fix: Option<bool>,
}

impl HealthRecord {
    pub fn new(time: DateTime<Utc>, kit_id: impl Into<String>) -> Self {
        Self {
            time,
            kit_id: kit_id.into(),
            lat: None,
            lon: None,
            alt: None,
            cpu_percent: None,
            memory_percent: None,
            disk_percent: None,
            uptime_hours: None,
            temp_cpu: None,
            temp_gpu: None,
            pluto_temp: None,
            zynq_temp: None,
            speed: None,
            track: None,
            gps_fix: None,
        }
    }
}

/// Upsert request for the kits relation.
///
/// `None` fields leave the stored value untouched; provided fields win
/// (last-writer-wins). `source` follows the [`KitSource::join`] lattice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KitUpsert {
    pub kit_id: String,
    pub name: Option<String>,
    pub location: Option<String>,
    pub api_url: Option<String>,
    pub source: KitSource,
    pub enabled: Option<bool>,
}

impl KitUpsert {
    /// Auto-registration shape for a kit first seen on the bus.
    pub fn from_bus(kit_id: impl Into<String>) -> Self {
        let kit_id = kit_id.into();
        Self {
            name: Some(kit_id.clone()),
            kit_id,
            location: None,
            api_url: None,
            source: KitSource::Mqtt,
            enabled: Some(true),
        }
    }
}
