//! Bus payload normalisation.
//!
//! Kits publish broadcast-friendly field names over the bus that differ
//! from the HTTP schema (`latitude`/`hae` instead of `lat`/`alt`, raw
//! totals instead of percentages, seconds instead of hours). This module
//! applies the deterministic remap so both ingest paths hand identical
//! record shapes to the writer. When a payload carries both conventions the
//! internal name wins.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::records::{HealthRecord, SignalRecord, TrackRecord};

/// Pull the first present field as f64; numbers and numeric strings both
/// count, anything else is treated as absent.
pub fn f64_field(payload: &Value, names: &[&str]) -> Option<f64> {
    names.iter().find_map(|name| match payload.get(name) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) if !s.is_empty() => s.parse().ok(),
        _ => None,
    })
}

/// Pull the first present field as i64.
pub fn i64_field(payload: &Value, names: &[&str]) -> Option<i64> {
    f64_field(payload, names).map(|v| v as i64)
}

/// Pull the first present non-empty string field.
pub fn str_field(payload: &Value, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| match payload.get(name) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    })
}

/// Pull the first present field as bool; accepts booleans and 0/1.
pub fn bool_field(payload: &Value, names: &[&str]) -> Option<bool> {
    names.iter().find_map(|name| match payload.get(name) {
        Some(Value::Bool(b)) => Some(*b),
        Some(Value::Number(n)) => n.as_i64().map(|v| v != 0),
        _ => None,
    })
}

/// Parse a message timestamp: ISO-8601 strings (with or without a trailing
/// `Z`) and numeric epoch seconds are accepted; anything else falls back to
/// the provided receive time.
pub fn parse_timestamp(value: Option<&Value>, fallback: DateTime<Utc>) -> DateTime<Utc> {
    match value {
        Some(Value::String(s)) => {
            let normalised = s.replace('Z', "+00:00");
            DateTime::parse_from_rfc3339(&normalised)
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or(fallback)
        }
        Some(Value::Number(n)) => n
            .as_f64()
            .and_then(|secs| Utc.timestamp_opt(secs as i64, 0).single())
            .unwrap_or(fallback),
        _ => fallback,
    }
}

/// Kit attribution for a bus message. Track and signal payloads carry
/// `seen_by`; system payloads carry `id` or `uid`.
pub fn extract_kit_id(payload: &Value) -> Option<String> {
    str_field(payload, &["seen_by", "kit_id", "id", "uid"])
}

/// Split an aggregate payload into items: a bare array, a wrapper object
/// `{key: [...]}`, or a single object all work.
pub fn payload_items<'a>(payload: &'a Value, key: &str) -> Vec<&'a Value> {
    match payload {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => match map.get(key) {
            Some(Value::Array(items)) => items.iter().collect(),
            _ => vec![payload],
        },
        _ => Vec::new(),
    }
}

/// Normalise one drone payload into a track record.
pub fn drone_from_json(kit_id: &str, payload: &Value, received_at: DateTime<Utc>) -> TrackRecord {
    let time = parse_timestamp(payload.get("timestamp"), received_at);
    let drone_id = str_field(payload, &["id", "drone_id", "mac"])
        .unwrap_or_else(|| "unknown".to_string());

    let mut track = TrackRecord::new(time, kit_id, drone_id);
    track.lat = f64_field(payload, &["lat", "latitude"]);
    track.lon = f64_field(payload, &["lon", "longitude"]);
    track.alt = f64_field(payload, &["alt", "hae"]);
    track.speed = f64_field(payload, &["speed"]);
    track.heading = f64_field(payload, &["heading", "direction"]);
    track.vspeed = f64_field(payload, &["vspeed"]);
    track.height = f64_field(payload, &["height"]);
    track.direction = f64_field(payload, &["direction"]);
    track.op_status = str_field(payload, &["op_status"]);
    track.runtime = i64_field(payload, &["runtime"]);
    track.id_type = str_field(payload, &["id_type"]);
    track.ua_type = str_field(payload, &["ua_type"]);
    track.operator_id = str_field(payload, &["operator_id"]);
    track.caa_id = str_field(payload, &["caa_id"]);
    track.rid_make = str_field(payload, &["rid_make", "make"]);
    track.rid_model = str_field(payload, &["rid_model", "model"]);
    track.rid_source = str_field(payload, &["rid_source", "source"]);
    track.pilot_lat = f64_field(payload, &["pilot_lat"]);
    track.pilot_lon = f64_field(payload, &["pilot_lon"]);
    track.home_lat = f64_field(payload, &["home_lat"]);
    track.home_lon = f64_field(payload, &["home_lon"]);
    track.mac = str_field(payload, &["mac"]);
    track.rssi = i64_field(payload, &["rssi"]).map(|v| v as i32);
    track.freq = f64_field(payload, &["freq"]);
    track.track_type = str_field(payload, &["track_type"]).unwrap_or_else(|| "drone".to_string());
    track
}

/// Normalise one ADS-B aircraft payload. The ICAO hex is the identity; the
/// callsign rides in the `mac` column.
pub fn aircraft_from_json(kit_id: &str, payload: &Value, received_at: DateTime<Utc>) -> TrackRecord {
    let time = parse_timestamp(payload.get("timestamp"), received_at);
    let icao = str_field(payload, &["icao", "hex"]).unwrap_or_else(|| "unknown".to_string());

    let mut track = TrackRecord::new(time, kit_id, icao);
    track.track_type = "aircraft".to_string();
    track.lat = f64_field(payload, &["lat"]);
    track.lon = f64_field(payload, &["lon"]);
    track.alt = f64_field(payload, &["alt", "alt_baro"]);
    track.speed = f64_field(payload, &["speed", "gs"]);
    track.heading = f64_field(payload, &["track", "heading"]);
    track.vspeed = f64_field(payload, &["baro_rate"]);
    track.rssi = i64_field(payload, &["rssi"]).map(|v| v as i32);
    track.mac = str_field(payload, &["callsign", "flight"]).map(|s| s.trim().to_string());
    track
}

/// Normalise one signal payload. Returns `None` when no frequency can be
/// recovered, since the frequency is part of the storage key.
pub fn signal_from_json(
    kit_id: &str,
    payload: &Value,
    received_at: DateTime<Utc>,
) -> Option<SignalRecord> {
    let time = parse_timestamp(
        payload.get("timestamp").or_else(|| payload.get("observed_at")),
        received_at,
    );

    let freq_mhz = f64_field(payload, &["freq_mhz"])
        .or_else(|| f64_field(payload, &["center_hz"]).map(|hz| hz / 1e6))?;

    let bandwidth_mhz = f64_field(payload, &["bandwidth_hz"])
        .map(|hz| hz / 1e6)
        .or_else(|| f64_field(payload, &["bandwidth_mhz"]));

    Some(SignalRecord {
        time,
        kit_id: kit_id.to_string(),
        freq_mhz,
        power_dbm: f64_field(payload, &["power_dbm"]),
        bandwidth_mhz,
        lat: f64_field(payload, &["sensor_lat", "lat"]),
        lon: f64_field(payload, &["sensor_lon", "lon"]),
        alt: f64_field(payload, &["sensor_alt", "alt"]),
        detection_type: str_field(payload, &["detection_type"])
            .or_else(|| Some("analog".to_string())),
        pal_conf: f64_field(payload, &["pal_conf", "pal"]),
        ntsc_conf: f64_field(payload, &["ntsc_conf", "ntsc"]),
        source: str_field(payload, &["source"]),
        signal_type: str_field(payload, &["signal_type"]),
    })
}

/// Normalise one system health payload, deriving percentages from raw
/// totals where the direct field is absent.
pub fn health_from_json(kit_id: &str, payload: &Value, received_at: DateTime<Utc>) -> HealthRecord {
    let time = parse_timestamp(payload.get("timestamp"), received_at);
    let mut health = HealthRecord::new(time, kit_id);

    health.lat = f64_field(payload, &["lat", "latitude"]);
    health.lon = f64_field(payload, &["lon", "longitude"]);
    health.alt = f64_field(payload, &["alt", "hae"]);
    health.cpu_percent = f64_field(payload, &["cpu_percent", "cpu_usage"]);

    health.memory_percent = f64_field(payload, &["memory_percent"]).or_else(|| {
        let total = f64_field(payload, &["memory_total_mb", "memory_total"])?;
        let avail = f64_field(payload, &["memory_available_mb", "memory_available"])?;
        (total > 0.0).then(|| (total - avail) / total * 100.0)
    });

    health.disk_percent = f64_field(payload, &["disk_percent"]).or_else(|| {
        let total = f64_field(payload, &["disk_total_mb", "disk_total"])?;
        let used = f64_field(payload, &["disk_used_mb", "disk_used"])?;
        (total > 0.0).then(|| used / total * 100.0)
    });

    health.uptime_hours = f64_field(payload, &["uptime_hours"])
        .or_else(|| f64_field(payload, &["uptime_s", "uptime"]).map(|s| s / 3600.0));

    health.temp_cpu = f64_field(payload, &["temp_cpu", "temperature_c", "temperature"]);
    health.temp_gpu = f64_field(payload, &["temp_gpu"]);
    health.pluto_temp = f64_field(payload, &["pluto_temp_c", "pluto_temp"]);
    health.zynq_temp = f64_field(payload, &["zynq_temp_c", "zynq_temp"]);
    health.speed = f64_field(payload, &["speed"]);
    health.track = f64_field(payload, &["track"]);
    health.gps_fix = bool_field(payload, &["gps_fix"]);

    health
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_timestamp_iso() {
        let value = json!("2025-06-01T10:30:00Z");
        let parsed = parse_timestamp(Some(&value), now());
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 6, 1, 10, 30, 0).unwrap());
    }

    #[test]
    fn test_parse_timestamp_epoch() {
        let value = json!(1748779200);
        let parsed = parse_timestamp(Some(&value), now());
        assert_eq!(parsed.timestamp(), 1748779200);
    }

    #[test]
    fn test_parse_timestamp_garbage_falls_back() {
        assert_eq!(parse_timestamp(Some(&json!("not a time")), now()), now());
        assert_eq!(parse_timestamp(None, now()), now());
    }

    #[test]
    fn test_extract_kit_id_priority() {
        assert_eq!(
            extract_kit_id(&json!({"seen_by": "kit-a", "id": "drone-1"})),
            Some("kit-a".to_string())
        );
        assert_eq!(
            extract_kit_id(&json!({"id": "wardragon-7"})),
            Some("wardragon-7".to_string())
        );
        assert_eq!(extract_kit_id(&json!({"lat": 1.0})), None);
    }

    #[test]
    fn test_payload_items_shapes() {
        let bare = json!({"id": "d1"});
        assert_eq!(payload_items(&bare, "drones").len(), 1);

        let array = json!([{"id": "d1"}, {"id": "d2"}]);
        assert_eq!(payload_items(&array, "drones").len(), 2);

        let wrapped = json!({"drones": [{"id": "d1"}, {"id": "d2"}, {"id": "d3"}]});
        assert_eq!(payload_items(&wrapped, "drones").len(), 3);

        assert!(payload_items(&json!("nope"), "drones").is_empty());
    }

    #[test]
    fn test_drone_prefers_internal_names() {
        // Both conventions present: lat/lon/alt win over latitude/longitude/hae.
        let payload = json!({
            "id": "drone-1",
            "lat": 48.2, "latitude": 99.0,
            "lon": 16.3, "longitude": 99.0,
            "alt": 120.0, "hae": 99.0,
            "rid_make": "DJI", "rssi": -62
        });
        let track = drone_from_json("kit-a", &payload, now());
        assert_eq!(track.lat, Some(48.2));
        assert_eq!(track.lon, Some(16.3));
        assert_eq!(track.alt, Some(120.0));
        assert_eq!(track.rid_make.as_deref(), Some("DJI"));
        assert_eq!(track.rssi, Some(-62));
        assert_eq!(track.track_type, "drone");
    }

    #[test]
    fn test_drone_maps_broadcast_names() {
        let payload = json!({
            "id": "drone-1",
            "latitude": 48.2, "longitude": 16.3, "hae": 120.0,
            "make": "Autel", "model": "Evo", "source": "ble"
        });
        let track = drone_from_json("kit-a", &payload, now());
        assert_eq!(track.lat, Some(48.2));
        assert_eq!(track.alt, Some(120.0));
        assert_eq!(track.rid_make.as_deref(), Some("Autel"));
        assert_eq!(track.rid_model.as_deref(), Some("Evo"));
        assert_eq!(track.rid_source.as_deref(), Some("ble"));
    }

    #[test]
    fn test_drone_id_fallback_chain() {
        let track = drone_from_json("kit-a", &json!({"mac": "aa:bb:cc"}), now());
        assert_eq!(track.drone_id, "aa:bb:cc");

        let track = drone_from_json("kit-a", &json!({}), now());
        assert_eq!(track.drone_id, "unknown");
    }

    #[test]
    fn test_aircraft_mapping() {
        let payload = json!({
            "hex": "4cae92",
            "flight": "AUA421 ",
            "lat": 48.1, "lon": 16.5,
            "alt_baro": 11000.0, "gs": 230.0,
            "track": 274.0, "baro_rate": -640.0
        });
        let track = aircraft_from_json("kit-a", &payload, now());
        assert_eq!(track.drone_id, "4cae92");
        assert_eq!(track.track_type, "aircraft");
        assert_eq!(track.mac.as_deref(), Some("AUA421"));
        assert_eq!(track.alt, Some(11000.0));
        assert_eq!(track.speed, Some(230.0));
        assert_eq!(track.heading, Some(274.0));
        assert_eq!(track.vspeed, Some(-640.0));
    }

    #[test]
    fn test_signal_center_hz_conversion() {
        let payload = json!({
            "center_hz": 5_800_000_000.0_f64,
            "bandwidth_hz": 20_000_000.0_f64,
            "power_dbm": -71.5,
            "sensor_lat": 48.2, "sensor_lon": 16.3
        });
        let signal = signal_from_json("kit-a", &payload, now()).unwrap();
        assert!((signal.freq_mhz - 5800.0).abs() < 1e-9);
        assert_eq!(signal.bandwidth_mhz, Some(20.0));
        assert_eq!(signal.lat, Some(48.2));
        assert_eq!(signal.detection_type.as_deref(), Some("analog"));
    }

    #[test]
    fn test_signal_without_frequency_is_dropped() {
        assert!(signal_from_json("kit-a", &json!({"power_dbm": -70.0}), now()).is_none());
    }

    #[test]
    fn test_health_percent_derivation() {
        let payload = json!({
            "latitude": 48.2, "longitude": 16.3, "hae": 200.0,
            "cpu_usage": 37.5,
            "memory_total_mb": 8000.0, "memory_available_mb": 2000.0,
            "disk_total_mb": 100_000.0, "disk_used_mb": 42_000.0,
            "uptime_s": 7200.0,
            "temperature": 55.0,
            "pluto_temp_c": 48.0,
            "gps_fix": 1
        });
        let health = health_from_json("kit-a", &payload, now());
        assert_eq!(health.lat, Some(48.2));
        assert_eq!(health.alt, Some(200.0));
        assert_eq!(health.cpu_percent, Some(37.5));
        assert_eq!(health.memory_percent, Some(75.0));
        assert_eq!(health.disk_percent, Some(42.0));
        assert_eq!(health.uptime_hours, Some(2.0));
        assert_eq!(health.temp_cpu, Some(55.0));
        assert_eq!(health.pluto_temp, Some(48.0));
        assert_eq!(health.gps_fix, Some(true));
    }

    #[test]
    fn test_health_direct_percent_wins() {
        let payload = json!({
            "memory_percent": 50.0,
            "memory_total_mb": 8000.0, "memory_available_mb": 0.0
        });
        let health = health_from_json("kit-a", &payload, now());
        assert_eq!(health.memory_percent, Some(50.0));
    }

    #[test]
    fn test_health_zero_total_skips_derivation() {
        let payload = json!({"memory_total_mb": 0.0, "memory_available_mb": 0.0});
        let health = health_from_json("kit-a", &payload, now());
        assert!(health.memory_percent.is_none());
    }
}
