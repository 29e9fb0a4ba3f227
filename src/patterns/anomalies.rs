//! Kinematic anomalies: speed, altitude, and climb-rate outliers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

use super::Severity;
use crate::records::TrackRecord;

/// One flagged observation.
#[derive(Debug, Clone, Serialize)]
pub struct Anomaly {
    /// "speed", "altitude", or "rapid_altitude_change"
    pub anomaly_type: String,
    pub severity: Severity,
    pub drone_id: String,
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Speed thresholds in m/s.
const SPEED_MEDIUM: f64 = 30.0;
const SPEED_HIGH: f64 = 40.0;
const SPEED_CRITICAL: f64 = 50.0;

/// Altitude thresholds in meters, drones only.
const ALT_MEDIUM: f64 = 400.0;
const ALT_HIGH: f64 = 450.0;
const ALT_CRITICAL: f64 = 500.0;

/// Climb/descent rate thresholds in m/s, sustained over at least this gap.
const RATE_MEDIUM: f64 = 5.0;
const RATE_HIGH: f64 = 7.5;
const RATE_CRITICAL: f64 = 10.0;
const RATE_MIN_GAP_SECS: i64 = 10;

/// Detect anomalous drone behaviour in the window.
///
/// Ordered by timestamp descending, then severity descending.
pub fn detect_anomalies(tracks: &[TrackRecord]) -> Vec<Anomaly> {
    let mut anomalies = Vec::new();

    for track in tracks.iter().filter(|t| t.is_drone()) {
        if let Some(speed) = track.speed {
            if speed > SPEED_MEDIUM {
                let severity = if speed > SPEED_CRITICAL {
                    Severity::Critical
                } else if speed > SPEED_HIGH {
                    Severity::High
                } else {
                    Severity::Medium
                };
                anomalies.push(Anomaly {
                    anomaly_type: "speed".to_string(),
                    severity,
                    drone_id: track.drone_id.clone(),
                    details: json!({
                        "speed_ms": speed,
                        "lat": track.lat,
                        "lon": track.lon,
                        "kit_id": track.kit_id,
                        "rid_make": track.rid_make,
                    }),
                    timestamp: track.time,
                });
            }
        }

        if let Some(alt) = track.alt {
            if alt > ALT_MEDIUM {
                let severity = if alt > ALT_CRITICAL {
                    Severity::Critical
                } else if alt > ALT_HIGH {
                    Severity::High
                } else {
                    Severity::Medium
                };
                anomalies.push(Anomaly {
                    anomaly_type: "altitude".to_string(),
                    severity,
                    drone_id: track.drone_id.clone(),
                    details: json!({
                        "altitude_m": alt,
                        "lat": track.lat,
                        "lon": track.lon,
                        "kit_id": track.kit_id,
                        "rid_make": track.rid_make,
                    }),
                    timestamp: track.time,
                });
            }
        }
    }

    anomalies.extend(rapid_altitude_changes(tracks));

    anomalies.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.severity.cmp(&a.severity)));
    anomalies
}

/// Altitude rate between consecutive samples of the same drone.
fn rapid_altitude_changes(tracks: &[TrackRecord]) -> Vec<Anomaly> {
    let mut anomalies = Vec::new();

    let mut by_drone: std::collections::BTreeMap<&str, Vec<&TrackRecord>> =
        std::collections::BTreeMap::new();
    for track in tracks.iter().filter(|t| t.is_drone()) {
        by_drone.entry(track.drone_id.as_str()).or_default().push(track);
    }
    for rows in by_drone.values_mut() {
        rows.sort_by_key(|t| t.time);
    }

    for rows in by_drone.values() {
        for pair in rows.windows(2) {
            let (prev, curr) = (pair[0], pair[1]);
            let (prev_alt, alt) = match (prev.alt, curr.alt) {
                (Some(p), Some(c)) => (p, c),
                _ => continue,
            };
            let gap_secs = (curr.time - prev.time).num_seconds();
            if gap_secs < RATE_MIN_GAP_SECS {
                continue;
            }
            let rate = (alt - prev_alt).abs() / gap_secs as f64;
            if rate < RATE_MEDIUM {
                continue;
            }
            let severity = if rate >= RATE_CRITICAL {
                Severity::Critical
            } else if rate >= RATE_HIGH {
                Severity::High
            } else {
                Severity::Medium
            };
            anomalies.push(Anomaly {
                anomaly_type: "rapid_altitude_change".to_string(),
                severity,
                drone_id: curr.drone_id.clone(),
                details: json!({
                    "altitude_change_m": (alt - prev_alt).abs(),
                    "time_diff_seconds": gap_secs,
                    "rate_mps": rate,
                    "from_alt": prev_alt,
                    "to_alt": alt,
                    "lat": curr.lat,
                    "lon": curr.lon,
                    "kit_id": curr.kit_id,
                }),
                timestamp: curr.time,
            });
        }
    }

    anomalies
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn track(drone: &str, second: i64) -> TrackRecord {
        let time = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap()
            + chrono::Duration::seconds(second);
        TrackRecord::new(time, "kit-a", drone)
    }

    #[test]
    fn test_speed_severity_ladder() {
        for (speed, expected) in [
            (25.0, None),
            (35.0, Some(Severity::Medium)),
            (45.0, Some(Severity::High)),
            (55.0, Some(Severity::Critical)),
        ] {
            let mut t = track("d1", 0);
            t.speed = Some(speed);
            let anomalies = detect_anomalies(&[t]);
            match expected {
                None => assert!(anomalies.is_empty(), "speed {speed} should not flag"),
                Some(severity) => {
                    assert_eq!(anomalies.len(), 1);
                    assert_eq!(anomalies[0].anomaly_type, "speed");
                    assert_eq!(anomalies[0].severity, severity);
                }
            }
        }
    }

    #[test]
    fn test_altitude_severity_ladder() {
        for (alt, expected) in [
            (350.0, None),
            (420.0, Some(Severity::Medium)),
            (470.0, Some(Severity::High)),
            (600.0, Some(Severity::Critical)),
        ] {
            let mut t = track("d1", 0);
            t.alt = Some(alt);
            let anomalies = detect_anomalies(&[t]);
            match expected {
                None => assert!(anomalies.is_empty(), "alt {alt} should not flag"),
                Some(severity) => {
                    assert_eq!(anomalies[0].anomaly_type, "altitude");
                    assert_eq!(anomalies[0].severity, severity);
                }
            }
        }
    }

    #[test]
    fn test_aircraft_altitude_not_flagged() {
        let mut t = track("a1", 0);
        t.track_type = "aircraft".to_string();
        t.alt = Some(11_000.0);
        t.speed = Some(230.0);
        assert!(detect_anomalies(&[t]).is_empty());
    }

    #[test]
    fn test_rapid_altitude_change() {
        let mut first = track("d1", 0);
        first.alt = Some(300.0);
        let mut second = track("d1", 20);
        // 120 m in 20 s: 6 m/s, medium.
        second.alt = Some(180.0);

        let anomalies = detect_anomalies(&[first, second]);
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].anomaly_type, "rapid_altitude_change");
        assert_eq!(anomalies[0].severity, Severity::Medium);
        assert_eq!(anomalies[0].details["time_diff_seconds"], 20);
    }

    #[test]
    fn test_rapid_change_rate_ladder() {
        for (delta, expected) in [
            (40.0, None),                      // 4 m/s over 10 s
            (60.0, Some(Severity::Medium)),    // 6 m/s
            (80.0, Some(Severity::High)),      // 8 m/s
            (110.0, Some(Severity::Critical)), // 11 m/s
        ] {
            let mut first = track("d1", 0);
            first.alt = Some(100.0);
            let mut second = track("d1", 10);
            second.alt = Some(100.0 + delta);

            let anomalies = detect_anomalies(&[first, second]);
            match expected {
                None => assert!(anomalies.is_empty(), "delta {delta} should not flag"),
                Some(severity) => {
                    assert_eq!(anomalies.len(), 1, "delta {delta}");
                    assert_eq!(anomalies[0].severity, severity);
                }
            }
        }
    }

    #[test]
    fn test_short_gap_not_rated() {
        // Huge change but the samples are only 2 s apart; below the
        // minimum gap the rate is not computed.
        let mut first = track("d1", 0);
        first.alt = Some(100.0);
        let mut second = track("d1", 2);
        second.alt = Some(300.0);
        assert!(detect_anomalies(&[first, second]).is_empty());
    }

    #[test]
    fn test_ordering_newest_first() {
        let mut old = track("d1", 0);
        old.speed = Some(35.0);
        let mut newer = track("d2", 100);
        newer.speed = Some(35.0);

        let anomalies = detect_anomalies(&[old, newer]);
        assert_eq!(anomalies[0].drone_id, "d2");
        assert_eq!(anomalies[1].drone_id, "d1");
    }
}
