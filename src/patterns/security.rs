//! Security-focused patterns: loitering, rapid descent, night activity,
//! and the consolidated threat score.

use chrono::{DateTime, Timelike, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use super::Severity;
use crate::geo::haversine_m;
use crate::records::TrackRecord;

// ---------------------------------------------------------------------------
// Loitering

/// A drone that stayed inside the monitored circle.
#[derive(Debug, Clone, Serialize)]
pub struct LoiteringDrone {
    pub drone_id: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub duration_minutes: f64,
    pub observation_count: usize,
    pub avg_distance_m: f64,
    pub threat_level: Severity,
}

/// Threat level from time spent inside the area, minutes.
fn loiter_threat(duration_min: f64) -> Severity {
    if duration_min > 30.0 {
        Severity::Critical
    } else if duration_min > 15.0 {
        Severity::High
    } else if duration_min > 10.0 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Find drones whose positions stayed within `radius_m` of the centre for
/// at least `min_duration_min` minutes.
pub fn detect_loitering(
    tracks: &[TrackRecord],
    center_lat: f64,
    center_lon: f64,
    radius_m: f64,
    min_duration_min: f64,
) -> Vec<LoiteringDrone> {
    let mut results: Vec<LoiteringDrone> = super::by_drone_sorted(tracks)
        .into_iter()
        .filter_map(|(drone_id, rows)| {
            let inside: Vec<(&&TrackRecord, f64)> = rows
                .iter()
                .filter(|t| t.is_drone())
                .filter_map(|t| {
                    let (lat, lon) = t.position()?;
                    let distance = haversine_m(lat, lon, center_lat, center_lon);
                    (distance <= radius_m).then_some((t, distance))
                })
                .collect();

            let first = inside.first()?.0.time;
            let last = inside.last()?.0.time;
            let duration_minutes = (last - first).num_seconds() as f64 / 60.0;
            if duration_minutes < min_duration_min {
                return None;
            }

            let avg_distance_m =
                inside.iter().map(|(_, d)| d).sum::<f64>() / inside.len() as f64;

            Some(LoiteringDrone {
                drone_id: drone_id.to_string(),
                first_seen: first,
                last_seen: last,
                duration_minutes,
                observation_count: inside.len(),
                avg_distance_m,
                threat_level: loiter_threat(duration_minutes),
            })
        })
        .collect();

    results.sort_by(|a, b| {
        b.duration_minutes
            .partial_cmp(&a.duration_minutes)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results
}

// ---------------------------------------------------------------------------
// Rapid descent

/// A descent event between two consecutive samples.
#[derive(Debug, Clone, Serialize)]
pub struct DescentEvent {
    pub drone_id: String,
    pub timestamp: DateTime<Utc>,
    pub from_alt: f64,
    pub to_alt: f64,
    pub descent_m: f64,
    pub duration_seconds: f64,
    pub descent_rate_mps: f64,
    pub horizontal_speed: Option<f64>,
    /// Fast drop while hovering: the payload-drop signature
    pub possible_payload_drop: bool,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub kit_id: String,
}

/// Descent rate above which a hover-drop is flagged, m/s.
const PAYLOAD_DROP_RATE: f64 = 8.0;
/// Horizontal speed below which the drone counts as hovering, m/s.
const PAYLOAD_DROP_HOVER_SPEED: f64 = 5.0;

/// Find descents of at least `min_descent_m` at `min_rate_mps` or faster
/// between consecutive samples of the same drone.
pub fn detect_rapid_descent(
    tracks: &[TrackRecord],
    min_descent_m: f64,
    min_rate_mps: f64,
) -> Vec<DescentEvent> {
    let mut events = Vec::new();

    for (drone_id, rows) in super::by_drone_sorted(tracks) {
        for pair in rows.windows(2) {
            let (prev, curr) = (pair[0], pair[1]);
            if !curr.is_drone() {
                continue;
            }
            let (from_alt, to_alt) = match (prev.alt, curr.alt) {
                (Some(p), Some(c)) => (p, c),
                _ => continue,
            };
            let descent = from_alt - to_alt;
            if descent < min_descent_m {
                continue;
            }
            let secs = (curr.time - prev.time).num_seconds();
            if secs <= 0 {
                continue;
            }
            let rate = descent / secs as f64;
            if rate < min_rate_mps {
                continue;
            }

            let possible_payload_drop = rate > PAYLOAD_DROP_RATE
                && curr.speed.map(|s| s < PAYLOAD_DROP_HOVER_SPEED).unwrap_or(false);

            events.push(DescentEvent {
                drone_id: drone_id.to_string(),
                timestamp: curr.time,
                from_alt,
                to_alt,
                descent_m: descent,
                duration_seconds: secs as f64,
                descent_rate_mps: rate,
                horizontal_speed: curr.speed,
                possible_payload_drop,
                lat: curr.lat,
                lon: curr.lon,
                kit_id: curr.kit_id.clone(),
            });
        }
    }

    events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    events
}

// ---------------------------------------------------------------------------
// Night activity

/// Per-drone aggregation of night-time sightings.
#[derive(Debug, Clone, Serialize)]
pub struct NightActivity {
    pub drone_id: String,
    pub detection_count: usize,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub kit_count: usize,
    pub rid_make: Option<String>,
    pub risk_level: Severity,
}

/// Whether an hour falls in the night window, wrapping past midnight when
/// `night_start > night_end` (e.g. 22..5).
pub fn is_night_hour(hour: u32, night_start: u32, night_end: u32) -> bool {
    if night_start > night_end {
        hour >= night_start || hour <= night_end
    } else {
        hour >= night_start && hour <= night_end
    }
}

/// Risk level from the number of night detections.
fn night_risk(count: usize) -> Severity {
    if count > 10 {
        Severity::Critical
    } else if count > 5 {
        Severity::High
    } else if count > 2 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Aggregate drone activity during night hours.
pub fn detect_night_activity(
    tracks: &[TrackRecord],
    night_start: u32,
    night_end: u32,
) -> Vec<NightActivity> {
    let mut per_drone: BTreeMap<&str, Vec<&TrackRecord>> = BTreeMap::new();
    for track in tracks {
        if track.is_drone() && is_night_hour(track.time.hour(), night_start, night_end) {
            per_drone.entry(track.drone_id.as_str()).or_default().push(track);
        }
    }

    let mut results: Vec<NightActivity> = per_drone
        .into_iter()
        .filter_map(|(drone_id, rows)| {
            let kits: std::collections::BTreeSet<&str> =
                rows.iter().map(|t| t.kit_id.as_str()).collect();
            Some(NightActivity {
                drone_id: drone_id.to_string(),
                detection_count: rows.len(),
                first_seen: rows.iter().map(|t| t.time).min()?,
                last_seen: rows.iter().map(|t| t.time).max()?,
                kit_count: kits.len(),
                rid_make: rows.iter().find_map(|t| t.rid_make.clone()),
                risk_level: night_risk(rows.len()),
            })
        })
        .collect();

    results.sort_by(|a, b| b.detection_count.cmp(&a.detection_count));
    results
}

// ---------------------------------------------------------------------------
// Consolidated security alerts

/// One scored observation.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityAlert {
    pub time: DateTime<Utc>,
    pub drone_id: String,
    pub kit_id: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub alt: Option<f64>,
    pub speed: Option<f64>,
    pub threat_score: u32,
    pub threat_level: Severity,
    pub factors: Vec<String>,
}

/// Parameters for the consolidated threat score.
#[derive(Debug, Clone, Copy)]
pub struct AlertWeights {
    pub rapid_descent_min_m: f64,
    pub rapid_descent_min_rate: f64,
    pub night_start: u32,
    pub night_end: u32,
}

impl Default for AlertWeights {
    fn default() -> Self {
        Self {
            rapid_descent_min_m: 30.0,
            rapid_descent_min_rate: 5.0,
            night_start: 22,
            night_end: 5,
        }
    }
}

/// Score every observation in the window: rapid descent +3, night +2,
/// low-and-slow +2, high-speed +1. Levels: >= 5 critical, >= 3 high,
/// >= 1 medium; unscored observations are dropped.
pub fn security_alerts(tracks: &[TrackRecord], weights: &AlertWeights) -> Vec<SecurityAlert> {
    // Observations that end a qualifying descent, by (drone, time).
    let descent_events = detect_rapid_descent(
        tracks,
        weights.rapid_descent_min_m,
        weights.rapid_descent_min_rate,
    );
    let descents: std::collections::BTreeSet<(&str, DateTime<Utc>)> = descent_events
        .iter()
        .map(|e| (e.drone_id.as_str(), e.timestamp))
        .collect();

    let mut alerts = Vec::new();

    for track in tracks.iter().filter(|t| t.is_drone()) {
        let mut score = 0u32;
        let mut factors = Vec::new();

        if descents.contains(&(track.drone_id.as_str(), track.time)) {
            score += 3;
            factors.push("rapid_descent".to_string());
        }

        if is_night_hour(track.time.hour(), weights.night_start, weights.night_end) {
            score += 2;
            factors.push("night_activity".to_string());
        }

        if let (Some(alt), Some(speed)) = (track.alt, track.speed) {
            if alt < 50.0 && speed > 0.0 && speed < 5.0 {
                score += 2;
                factors.push("low_and_slow".to_string());
            }
        }

        if track.speed.map(|s| s > 25.0).unwrap_or(false) {
            score += 1;
            factors.push("high_speed".to_string());
        }

        if score == 0 {
            continue;
        }

        let threat_level = if score >= 5 {
            Severity::Critical
        } else if score >= 3 {
            Severity::High
        } else {
            Severity::Medium
        };

        alerts.push(SecurityAlert {
            time: track.time,
            drone_id: track.drone_id.clone(),
            kit_id: track.kit_id.clone(),
            lat: track.lat,
            lon: track.lon,
            alt: track.alt,
            speed: track.speed,
            threat_score: score,
            threat_level,
            factors,
        });
    }

    alerts.sort_by(|a, b| b.threat_score.cmp(&a.threat_score).then(b.time.cmp(&a.time)));
    alerts
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, hour, minute, second).unwrap()
    }

    fn track_at(drone: &str, time: DateTime<Utc>, lat: f64, lon: f64) -> TrackRecord {
        let mut t = TrackRecord::new(time, "kit-a", drone);
        t.lat = Some(lat);
        t.lon = Some(lon);
        t
    }

    #[test]
    fn test_loitering_duration_threshold() {
        // 12 minutes inside a 500 m circle.
        let tracks = vec![
            track_at("d1", at(10, 0, 0), 48.2000, 16.3000),
            track_at("d1", at(10, 6, 0), 48.2010, 16.3005),
            track_at("d1", at(10, 12, 0), 48.2005, 16.3010),
        ];

        let results = detect_loitering(&tracks, 48.2, 16.3, 500.0, 5.0);
        assert_eq!(results.len(), 1);
        assert!((results[0].duration_minutes - 12.0).abs() < 1e-9);
        assert_eq!(results[0].observation_count, 3);
        assert_eq!(results[0].threat_level, Severity::Medium);
    }

    #[test]
    fn test_loitering_threat_ladder() {
        assert_eq!(loiter_threat(8.0), Severity::Low);
        assert_eq!(loiter_threat(12.0), Severity::Medium);
        assert_eq!(loiter_threat(20.0), Severity::High);
        assert_eq!(loiter_threat(45.0), Severity::Critical);
    }

    #[test]
    fn test_loitering_outside_radius_ignored() {
        // Roughly 5.5 km from centre.
        let tracks = vec![
            track_at("d1", at(10, 0, 0), 48.25, 16.3),
            track_at("d1", at(10, 20, 0), 48.25, 16.3),
        ];
        assert!(detect_loitering(&tracks, 48.2, 16.3, 500.0, 5.0).is_empty());
    }

    #[test]
    fn test_loitering_brief_pass_not_flagged() {
        let tracks = vec![
            track_at("d1", at(10, 0, 0), 48.2000, 16.3000),
            track_at("d1", at(10, 2, 0), 48.2010, 16.3005),
        ];
        assert!(detect_loitering(&tracks, 48.2, 16.3, 500.0, 5.0).is_empty());
    }

    #[test]
    fn test_rapid_descent_event() {
        let mut first = track_at("d1", at(10, 0, 0), 48.2, 16.3);
        first.alt = Some(150.0);
        let mut second = track_at("d1", at(10, 0, 10), 48.2, 16.3);
        second.alt = Some(80.0);
        second.speed = Some(2.0);

        let events = detect_rapid_descent(&[first, second], 30.0, 5.0);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].descent_m, 70.0);
        assert_eq!(events[0].descent_rate_mps, 7.0);
        // 7 m/s is below the 8 m/s payload-drop rate.
        assert!(!events[0].possible_payload_drop);
    }

    #[test]
    fn test_payload_drop_signature() {
        let mut first = track_at("d1", at(10, 0, 0), 48.2, 16.3);
        first.alt = Some(200.0);
        let mut second = track_at("d1", at(10, 0, 10), 48.2, 16.3);
        second.alt = Some(100.0);
        second.speed = Some(1.5);

        let events = detect_rapid_descent(&[first, second], 30.0, 5.0);
        assert!(events[0].possible_payload_drop);
    }

    #[test]
    fn test_fast_descent_while_moving_not_payload_drop() {
        let mut first = track_at("d1", at(10, 0, 0), 48.2, 16.3);
        first.alt = Some(200.0);
        let mut second = track_at("d1", at(10, 0, 10), 48.2, 16.3);
        second.alt = Some(100.0);
        second.speed = Some(20.0);

        let events = detect_rapid_descent(&[first, second], 30.0, 5.0);
        assert_eq!(events.len(), 1);
        assert!(!events[0].possible_payload_drop);
    }

    #[test]
    fn test_climb_is_not_descent() {
        let mut first = track_at("d1", at(10, 0, 0), 48.2, 16.3);
        first.alt = Some(80.0);
        let mut second = track_at("d1", at(10, 0, 10), 48.2, 16.3);
        second.alt = Some(180.0);
        assert!(detect_rapid_descent(&[first, second], 30.0, 5.0).is_empty());
    }

    #[test]
    fn test_night_hour_wrapping() {
        // 22..5 wraps midnight.
        assert!(is_night_hour(23, 22, 5));
        assert!(is_night_hour(0, 22, 5));
        assert!(is_night_hour(5, 22, 5));
        assert!(!is_night_hour(6, 22, 5));
        assert!(!is_night_hour(12, 22, 5));
        // Non-wrapping window.
        assert!(is_night_hour(2, 1, 4));
        assert!(!is_night_hour(5, 1, 4));
    }

    #[test]
    fn test_night_activity_aggregation() {
        let tracks: Vec<TrackRecord> = (0..4)
            .map(|i| track_at("d1", at(23, i * 10, 0), 48.2, 16.3))
            .collect();

        let results = detect_night_activity(&tracks, 22, 5);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].detection_count, 4);
        assert_eq!(results[0].risk_level, Severity::Medium);
    }

    #[test]
    fn test_daytime_not_night_activity() {
        let tracks = vec![track_at("d1", at(14, 0, 0), 48.2, 16.3)];
        assert!(detect_night_activity(&tracks, 22, 5).is_empty());
    }

    #[test]
    fn test_night_risk_ladder() {
        assert_eq!(night_risk(1), Severity::Low);
        assert_eq!(night_risk(3), Severity::Medium);
        assert_eq!(night_risk(6), Severity::High);
        assert_eq!(night_risk(11), Severity::Critical);
    }

    #[test]
    fn test_security_alert_scoring() {
        // Night observation, low and slow: 2 + 2 = 4, high.
        let mut t = track_at("d1", at(23, 0, 0), 48.2, 16.3);
        t.alt = Some(30.0);
        t.speed = Some(2.0);

        let alerts = security_alerts(&[t], &AlertWeights::default());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].threat_score, 4);
        assert_eq!(alerts[0].threat_level, Severity::High);
        assert!(alerts[0].factors.contains(&"night_activity".to_string()));
        assert!(alerts[0].factors.contains(&"low_and_slow".to_string()));
    }

    #[test]
    fn test_security_alert_critical_combination() {
        // Rapid descent at night: 3 + 2 = 5, critical.
        let mut first = track_at("d1", at(23, 0, 0), 48.2, 16.3);
        first.alt = Some(200.0);
        let mut second = track_at("d1", at(23, 0, 10), 48.2, 16.3);
        second.alt = Some(100.0);

        let alerts = security_alerts(&[first, second], &AlertWeights::default());
        let top = &alerts[0];
        assert_eq!(top.threat_score, 5);
        assert_eq!(top.threat_level, Severity::Critical);
        assert!(top.factors.contains(&"rapid_descent".to_string()));
    }

    #[test]
    fn test_unremarkable_observation_not_alerted() {
        let mut t = track_at("d1", at(14, 0, 0), 48.2, 16.3);
        t.alt = Some(100.0);
        t.speed = Some(10.0);
        assert!(security_alerts(&[t], &AlertWeights::default()).is_empty());
    }

    #[test]
    fn test_high_speed_alone_is_medium() {
        let mut t = track_at("d1", at(14, 0, 0), 48.2, 16.3);
        t.speed = Some(28.0);
        let alerts = security_alerts(&[t], &AlertWeights::default());
        assert_eq!(alerts[0].threat_score, 1);
        assert_eq!(alerts[0].threat_level, Severity::Medium);
    }
}
