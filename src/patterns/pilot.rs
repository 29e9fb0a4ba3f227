//! Pilot reuse: one operator flying multiple distinct airframes.
//!
//! Two correlation methods, union-ed: exact Remote-ID operator id matches,
//! and spatial clustering of reported pilot positions for drones that did
//! not broadcast an operator id.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::geo::haversine_m;
use crate::records::TrackRecord;

/// One drone attributed to a pilot.
#[derive(Debug, Clone, Serialize)]
pub struct PilotDrone {
    pub drone_id: String,
    pub timestamp: DateTime<Utc>,
    pub pilot_lat: Option<f64>,
    pub pilot_lon: Option<f64>,
}

/// A pilot identity with at least two distinct drones.
#[derive(Debug, Clone, Serialize)]
pub struct PilotReuse {
    pub pilot_identifier: String,
    /// "operator_id" or "proximity"
    pub correlation_method: String,
    pub drone_count: usize,
    pub drones: Vec<PilotDrone>,
}

/// Find operators flying multiple drones within the window.
pub fn pilot_reuse(tracks: &[TrackRecord], proximity_threshold_m: f64) -> Vec<PilotReuse> {
    let mut results = operator_id_matches(tracks);
    results.extend(proximity_matches(tracks, proximity_threshold_m));
    results.sort_by(|a, b| b.drone_count.cmp(&a.drone_count));
    results
}

/// Method 1: exact operator_id match across distinct drone ids.
fn operator_id_matches(tracks: &[TrackRecord]) -> Vec<PilotReuse> {
    let mut by_operator: BTreeMap<&str, BTreeMap<&str, &TrackRecord>> = BTreeMap::new();
    for track in tracks {
        let operator = match track.operator_id.as_deref() {
            Some(op) if !op.is_empty() => op,
            _ => continue,
        };
        // Latest sighting per drone under this operator.
        by_operator
            .entry(operator)
            .or_default()
            .entry(track.drone_id.as_str())
            .and_modify(|existing| {
                if track.time > existing.time {
                    *existing = track;
                }
            })
            .or_insert(track);
    }

    by_operator
        .into_iter()
        .filter(|(_, drones)| drones.len() >= 2)
        .map(|(operator, drones)| {
            let mut drones: Vec<PilotDrone> = drones
                .values()
                .map(|t| PilotDrone {
                    drone_id: t.drone_id.clone(),
                    timestamp: t.time,
                    pilot_lat: t.pilot_lat,
                    pilot_lon: t.pilot_lon,
                })
                .collect();
            drones.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
            PilotReuse {
                pilot_identifier: operator.to_string(),
                correlation_method: "operator_id".to_string(),
                drone_count: drones.len(),
                drones,
            }
        })
        .collect()
}

/// Method 2: latest pilot positions within the proximity threshold, for
/// drones with no operator id. Greedy single-link grouping in id order.
fn proximity_matches(tracks: &[TrackRecord], threshold_m: f64) -> Vec<PilotReuse> {
    let mut latest: BTreeMap<&str, &TrackRecord> = BTreeMap::new();
    for track in tracks {
        if track.operator_id.is_some() || track.pilot_position().is_none() {
            continue;
        }
        latest
            .entry(track.drone_id.as_str())
            .and_modify(|existing| {
                if track.time > existing.time {
                    *existing = track;
                }
            })
            .or_insert(track);
    }

    let pilots: Vec<(&str, &TrackRecord)> = latest.into_iter().collect();

    let mut neighbours: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for (i, (id_a, a)) in pilots.iter().enumerate() {
        for (id_b, b) in pilots.iter().skip(i + 1) {
            let (lat_a, lon_a) = match a.pilot_position() {
                Some(p) => p,
                None => continue,
            };
            let (lat_b, lon_b) = match b.pilot_position() {
                Some(p) => p,
                None => continue,
            };
            if haversine_m(lat_a, lon_a, lat_b, lon_b) <= threshold_m {
                neighbours.entry(id_a).or_default().insert(id_b);
                neighbours.entry(id_b).or_default().insert(id_a);
            }
        }
    }

    let by_id: BTreeMap<&str, &TrackRecord> = pilots.iter().copied().collect();
    let mut used: BTreeSet<&str> = BTreeSet::new();
    let mut results = Vec::new();

    for (anchor, paired) in &neighbours {
        if used.contains(anchor) {
            continue;
        }
        let fresh: Vec<&str> = paired.iter().filter(|id| !used.contains(*id)).copied().collect();
        if fresh.is_empty() {
            continue;
        }

        let mut members: Vec<&str> = vec![anchor];
        members.extend(&fresh);
        used.extend(members.iter().copied());

        let mut drones: Vec<PilotDrone> = members
            .iter()
            .filter_map(|id| {
                let track = by_id.get(*id)?;
                Some(PilotDrone {
                    drone_id: (*id).to_string(),
                    timestamp: track.time,
                    pilot_lat: track.pilot_lat,
                    pilot_lon: track.pilot_lon,
                })
            })
            .collect();
        drones.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        // Identity from the mean pilot position, 4 decimal places.
        let (sum_lat, sum_lon) = drones.iter().fold((0.0, 0.0), |(lat, lon), d| {
            (lat + d.pilot_lat.unwrap_or(0.0), lon + d.pilot_lon.unwrap_or(0.0))
        });
        let n = drones.len() as f64;

        results.push(PilotReuse {
            pilot_identifier: format!("PILOT_{:.4}_{:.4}", sum_lat / n, sum_lon / n),
            correlation_method: "proximity".to_string(),
            drone_count: drones.len(),
            drones,
        });
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn track(drone: &str, minute: u32) -> TrackRecord {
        let time = Utc.with_ymd_and_hms(2025, 6, 1, 10, minute, 0).unwrap();
        TrackRecord::new(time, "kit-a", drone)
    }

    fn with_operator(drone: &str, minute: u32, operator: &str) -> TrackRecord {
        let mut t = track(drone, minute);
        t.operator_id = Some(operator.to_string());
        t
    }

    fn with_pilot(drone: &str, minute: u32, lat: f64, lon: f64) -> TrackRecord {
        let mut t = track(drone, minute);
        t.pilot_lat = Some(lat);
        t.pilot_lon = Some(lon);
        t
    }

    #[test]
    fn test_operator_id_match() {
        let tracks = vec![
            with_operator("d1", 0, "OP-1234"),
            with_operator("d2", 5, "OP-1234"),
            with_operator("d3", 10, "OP-9999"),
        ];

        let results = pilot_reuse(&tracks, 50.0);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].pilot_identifier, "OP-1234");
        assert_eq!(results[0].correlation_method, "operator_id");
        assert_eq!(results[0].drone_count, 2);
    }

    #[test]
    fn test_proximity_match() {
        // Pilot positions ~11 m apart.
        let tracks = vec![
            with_pilot("d1", 0, 48.2000, 16.3000),
            with_pilot("d2", 5, 48.2001, 16.3000),
        ];

        let results = pilot_reuse(&tracks, 50.0);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].correlation_method, "proximity");
        assert_eq!(results[0].drone_count, 2);
        assert!(results[0].pilot_identifier.starts_with("PILOT_48.2"));
    }

    #[test]
    fn test_proximity_threshold_respected() {
        // ~556 m apart: no group at a 50 m threshold.
        let tracks = vec![
            with_pilot("d1", 0, 48.2000, 16.3000),
            with_pilot("d2", 5, 48.2050, 16.3000),
        ];
        assert!(pilot_reuse(&tracks, 50.0).is_empty());
    }

    #[test]
    fn test_operator_rows_excluded_from_proximity() {
        // d2 has an operator id, so it only participates in method 1.
        let mut d2 = with_pilot("d2", 5, 48.2001, 16.3000);
        d2.operator_id = Some("OP-1".to_string());
        let tracks = vec![with_pilot("d1", 0, 48.2000, 16.3000), d2];

        assert!(pilot_reuse(&tracks, 50.0).is_empty());
    }

    #[test]
    fn test_union_of_both_methods() {
        let tracks = vec![
            with_operator("a1", 0, "OP-7"),
            with_operator("a2", 1, "OP-7"),
            with_pilot("b1", 2, 48.1000, 16.1000),
            with_pilot("b2", 3, 48.1001, 16.1000),
        ];

        let results = pilot_reuse(&tracks, 50.0);
        assert_eq!(results.len(), 2);
        let methods: Vec<&str> = results.iter().map(|r| r.correlation_method.as_str()).collect();
        assert!(methods.contains(&"operator_id"));
        assert!(methods.contains(&"proximity"));
    }

    #[test]
    fn test_same_drone_twice_is_not_reuse() {
        let tracks = vec![
            with_operator("d1", 0, "OP-1"),
            with_operator("d1", 5, "OP-1"),
        ];
        assert!(pilot_reuse(&tracks, 50.0).is_empty());
    }
}
