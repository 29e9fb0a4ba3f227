//! Coordinated activity: drones flying together in time and space.
//!
//! Single-link clustering without transitive closure: candidate pairs are
//! built from each drone's most recent position, then groups are emitted
//! per anchor drone in id order, consuming members greedily. Callers that
//! need true cliques must post-filter.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::geo::haversine_m;
use crate::records::TrackRecord;

/// A member of a coordinated group.
#[derive(Debug, Clone, Serialize)]
pub struct CoordinatedDrone {
    pub drone_id: String,
    pub lat: f64,
    pub lon: f64,
    pub timestamp: DateTime<Utc>,
    pub kit_id: String,
    pub rid_make: Option<String>,
}

/// A group of drones seen close together.
#[derive(Debug, Clone, Serialize)]
pub struct CoordinatedGroup {
    pub group_id: usize,
    pub drone_count: usize,
    pub drones: Vec<CoordinatedDrone>,
    /// "high" (>= 4 paired neighbours), "medium" (>= 2), or "low"
    pub correlation_score: String,
}

/// Detect groups of drones within `distance_threshold_m` of each other whose
/// latest sightings fall within `time_window_secs`.
pub fn coordinated_groups(
    tracks: &[TrackRecord],
    distance_threshold_m: f64,
    time_window_secs: i64,
) -> Vec<CoordinatedGroup> {
    // Latest positioned sighting per drone; aircraft are not candidates.
    let mut latest: BTreeMap<&str, &TrackRecord> = BTreeMap::new();
    for track in tracks {
        if !track.is_drone() || track.position().is_none() {
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

    let drones: Vec<(&str, &TrackRecord)> = latest.into_iter().collect();

    // Candidate pairs with i < j in id order.
    let mut neighbours: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for (i, (id_a, a)) in drones.iter().enumerate() {
        for (id_b, b) in drones.iter().skip(i + 1) {
            let (lat_a, lon_a) = match a.position() {
                Some(p) => p,
                None => continue,
            };
            let (lat_b, lon_b) = match b.position() {
                Some(p) => p,
                None => continue,
            };
            let dt = (a.time - b.time).num_seconds().abs();
            if dt > time_window_secs {
                continue;
            }
            if haversine_m(lat_a, lon_a, lat_b, lon_b) > distance_threshold_m {
                continue;
            }
            neighbours.entry(id_a).or_default().insert(id_b);
            neighbours.entry(id_b).or_default().insert(id_a);
        }
    }

    // Greedy per-anchor groups in id order; consumed members do not anchor.
    let by_id: BTreeMap<&str, &TrackRecord> = drones.iter().copied().collect();
    let mut used: BTreeSet<&str> = BTreeSet::new();
    let mut groups = Vec::new();

    for (anchor, paired) in &neighbours {
        if used.contains(anchor) {
            continue;
        }
        let fresh: Vec<&str> = paired.iter().filter(|id| !used.contains(*id)).copied().collect();
        if fresh.is_empty() {
            continue;
        }

        let pair_count = fresh.len();
        let correlation_score = if pair_count >= 4 {
            "high"
        } else if pair_count >= 2 {
            "medium"
        } else {
            "low"
        };

        let mut members: Vec<&str> = vec![anchor];
        members.extend(&fresh);
        used.extend(members.iter().copied());

        let drones = members
            .iter()
            .filter_map(|id| {
                let track = by_id.get(*id)?;
                let (lat, lon) = track.position()?;
                Some(CoordinatedDrone {
                    drone_id: (*id).to_string(),
                    lat,
                    lon,
                    timestamp: track.time,
                    kit_id: track.kit_id.clone(),
                    rid_make: track.rid_make.clone(),
                })
            })
            .collect::<Vec<_>>();

        groups.push(CoordinatedGroup {
            group_id: groups.len() + 1,
            drone_count: drones.len(),
            drones,
            correlation_score: correlation_score.to_string(),
        });
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn track(drone: &str, second: u32, lat: f64, lon: f64) -> TrackRecord {
        let time = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap()
            + chrono::Duration::seconds(second as i64);
        let mut t = TrackRecord::new(time, "kit-a", drone);
        t.lat = Some(lat);
        t.lon = Some(lon);
        t
    }

    #[test]
    fn test_three_drones_form_one_medium_group() {
        // Pairwise distances around 200 m, all within 60 s.
        let tracks = vec![
            track("d1", 0, 48.2000, 16.3000),
            track("d2", 20, 48.2018, 16.3000),
            track("d3", 40, 48.2009, 16.3015),
        ];

        let groups = coordinated_groups(&tracks, 500.0, 3600);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].drone_count, 3);
        assert_eq!(groups[0].correlation_score, "medium");
    }

    #[test]
    fn test_distant_drones_do_not_group() {
        let tracks = vec![
            track("d1", 0, 48.2, 16.3),
            track("d2", 10, 48.9, 17.1),
        ];
        assert!(coordinated_groups(&tracks, 500.0, 3600).is_empty());
    }

    #[test]
    fn test_time_gap_blocks_pairing() {
        let tracks = vec![
            track("d1", 0, 48.2000, 16.3000),
            track("d2", 3000, 48.2001, 16.3001),
        ];
        assert!(coordinated_groups(&tracks, 500.0, 60).is_empty());
    }

    #[test]
    fn test_uses_latest_position_per_drone() {
        // d2's early sighting is close, the latest one is far away.
        let tracks = vec![
            track("d1", 50, 48.2000, 16.3000),
            track("d2", 0, 48.2001, 16.3001),
            track("d2", 55, 48.9000, 17.1000),
        ];
        assert!(coordinated_groups(&tracks, 500.0, 3600).is_empty());
    }

    #[test]
    fn test_five_close_drones_score_high() {
        let tracks: Vec<TrackRecord> = (0..5)
            .map(|i| track(&format!("d{i}"), i * 5, 48.2 + i as f64 * 1e-4, 16.3))
            .collect();

        let groups = coordinated_groups(&tracks, 500.0, 3600);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].drone_count, 5);
        assert_eq!(groups[0].correlation_score, "high");
    }

    #[test]
    fn test_single_pair_scores_low() {
        let tracks = vec![
            track("d1", 0, 48.2000, 16.3000),
            track("d2", 10, 48.2001, 16.3001),
        ];
        let groups = coordinated_groups(&tracks, 500.0, 3600);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].drone_count, 2);
        assert_eq!(groups[0].correlation_score, "low");
    }
}
