//! Repeated contacts: the same drone seen multiple times in a window.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;

use crate::records::TrackRecord;

/// One positioned sighting of the drone.
#[derive(Debug, Clone, Serialize)]
pub struct ContactLocation {
    pub lat: f64,
    pub lon: f64,
    pub kit_id: String,
    pub timestamp: DateTime<Utc>,
}

/// A drone with enough appearances to report.
#[derive(Debug, Clone, Serialize)]
pub struct RepeatedDrone {
    pub drone_id: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub appearance_count: usize,
    pub kit_count: usize,
    pub locations: Vec<ContactLocation>,
}

/// Find drones with at least `min_appearances` positioned sightings.
///
/// Ordered by appearance count descending, then last-seen descending.
pub fn repeated_contacts(tracks: &[TrackRecord], min_appearances: usize) -> Vec<RepeatedDrone> {
    let groups = super::by_drone_sorted(tracks);

    let mut results: Vec<RepeatedDrone> = groups
        .into_iter()
        .filter_map(|(drone_id, rows)| {
            let positioned: Vec<&&TrackRecord> =
                rows.iter().filter(|t| t.position().is_some()).collect();
            if positioned.len() < min_appearances {
                return None;
            }

            let kits: BTreeSet<&str> = positioned.iter().map(|t| t.kit_id.as_str()).collect();
            let locations = positioned
                .iter()
                .map(|t| {
                    let (lat, lon) = t.position().unwrap_or_default();
                    ContactLocation {
                        lat,
                        lon,
                        kit_id: t.kit_id.clone(),
                        timestamp: t.time,
                    }
                })
                .collect();

            Some(RepeatedDrone {
                drone_id: drone_id.to_string(),
                first_seen: positioned.first().map(|t| t.time)?,
                last_seen: positioned.last().map(|t| t.time)?,
                appearance_count: positioned.len(),
                kit_count: kits.len(),
                locations,
            })
        })
        .collect();

    results.sort_by(|a, b| {
        b.appearance_count
            .cmp(&a.appearance_count)
            .then(b.last_seen.cmp(&a.last_seen))
    });
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn track(drone: &str, kit: &str, minute: u32, lat: f64, lon: f64) -> TrackRecord {
        let time = Utc.with_ymd_and_hms(2025, 6, 1, 10, minute, 0).unwrap();
        let mut t = TrackRecord::new(time, kit, drone);
        t.lat = Some(lat);
        t.lon = Some(lon);
        t
    }

    #[test]
    fn test_repeated_threshold() {
        let tracks = vec![
            track("d1", "kit-a", 0, 48.2, 16.3),
            track("d1", "kit-a", 5, 48.21, 16.31),
            track("d1", "kit-b", 10, 48.22, 16.32),
            track("d2", "kit-a", 1, 48.0, 16.0),
        ];

        let results = repeated_contacts(&tracks, 2);
        assert_eq!(results.len(), 1);
        let d1 = &results[0];
        assert_eq!(d1.drone_id, "d1");
        assert_eq!(d1.appearance_count, 3);
        assert_eq!(d1.kit_count, 2);
        assert_eq!(d1.locations.len(), 3);
        assert!(d1.first_seen < d1.last_seen);
    }

    #[test]
    fn test_unpositioned_rows_do_not_count() {
        let mut no_pos = track("d1", "kit-a", 0, 0.0, 0.0);
        no_pos.lat = Some(0.0);
        no_pos.lon = Some(0.0);
        let tracks = vec![no_pos, track("d1", "kit-a", 5, 48.2, 16.3)];

        assert!(repeated_contacts(&tracks, 2).is_empty());
    }

    #[test]
    fn test_ordering_by_count_then_recency() {
        let tracks = vec![
            track("busy", "kit-a", 0, 48.2, 16.3),
            track("busy", "kit-a", 1, 48.2, 16.3),
            track("busy", "kit-a", 2, 48.2, 16.3),
            track("late", "kit-a", 50, 48.2, 16.3),
            track("late", "kit-a", 55, 48.2, 16.3),
            track("early", "kit-a", 3, 48.2, 16.3),
            track("early", "kit-a", 4, 48.2, 16.3),
        ];

        let results = repeated_contacts(&tracks, 2);
        let ids: Vec<&str> = results.iter().map(|r| r.drone_id.as_str()).collect();
        assert_eq!(ids, vec!["busy", "late", "early"]);
    }

    #[test]
    fn test_locations_are_chronological() {
        let tracks = vec![
            track("d1", "kit-a", 10, 48.22, 16.32),
            track("d1", "kit-a", 0, 48.20, 16.30),
            track("d1", "kit-a", 5, 48.21, 16.31),
        ];
        let results = repeated_contacts(&tracks, 2);
        let times: Vec<_> = results[0].locations.iter().map(|l| l.timestamp).collect();
        assert!(times.windows(2).all(|w| w[0] <= w[1]));
    }
}
