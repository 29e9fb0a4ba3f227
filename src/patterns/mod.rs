//! Pattern detection over windowed track rows.
//!
//! Every detector here is a pure function: the repository fetches the time
//! window from the store, the detector walks the rows. This keeps the
//! pattern contract testable without a database and keeps SQL out of the
//! analytics logic.
//!
//! - [`repeated`]: drones seen multiple times in a window
//! - [`coordinated`]: drones flying together in time and space
//! - [`pilot`]: one operator flying multiple airframes
//! - [`anomalies`]: speed, altitude, and climb-rate outliers
//! - [`multikit`]: simultaneous multi-observer detections
//! - [`security`]: loitering, rapid descent, night activity, and the
//!   consolidated threat score

pub mod anomalies;
pub mod coordinated;
pub mod multikit;
pub mod pilot;
pub mod repeated;
pub mod security;

use serde::Serialize;

/// Severity ladder shared by the detectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// Group rows by drone id, each group sorted by time ascending.
pub(crate) fn by_drone_sorted(
    tracks: &[crate::records::TrackRecord],
) -> std::collections::BTreeMap<&str, Vec<&crate::records::TrackRecord>> {
    let mut map: std::collections::BTreeMap<&str, Vec<&crate::records::TrackRecord>> =
        std::collections::BTreeMap::new();
    for track in tracks {
        map.entry(track.drone_id.as_str()).or_default().push(track);
    }
    for rows in map.values_mut() {
        rows.sort_by_key(|t| t.time);
    }
    map
}
