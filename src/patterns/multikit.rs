//! Multi-kit correlation: the same drone heard by several kits at once.
//!
//! Observations are bucketed into one-minute slots; within a slot each kit
//! contributes its most recent sighting. Slots where at least two distinct
//! kits saw the drone are reported, strongest signal first. Three or more
//! kits make the slot a trilateration candidate.

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::records::TrackRecord;

/// One kit's contribution to a correlated slot.
#[derive(Debug, Clone, Serialize)]
pub struct KitObservation {
    pub kit_id: String,
    pub lat: f64,
    pub lon: f64,
    pub alt: Option<f64>,
    pub rssi: Option<i32>,
    pub freq: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// A drone seen by multiple kits within one slot.
#[derive(Debug, Clone, Serialize)]
pub struct MultiKitDetection {
    pub drone_id: String,
    pub slot_start: DateTime<Utc>,
    pub kit_count: usize,
    /// Ordered by RSSI descending, missing RSSI last
    pub kits: Vec<KitObservation>,
    pub triangulation_possible: bool,
    pub rid_make: Option<String>,
    pub rid_model: Option<String>,
    pub latest_detection: DateTime<Utc>,
}

const SLOT_SECS: i64 = 60;

/// Detect drones observed by two or more kits within a one-minute slot.
///
/// Ordered by kit count descending, then latest detection descending.
pub fn multi_kit_detections(tracks: &[TrackRecord]) -> Vec<MultiKitDetection> {
    // (drone, slot) -> kit -> best row.
    let mut slots: BTreeMap<(&str, i64), BTreeMap<&str, &TrackRecord>> = BTreeMap::new();

    for track in tracks {
        if track.position().is_none() {
            continue;
        }
        let slot = track.time.timestamp().div_euclid(SLOT_SECS);
        slots
            .entry((track.drone_id.as_str(), slot))
            .or_default()
            .entry(track.kit_id.as_str())
            .and_modify(|existing| {
                let newer = track.time > existing.time
                    || (track.time == existing.time && track.rssi > existing.rssi);
                if newer {
                    *existing = track;
                }
            })
            .or_insert(track);
    }

    let mut detections: Vec<MultiKitDetection> = slots
        .into_iter()
        .filter(|(_, kits)| kits.len() >= 2)
        .map(|((drone_id, slot), kits)| {
            let mut observations: Vec<KitObservation> = kits
                .values()
                .filter_map(|t| {
                    let (lat, lon) = t.position()?;
                    Some(KitObservation {
                        kit_id: t.kit_id.clone(),
                        lat,
                        lon,
                        alt: t.alt,
                        rssi: t.rssi,
                        freq: t.freq,
                        timestamp: t.time,
                    })
                })
                .collect();
            // Strongest first, unreported RSSI sinks to the end.
            observations.sort_by(|a, b| match (a.rssi, b.rssi) {
                (Some(x), Some(y)) => y.cmp(&x),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            });

            let latest_detection = kits.values().map(|t| t.time).max().unwrap_or_else(Utc::now);
            let rid_make = kits.values().find_map(|t| t.rid_make.clone());
            let rid_model = kits.values().find_map(|t| t.rid_model.clone());
            let kit_count = observations.len();

            MultiKitDetection {
                drone_id: drone_id.to_string(),
                slot_start: Utc
                    .timestamp_opt(slot * SLOT_SECS, 0)
                    .single()
                    .unwrap_or(latest_detection),
                kit_count,
                kits: observations,
                triangulation_possible: kit_count >= 3,
                rid_make,
                rid_model,
                latest_detection,
            }
        })
        .collect();

    detections.sort_by(|a, b| {
        b.kit_count
            .cmp(&a.kit_count)
            .then(b.latest_detection.cmp(&a.latest_detection))
    });
    detections
}
