//! # Skywarden Core
//!
//! Domain core for the Skywarden multi-kit drone surveillance stack.
//!
//! Skywarden aggregates drone/aircraft tracks, FPV signal detections, and
//! kit health telemetry from a fleet of field sensor kits into a central
//! time-series store. This crate holds everything that does not touch the
//! network or the database:
//!
//! - [`records`]: Normalised record structs shared by both ingest paths
//! - [`geo`]: Haversine distance on the WGS84 sphere
//! - [`pathloss`]: RSSI to distance via the log-distance path-loss model
//! - [`estimate`]: RSSI location estimation and GPS spoofing detection
//! - [`kit_health`]: Per-kit poll health, status boundaries, and backoff
//! - [`retry`]: Retry schedules for transient fetch failures
//! - [`normalize`]: Bus payload field normalisation
//! - [`timerange`]: Query time-range token parsing
//! - [`patterns`]: Pattern detection over windowed track rows
//!
//! ## Quick Start
//!
//! ```rust
//! use skywarden::estimate::{Estimator, Observation};
//!
//! let estimator = Estimator::default();
//! let estimate = estimator.estimate(&[
//!     Observation::new("kit-a", 0.0, 0.0, Some(-60)),
//!     Observation::new("kit-b", 0.0, 0.001, Some(-65)),
//!     Observation::new("kit-c", 0.001, 0.0, Some(-70)),
//! ]).unwrap();
//! assert_eq!(estimate.algorithm, "trilateration");
//! ```

// Modules
pub mod error;
pub mod estimate;
pub mod geo;
pub mod kit_health;
pub mod normalize;
pub mod pathloss;
pub mod patterns;
pub mod records;
pub mod retry;
pub mod timerange;

// Re-exports for convenient access
pub use error::{Result, SkywardenError};
pub use estimate::{Estimator, LocationEstimate, Observation, SpoofingAssessment};
pub use kit_health::{KitHealth, KitStatus, PollPolicy};
pub use records::{HealthRecord, KitSource, KitUpsert, SignalRecord, TrackRecord};
pub use timerange::TimeRange;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Coordinates equal to (0, 0) mean "not reported" throughout the system.
pub fn position_reported(lat: Option<f64>, lon: Option<f64>) -> bool {
    matches!((lat, lon), (Some(lat), Some(lon)) if lat != 0.0 || lon != 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_position_reported() {
        assert!(position_reported(Some(51.5), Some(-0.1)));
        assert!(!position_reported(Some(0.0), Some(0.0)));
        assert!(!position_reported(None, Some(-0.1)));
        assert!(!position_reported(Some(51.5), None));
    }
}
