//! RSSI location estimation and GPS spoofing detection.
//!
//! Estimates a drone's position from the positions of the kits that heard it
//! and the signal strength each kit reported. The algorithm is selected by
//! observation count:
//!
//! - **1 kit** (`single_kit`): the kit's own position, with the modelled
//!   distance as the confidence radius.
//! - **2 kits** (`two_kit_weighted`): a point on the line between the kits,
//!   weighted by inverse modelled distance (the closer kit wins).
//! - **3+ kits** (`trilateration`): iterative least squares on the range
//!   residuals, gradient descent with bounded iterations and a convergence
//!   tolerance. Confidence radius is the RMS residual.
//!
//! When the drone also broadcast its own GPS, the distance between the
//! estimate and the report feeds a spoofing score in [0, 1].

use serde::Serialize;

use crate::error::{Result, SkywardenError};
use crate::geo::haversine_m;
use crate::pathloss::PathLoss;

/// RSSI assumed when a kit heard the drone but reported no level.
pub const DEFAULT_RSSI_DBM: f64 = -70.0;

/// Meters per degree of latitude on the WGS84 sphere.
const METERS_PER_DEG_LAT: f64 = 111_195.0;

/// One kit's sighting of the target drone.
#[derive(Debug, Clone, Serialize)]
pub struct Observation {
    pub kit_id: String,
    /// Kit position from its own health telemetry
    pub kit_lat: f64,
    pub kit_lon: f64,
    pub rssi: Option<i32>,
    pub freq: Option<f64>,
}

impl Observation {
    pub fn new(kit_id: impl Into<String>, kit_lat: f64, kit_lon: f64, rssi: Option<i32>) -> Self {
        Self {
            kit_id: kit_id.into(),
            kit_lat,
            kit_lon,
            rssi,
            freq: None,
        }
    }
}

/// Modelled distance from one kit.
#[derive(Debug, Clone, Serialize)]
pub struct KitDistance {
    pub kit_id: String,
    pub distance_m: f64,
}

/// Result of a location estimation run.
#[derive(Debug, Clone, Serialize)]
pub struct LocationEstimate {
    /// "single_kit", "two_kit_weighted", or "trilateration"
    pub algorithm: String,
    pub lat: f64,
    pub lon: f64,
    pub confidence_radius_m: f64,
    pub distances: Vec<KitDistance>,
}

/// Spoofing assessment derived from estimate-versus-report disagreement.
#[derive(Debug, Clone, Serialize)]
pub struct SpoofingAssessment {
    /// 0.0 to 1.0, higher means more suspicious
    pub score: f64,
    pub suspected: bool,
    pub reason: Option<String>,
}

/// RSSI location estimator.
#[derive(Debug, Clone)]
pub struct Estimator {
    pub pathloss: PathLoss,
    /// Gradient descent iteration bound
    pub max_iterations: usize,
    /// Stop once a step moves the estimate less than this, meters
    pub tolerance_m: f64,
}

impl Default for Estimator {
    fn default() -> Self {
        Self {
            pathloss: PathLoss::default(),
            max_iterations: 100,
            tolerance_m: 1.0,
        }
    }
}

impl Estimator {
    pub fn new(pathloss: PathLoss) -> Self {
        Self {
            pathloss,
            ..Self::default()
        }
    }

    /// Estimate the drone position from kit observations.
    ///
    /// # Errors
    ///
    /// Returns [`SkywardenError::NoObservations`] when the slice is empty.
    pub fn estimate(&self, observations: &[Observation]) -> Result<LocationEstimate> {
        let distances: Vec<KitDistance> = observations
            .iter()
            .map(|obs| KitDistance {
                kit_id: obs.kit_id.clone(),
                distance_m: self.modelled_distance(obs),
            })
            .collect();

        match observations {
            [] => Err(SkywardenError::NoObservations),
            [only] => Ok(LocationEstimate {
                algorithm: "single_kit".to_string(),
                lat: only.kit_lat,
                lon: only.kit_lon,
                confidence_radius_m: round1(distances[0].distance_m),
                distances,
            }),
            [a, b] => Ok(self.two_kit(a, b, distances)),
            _ => Ok(self.trilaterate(observations, distances)),
        }
    }

    /// Spoofing score from the error between estimated and reported position.
    ///
    /// The score is a monotone saturating curve of the ratio
    /// `r = error / max(confidence_radius, 1)`:
    /// `r <= 1` maps to 0..0.3, `r <= 3` to 0.3..0.5 (monitor), `r <= 6` to
    /// 0.5..0.7 (suspicious), and beyond that it saturates toward 1.0.
    pub fn assess_spoofing(&self, error_m: f64, confidence_radius_m: f64) -> SpoofingAssessment {
        let ratio = error_m / confidence_radius_m.max(1.0);

        let score = if ratio <= 1.0 {
            0.3 * ratio
        } else if ratio <= 3.0 {
            0.3 + 0.1 * (ratio - 1.0)
        } else if ratio <= 6.0 {
            0.5 + 0.2 * (ratio - 3.0) / 3.0
        } else {
            0.7 + 0.3 * (1.0 - 6.0 / ratio)
        };

        let suspected = score >= 0.5;
        let reason = if suspected {
            Some(format!(
                "Position error ({:.0}m) is {:.1}x the expected accuracy ({:.0}m)",
                error_m,
                ratio,
                confidence_radius_m.max(1.0)
            ))
        } else if score >= 0.3 {
            Some(format!(
                "Position deviation ({:.0}m) is outside expected accuracy - warrants monitoring",
                error_m
            ))
        } else {
            None
        };

        SpoofingAssessment {
            score: (score * 100.0).round() / 100.0,
            suspected,
            reason,
        }
    }

    fn modelled_distance(&self, obs: &Observation) -> f64 {
        let rssi = obs.rssi.map(f64::from).unwrap_or(DEFAULT_RSSI_DBM);
        self.pathloss.distance_m(rssi)
    }

    /// Two observers pin the estimate to the line between them, pulled
    /// toward the kit with the shorter modelled distance.
    fn two_kit(&self, a: &Observation, b: &Observation, distances: Vec<KitDistance>) -> LocationEstimate {
        let da = distances[0].distance_m;
        let db = distances[1].distance_m;

        let wa = 1.0 / da;
        let wb = 1.0 / db;
        let total = wa + wb;

        LocationEstimate {
            algorithm: "two_kit_weighted".to_string(),
            lat: (a.kit_lat * wa + b.kit_lat * wb) / total,
            lon: (a.kit_lon * wa + b.kit_lon * wb) / total,
            confidence_radius_m: round1((da + db) / 2.0),
            distances,
        }
    }

    /// Least-squares fit of the point whose distances to the kits best match
    /// the modelled ranges. Descends the residual gradient from an
    /// inverse-distance weighted centroid.
    fn trilaterate(&self, observations: &[Observation], distances: Vec<KitDistance>) -> LocationEstimate {
        let n = observations.len() as f64;

        // Initial guess: centroid weighted toward the loudest kits.
        let mut total_w = 0.0;
        let mut lat = 0.0;
        let mut lon = 0.0;
        for (obs, d) in observations.iter().zip(&distances) {
            let w = 1.0 / d.distance_m;
            lat += obs.kit_lat * w;
            lon += obs.kit_lon * w;
            total_w += w;
        }
        lat /= total_w;
        lon /= total_w;

        let learning_rate = 0.5;

        for _ in 0..self.max_iterations {
            // Accumulate the residual gradient in local meter space.
            let meters_per_deg_lon = METERS_PER_DEG_LAT * lat.to_radians().cos().max(0.01);
            let mut grad_north = 0.0;
            let mut grad_east = 0.0;

            for (obs, d) in observations.iter().zip(&distances) {
                let current = haversine_m(lat, lon, obs.kit_lat, obs.kit_lon).max(1.0);
                let residual = current - d.distance_m;
                // Unit vector from the estimate toward this kit.
                let north = (obs.kit_lat - lat) * METERS_PER_DEG_LAT / current;
                let east = (obs.kit_lon - lon) * meters_per_deg_lon / current;
                grad_north += residual * north;
                grad_east += residual * east;
            }

            let step_north = learning_rate * grad_north / n;
            let step_east = learning_rate * grad_east / n;

            lat += step_north / METERS_PER_DEG_LAT;
            lon += step_east / meters_per_deg_lon;

            if (step_north * step_north + step_east * step_east).sqrt() < self.tolerance_m {
                break;
            }
        }

        // Confidence radius: RMS of the remaining range residuals.
        let sum_sq: f64 = observations
            .iter()
            .zip(&distances)
            .map(|(obs, d)| {
                let residual = haversine_m(lat, lon, obs.kit_lat, obs.kit_lon) - d.distance_m;
                residual * residual
            })
            .sum();
        let rms = (sum_sq / n).sqrt();

        LocationEstimate {
            algorithm: "trilateration".to_string(),
            lat,
            lon,
            confidence_radius_m: round1(rms),
            distances,
        }
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(kit: &str, lat: f64, lon: f64, rssi: i32) -> Observation {
        Observation::new(kit, lat, lon, Some(rssi))
    }

    #[test]
    fn test_no_observations() {
        let estimator = Estimator::default();
        assert!(matches!(
            estimator.estimate(&[]),
            Err(SkywardenError::NoObservations)
        ));
    }

    #[test]
    fn test_single_kit() {
        let estimator = Estimator::default();
        let estimate = estimator
            .estimate(&[obs("kit-a", 48.2, 16.3, -50)])
            .unwrap();

        assert_eq!(estimate.algorithm, "single_kit");
        assert_eq!(estimate.lat, 48.2);
        assert_eq!(estimate.lon, 16.3);
        // -50 dBm at n = 2.5 models 100 m.
        assert!((estimate.confidence_radius_m - 100.0).abs() < 0.2);
        assert_eq!(estimate.distances.len(), 1);
    }

    #[test]
    fn test_two_kit_weighted_leans_toward_stronger_signal() {
        let estimator = Estimator::default();
        // Kit A hears the drone louder, so the estimate sits closer to A.
        let estimate = estimator
            .estimate(&[obs("a", 0.0, 0.0, -60), obs("b", 0.0, 0.002, -65)])
            .unwrap();

        assert_eq!(estimate.algorithm, "two_kit_weighted");
        assert!(estimate.lon > 0.0 && estimate.lon < 0.001);
        // Confidence is the mean of the two modelled distances.
        let d1 = 10f64.powf(60.0 / 25.0);
        let d2 = 10f64.powf(65.0 / 25.0);
        assert!((estimate.confidence_radius_m - (d1 + d2) / 2.0).abs() < 0.2);
    }

    #[test]
    fn test_two_kit_equal_signals_give_midpoint() {
        let estimator = Estimator::default();
        let estimate = estimator
            .estimate(&[obs("a", 0.0, 0.0, -62), obs("b", 0.0, 0.002, -62)])
            .unwrap();
        assert!((estimate.lon - 0.001).abs() < 1e-9);
        assert!(estimate.lat.abs() < 1e-9);
    }

    #[test]
    fn test_two_kit_rssi_shift_leaves_position_unchanged() {
        // Shifting every RSSI by the same delta rescales every modelled
        // distance by the same factor, so inverse-distance weights and the
        // resulting point are unchanged.
        let estimator = Estimator::default();
        let base = estimator
            .estimate(&[obs("a", 0.0, 0.0, -55), obs("b", 0.0, 0.002, -61)])
            .unwrap();
        let shifted = estimator
            .estimate(&[obs("a", 0.0, 0.0, -65), obs("b", 0.0, 0.002, -71)])
            .unwrap();

        assert!((base.lat - shifted.lat).abs() < 1e-12);
        assert!((base.lon - shifted.lon).abs() < 1e-12);

        // Confidence scales by 10^(10 / 25).
        let scale = 10f64.powf(10.0 / 25.0);
        assert!((shifted.confidence_radius_m / base.confidence_radius_m - scale).abs() < 0.01);
    }

    #[test]
    fn test_trilateration_converges_on_consistent_ranges() {
        // Kits 1.1 km apart; RSSIs chosen so the modelled ranges agree with
        // a drone at (0.002, 0.002).
        let estimator = Estimator::default();
        let estimate = estimator
            .estimate(&[
                obs("a", 0.0, 0.0, -62),
                obs("b", 0.0, 0.01, -74),
                obs("c", 0.01, 0.0, -74),
            ])
            .unwrap();

        assert_eq!(estimate.algorithm, "trilateration");
        let error = haversine_m(estimate.lat, estimate.lon, 0.002, 0.002);
        assert!(error < 50.0, "estimate off by {error} m");
        assert_eq!(estimate.distances.len(), 3);
    }

    #[test]
    fn test_trilateration_missing_rssi_uses_default() {
        let estimator = Estimator::default();
        let estimate = estimator
            .estimate(&[
                Observation::new("a", 0.0, 0.0, None),
                obs("b", 0.0, 0.01, -74),
                obs("c", 0.01, 0.0, -74),
            ])
            .unwrap();
        // Default -70 dBm models 631 m for kit a.
        assert!((estimate.distances[0].distance_m - 630.957).abs() < 0.01);
    }

    #[test]
    fn test_spoofing_score_zero_at_zero_error() {
        let estimator = Estimator::default();
        let assessment = estimator.assess_spoofing(0.0, 250.0);
        assert_eq!(assessment.score, 0.0);
        assert!(!assessment.suspected);
        assert!(assessment.reason.is_none());
    }

    #[test]
    fn test_spoofing_score_monotone_in_error() {
        let estimator = Estimator::default();
        let mut prev = -1.0;
        for error in [0.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0, 50_000.0] {
            let score = estimator.assess_spoofing(error, 100.0).score;
            assert!(score >= prev, "score regressed at error {error}");
            assert!(score <= 1.0);
            prev = score;
        }
    }

    #[test]
    fn test_spoofing_bands() {
        let estimator = Estimator::default();
        // r = 0.5: well inside expected accuracy.
        assert!(estimator.assess_spoofing(50.0, 100.0).score < 0.3);
        // r = 2: monitor band.
        let monitor = estimator.assess_spoofing(200.0, 100.0);
        assert!(monitor.score >= 0.3 && monitor.score < 0.5);
        assert!(!monitor.suspected);
        assert!(monitor.reason.is_some());
        // r = 4: suspicious.
        let suspicious = estimator.assess_spoofing(400.0, 100.0);
        assert!(suspicious.score >= 0.5 && suspicious.score < 0.7);
        assert!(suspicious.suspected);
        // r = 20: likely spoofing.
        let spoofing = estimator.assess_spoofing(2000.0, 100.0);
        assert!(spoofing.score >= 0.7);
        assert!(spoofing
            .reason
            .as_deref()
            .unwrap()
            .contains("expected accuracy"));
    }

    #[test]
    fn test_spoofing_confidence_floor() {
        // Tiny confidence radii do not blow the ratio up: the divisor is
        // floored at 1 m.
        let estimator = Estimator::default();
        let a = estimator.assess_spoofing(10.0, 0.0);
        let b = estimator.assess_spoofing(10.0, 1.0);
        assert_eq!(a.score, b.score);
    }

    #[test]
    fn test_spoofed_report_far_from_estimate() {
        // Kits around the origin; the drone claims to be at (1.0, 1.0),
        // roughly 157 km away. Whatever the estimator decides, that report
        // must score as likely spoofing.
        let estimator = Estimator::default();
        let estimate = estimator
            .estimate(&[
                obs("a", 0.0, 0.0, -60),
                obs("b", 0.0, 0.001, -65),
                obs("c", 0.001, 0.0, -70),
            ])
            .unwrap();

        let error = haversine_m(estimate.lat, estimate.lon, 1.0, 1.0);
        let assessment = estimator.assess_spoofing(error, estimate.confidence_radius_m);
        assert!(assessment.score >= 0.7, "score {}", assessment.score);
        assert!(assessment.suspected);
        assert!(assessment.reason.is_some());
    }
}
