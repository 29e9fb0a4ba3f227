//! End-to-end scenarios for the RSSI location estimator.
//!
//! Synthetic kit geometries with known drone positions, exercising the
//! algorithm selection, the spoofing detector, and the invariants the
//! estimator must hold.

use skywarden::estimate::{Estimator, Observation};
use skywarden::geo::haversine_m;
use skywarden::pathloss::PathLoss;

fn obs(kit: &str, lat: f64, lon: f64, rssi: i32) -> Observation {
    Observation::new(kit, lat, lon, Some(rssi))
}

/// RSSI that models a given distance under the default parameters
/// (TxPower 0 dBm, n = 2.5).
fn rssi_for_distance(distance_m: f64) -> i32 {
    (-25.0 * distance_m.log10()).round() as i32
}

#[test]
fn three_kits_consistent_ranges_localize_the_drone() {
    // Kits on a 1.1 km right angle, drone inside at (0.002, 0.002). Each
    // RSSI is what the path-loss model predicts for the true distance.
    let drone = (0.002, 0.002);
    let kits = [("a", 0.0, 0.0), ("b", 0.0, 0.01), ("c", 0.01, 0.0)];

    let observations: Vec<Observation> = kits
        .iter()
        .map(|(id, lat, lon)| {
            let distance = haversine_m(*lat, *lon, drone.0, drone.1);
            obs(id, *lat, *lon, rssi_for_distance(distance))
        })
        .collect();

    let estimator = Estimator::default();
    let estimate = estimator.estimate(&observations).unwrap();

    assert_eq!(estimate.algorithm, "trilateration");
    let error = haversine_m(estimate.lat, estimate.lon, drone.0, drone.1);
    assert!(error < 60.0, "estimate {error} m off the true position");
}

#[test]
fn two_kit_weighted_estimate_with_honest_report_is_clean() {
    // Two kits 222 m apart. The drone reports a position close to the
    // weighted point; the modelled distances dominate the confidence
    // radius, so the report scores clean.
    let estimator = Estimator::default();
    let estimate = estimator
        .estimate(&[obs("a", 0.0, 0.0, -60), obs("b", 0.0, 0.002, -65)])
        .unwrap();
    assert_eq!(estimate.algorithm, "two_kit_weighted");

    let reported = (0.0002, 0.0008);
    let error = haversine_m(estimate.lat, estimate.lon, reported.0, reported.1);
    let assessment = estimator.assess_spoofing(error, estimate.confidence_radius_m);

    assert!(error < estimate.confidence_radius_m);
    assert!(assessment.score < 0.3, "score {}", assessment.score);
    assert!(!assessment.suspected);
}

#[test]
fn wildly_wrong_report_is_flagged_as_spoofing() {
    // Kits clustered near the origin; the drone claims (1.0, 1.0), about
    // 157 km away. Must flag regardless of estimator internals.
    let estimator = Estimator::default();
    let estimate = estimator
        .estimate(&[
            obs("a", 0.0, 0.0, -60),
            obs("b", 0.0, 0.001, -65),
            obs("c", 0.001, 0.0, -70),
        ])
        .unwrap();
    assert_eq!(estimate.algorithm, "trilateration");

    let error = haversine_m(estimate.lat, estimate.lon, 1.0, 1.0);
    let assessment = estimator.assess_spoofing(error, estimate.confidence_radius_m);

    assert!(assessment.score >= 0.7, "score {}", assessment.score);
    assert!(assessment.suspected);
    let reason = assessment.reason.expect("flagged report carries a reason");
    assert!(reason.contains("expected accuracy"), "reason: {reason}");
}

#[test]
fn algorithm_selection_follows_observation_count() {
    let estimator = Estimator::default();

    let one = estimator.estimate(&[obs("a", 0.0, 0.0, -60)]).unwrap();
    assert_eq!(one.algorithm, "single_kit");
    assert_eq!(one.distances.len(), 1);

    let two = estimator
        .estimate(&[obs("a", 0.0, 0.0, -60), obs("b", 0.0, 0.001, -60)])
        .unwrap();
    assert_eq!(two.algorithm, "two_kit_weighted");

    let four = estimator
        .estimate(&[
            obs("a", 0.0, 0.0, -60),
            obs("b", 0.0, 0.001, -62),
            obs("c", 0.001, 0.0, -64),
            obs("d", 0.001, 0.001, -66),
        ])
        .unwrap();
    assert_eq!(four.algorithm, "trilateration");
    assert_eq!(four.distances.len(), 4);
}

#[test]
fn estimator_rejects_empty_input() {
    let estimator = Estimator::default();
    assert!(estimator.estimate(&[]).is_err());
}

#[test]
fn uniform_rssi_shift_preserves_two_kit_position() {
    // Property: shifting every RSSI by the same delta leaves the estimated
    // position unchanged and scales the confidence radius by 10^(d/(10 n)).
    let estimator = Estimator::default();
    for delta in [5, 10, 20] {
        let base = estimator
            .estimate(&[obs("a", 0.0, 0.0, -58), obs("b", 0.0, 0.003, -66)])
            .unwrap();
        let shifted = estimator
            .estimate(&[
                obs("a", 0.0, 0.0, -58 - delta),
                obs("b", 0.0, 0.003, -66 - delta),
            ])
            .unwrap();

        assert!((base.lat - shifted.lat).abs() < 1e-12);
        assert!((base.lon - shifted.lon).abs() < 1e-12);

        let expected_scale = 10f64.powf(delta as f64 / 25.0);
        let actual_scale = shifted.confidence_radius_m / base.confidence_radius_m;
        assert!(
            (actual_scale - expected_scale).abs() < 0.01,
            "delta {delta}: scale {actual_scale} vs {expected_scale}"
        );
    }
}

#[test]
fn per_request_pathloss_parameters_change_ranges() {
    // A hotter transmitter pushes every modelled distance out.
    let default = Estimator::default();
    let hot = Estimator::new(PathLoss::new(10.0, 2.5));

    let observations = [obs("a", 0.0, 0.0, -60)];
    let d_default = default.estimate(&observations).unwrap().confidence_radius_m;
    let d_hot = hot.estimate(&observations).unwrap().confidence_radius_m;
    assert!(d_hot > d_default);

    // A higher path-loss exponent pulls them in.
    let lossy = Estimator::new(PathLoss::new(0.0, 4.0));
    let d_lossy = lossy.estimate(&observations).unwrap().confidence_radius_m;
    assert!(d_lossy < d_default);
}

#[test]
fn spoofing_score_boundaries_are_stable() {
    let estimator = Estimator::default();
    let confidence = 100.0;

    // Monotone across the whole ratio range.
    let mut prev = -1.0;
    for ratio in [0.0, 0.5, 0.99, 1.01, 2.0, 2.99, 3.01, 4.5, 5.99, 6.01, 10.0, 100.0] {
        let score = estimator.assess_spoofing(ratio * confidence, confidence).score;
        assert!(score >= prev, "regression at ratio {ratio}");
        prev = score;
    }

    // Band edges.
    assert!(estimator.assess_spoofing(99.0, confidence).score < 0.3);
    assert!(estimator.assess_spoofing(301.0, confidence).score >= 0.5);
    assert!(estimator.assess_spoofing(299.0, confidence).score < 0.5);
    assert!(estimator.assess_spoofing(601.0, confidence).score >= 0.7);
    assert_eq!(estimator.assess_spoofing(0.0, confidence).score, 0.0);
}
