//! Log-distance path-loss model.
//!
//! Converts received signal strength into an estimated transmitter distance:
//! `RSSI = TxPower - 10 * n * log10(d)`, rearranged to
//! `d = 10^((TxPower - RSSI) / (10 * n))`.

/// Path-loss model parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathLoss {
    /// Transmitter power in dBm at 1 m (default 0 dBm for drone video links)
    pub tx_power_dbm: f64,
    /// Path-loss exponent: 2.0 free space, 2.5 to 3.0 outdoor, 4.0 indoor
    pub exponent: f64,
}

impl Default for PathLoss {
    fn default() -> Self {
        Self {
            tx_power_dbm: 0.0,
            exponent: 2.5,
        }
    }
}

/// Minimum distance returned for saturated or invalid signals, meters.
pub const MIN_DISTANCE_M: f64 = 10.0;

/// Maximum plausible detection distance, meters.
pub const MAX_DISTANCE_M: f64 = 10_000.0;

impl PathLoss {
    pub fn new(tx_power_dbm: f64, exponent: f64) -> Self {
        Self {
            tx_power_dbm,
            exponent,
        }
    }

    /// Estimated distance in meters for a measured RSSI.
    ///
    /// A signal at or above TxPower means the receiver is effectively on top
    /// of the transmitter; the result is clamped to
    /// [`MIN_DISTANCE_M`, `MAX_DISTANCE_M`].
    pub fn distance_m(&self, rssi_dbm: f64) -> f64 {
        if rssi_dbm >= self.tx_power_dbm {
            return MIN_DISTANCE_M;
        }
        let exponent = (self.tx_power_dbm - rssi_dbm) / (10.0 * self.exponent);
        10f64.powf(exponent).clamp(MIN_DISTANCE_M, MAX_DISTANCE_M)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_monotone_in_rssi() {
        let model = PathLoss::default();
        let strong = model.distance_m(-50.0);
        let weak = model.distance_m(-80.0);
        assert!(weak > strong);
    }

    #[test]
    fn test_distance_formula() {
        // n = 2.5, TxPower = 0: -50 dBm is 10^(50/25) = 100 m.
        let model = PathLoss::default();
        assert!((model.distance_m(-50.0) - 100.0).abs() < 1e-6);
        // -75 dBm is 10^3 = 1000 m.
        assert!((model.distance_m(-75.0) - 1000.0).abs() < 1e-6);
    }

    #[test]
    fn test_distance_clamps() {
        let model = PathLoss::default();
        assert_eq!(model.distance_m(10.0), MIN_DISTANCE_M);
        assert_eq!(model.distance_m(0.0), MIN_DISTANCE_M);
        assert_eq!(model.distance_m(-200.0), MAX_DISTANCE_M);
    }

    #[test]
    fn test_tx_power_shift_scales_distance() {
        // Shifting both TxPower and RSSI by the same delta leaves distance
        // unchanged; shifting RSSI alone scales by 10^(delta / (10 n)).
        let model = PathLoss::default();
        let d1 = model.distance_m(-60.0);
        let shifted = PathLoss::new(5.0, 2.5);
        assert!((shifted.distance_m(-55.0) - d1).abs() < 1e-9);

        let d2 = model.distance_m(-65.0);
        let scale = 10f64.powf(5.0 / 25.0);
        assert!((d2 / d1 - scale).abs() < 1e-9);
    }
}
