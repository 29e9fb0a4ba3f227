// Skywarden - Multi-kit drone surveillance analytics
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Process-wide ingest counters, surfaced on `/status` and logged
//! periodically by the bus subscriber.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared atomic counters for both ingest paths.
#[derive(Debug, Default)]
pub struct IngestStats {
    drones: AtomicU64,
    aircraft: AtomicU64,
    signals: AtomicU64,
    health: AtomicU64,
    errors: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub drones_received: u64,
    pub aircraft_received: u64,
    pub signals_received: u64,
    pub health_received: u64,
    pub errors: u64,
}

impl IngestStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_drones(&self, n: usize) {
        self.drones.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn add_aircraft(&self, n: usize) {
        self.aircraft.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn add_signals(&self, n: usize) {
        self.signals.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn add_health(&self, n: usize) {
        self.health.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn bump_errors(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            drones_received: self.drones.load(Ordering::Relaxed),
            aircraft_received: self.aircraft.load(Ordering::Relaxed),
            signals_received: self.signals.load(Ordering::Relaxed),
            health_received: self.health.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let stats = IngestStats::new();
        stats.add_drones(3);
        stats.add_drones(2);
        stats.add_signals(1);
        stats.bump_errors();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.drones_received, 5);
        assert_eq!(snapshot.signals_received, 1);
        assert_eq!(snapshot.aircraft_received, 0);
        assert_eq!(snapshot.errors, 1);
    }
}
