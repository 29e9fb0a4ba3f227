//! Per-kit poll health and adaptive backoff.
//!
//! Each HTTP polling loop owns one [`KitHealth`]; the supervisor and the
//! read API reuse the same boundary function through [`KitStatus::classify`].

use std::time::{Duration, Instant};

use serde::Serialize;

/// Derived kit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KitStatus {
    /// Seen within the stale threshold
    Online,
    /// Seen, but not recently
    Stale,
    /// Not seen within the offline threshold
    Offline,
    /// Polling is failing hard (non-retriable errors)
    Error,
    /// Never seen
    #[default]
    Unknown,
}

impl KitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Stale => "stale",
            Self::Offline => "offline",
            Self::Error => "error",
            Self::Unknown => "unknown",
        }
    }

    /// Boundary function over time-since-last-seen.
    ///
    /// `online` below the stale threshold, `stale` up to the offline
    /// threshold, `offline` beyond it, `unknown` when never seen.
    pub fn classify(since_seen: Option<Duration>, thresholds: &StatusThresholds) -> Self {
        match since_seen {
            None => Self::Unknown,
            Some(elapsed) if elapsed < thresholds.stale => Self::Online,
            Some(elapsed) if elapsed < thresholds.offline => Self::Stale,
            Some(_) => Self::Offline,
        }
    }

    /// Classify from whole seconds; used where elapsed time comes from
    /// stored timestamps rather than the monotonic clock.
    pub fn classify_secs(since_seen_secs: Option<f64>, thresholds: &StatusThresholds) -> Self {
        Self::classify(
            since_seen_secs.map(|s| Duration::from_secs_f64(s.max(0.0))),
            thresholds,
        )
    }
}

/// Status boundary thresholds.
#[derive(Debug, Clone, Copy)]
pub struct StatusThresholds {
    pub stale: Duration,
    pub offline: Duration,
}

impl Default for StatusThresholds {
    fn default() -> Self {
        Self {
            stale: Duration::from_secs(30),
            offline: Duration::from_secs(120),
        }
    }
}

/// Poll scheduling policy: exponential backoff on consecutive failures.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    /// Base poll interval
    pub base: Duration,
    /// Backoff ceiling
    pub cap: Duration,
}

/// Exponent bound so the doubling can never overflow; the ceiling bites
/// long before this for any sane configuration.
const BACKOFF_EXPONENT_CAP: u32 = 16;

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(5),
            cap: Duration::from_secs(300),
        }
    }
}

impl PollPolicy {
    /// `min(base * 2^failures, cap)`, exactly.
    pub fn delay_for_failures(&self, consecutive_failures: u32) -> Duration {
        let factor = 2u64.pow(consecutive_failures.min(BACKOFF_EXPONENT_CAP));
        self.base.saturating_mul(factor as u32).min(self.cap)
    }
}

/// Health state for one polled kit.
#[derive(Debug, Clone, Default)]
pub struct KitHealth {
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
    pub last_success_at: Option<Instant>,
    pub last_poll_at: Option<Instant>,
}

impl KitHealth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fully successful poll tick.
    pub fn record_success(&mut self, at: Instant) {
        self.consecutive_successes += 1;
        self.consecutive_failures = 0;
        self.last_success_at = Some(at);
        self.last_poll_at = Some(at);
    }

    /// Record a failed poll tick.
    pub fn record_failure(&mut self, at: Instant) {
        self.consecutive_successes = 0;
        self.consecutive_failures += 1;
        self.last_poll_at = Some(at);
    }

    /// Current derived status.
    pub fn status(&self, now: Instant, thresholds: &StatusThresholds) -> KitStatus {
        KitStatus::classify(
            self.last_success_at.map(|t| now.duration_since(t)),
            thresholds,
        )
    }

    /// Delay until the next poll tick.
    pub fn poll_delay(&self, policy: &PollPolicy) -> Duration {
        policy.delay_for_failures(self.consecutive_failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_boundaries() {
        let thresholds = StatusThresholds::default();
        let classify = |secs| KitStatus::classify(Some(Duration::from_secs(secs)), &thresholds);

        assert_eq!(classify(0), KitStatus::Online);
        assert_eq!(classify(29), KitStatus::Online);
        assert_eq!(classify(30), KitStatus::Stale);
        assert_eq!(classify(119), KitStatus::Stale);
        assert_eq!(classify(120), KitStatus::Offline);
        assert_eq!(classify(86_400), KitStatus::Offline);
        assert_eq!(
            KitStatus::classify(None, &thresholds),
            KitStatus::Unknown
        );
    }

    #[test]
    fn test_backoff_schedule() {
        let policy = PollPolicy::default();
        // min(5s * 2^k, 300s), exactly.
        assert_eq!(policy.delay_for_failures(0), Duration::from_secs(5));
        assert_eq!(policy.delay_for_failures(1), Duration::from_secs(10));
        assert_eq!(policy.delay_for_failures(2), Duration::from_secs(20));
        assert_eq!(policy.delay_for_failures(3), Duration::from_secs(40));
        assert_eq!(policy.delay_for_failures(4), Duration::from_secs(80));
        assert_eq!(policy.delay_for_failures(5), Duration::from_secs(160));
        assert_eq!(policy.delay_for_failures(6), Duration::from_secs(300));
        assert_eq!(policy.delay_for_failures(30), Duration::from_secs(300));
    }

    #[test]
    fn test_success_resets_backoff() {
        let policy = PollPolicy::default();
        let mut health = KitHealth::new();
        let now = Instant::now();

        for _ in 0..4 {
            health.record_failure(now);
        }
        assert_eq!(health.poll_delay(&policy), Duration::from_secs(80));

        health.record_success(now);
        assert_eq!(health.consecutive_failures, 0);
        assert_eq!(health.poll_delay(&policy), Duration::from_secs(5));
    }

    #[test]
    fn test_status_tracks_last_success() {
        let thresholds = StatusThresholds::default();
        let mut health = KitHealth::new();
        let start = Instant::now();

        assert_eq!(health.status(start, &thresholds), KitStatus::Unknown);

        health.record_success(start);
        assert_eq!(health.status(start, &thresholds), KitStatus::Online);
        assert_eq!(
            health.status(start + Duration::from_secs(45), &thresholds),
            KitStatus::Stale
        );
        assert_eq!(
            health.status(start + Duration::from_secs(500), &thresholds),
            KitStatus::Offline
        );

        // Failures do not move last_success_at.
        health.record_failure(start + Duration::from_secs(10));
        assert_eq!(
            health.status(start + Duration::from_secs(20), &thresholds),
            KitStatus::Online
        );
    }

    #[test]
    fn test_classify_secs() {
        let thresholds = StatusThresholds::default();
        assert_eq!(
            KitStatus::classify_secs(Some(10.0), &thresholds),
            KitStatus::Online
        );
        assert_eq!(
            KitStatus::classify_secs(Some(45.5), &thresholds),
            KitStatus::Stale
        );
        assert_eq!(
            KitStatus::classify_secs(None, &thresholds),
            KitStatus::Unknown
        );
    }
}
