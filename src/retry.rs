//! Retry schedules for transient fetch failures.
//!
//! Within a single poll tick an endpoint fetch is retried a bounded number
//! of times with short fixed delays; only transient failures qualify.

use std::time::Duration;

/// Classification of a failed fetch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Timeout, connection refused, 5xx: worth retrying within the tick
    Transient,
    /// 4xx and anything structurally wrong: counted against the tick
    /// immediately, no retry
    Permanent,
}

impl FailureKind {
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Classify an HTTP status code.
    pub fn from_status(status: u16) -> Self {
        if status >= 500 {
            Self::Transient
        } else {
            Self::Permanent
        }
    }
}

/// Fixed short-backoff retry schedule for one tick.
#[derive(Debug, Clone)]
pub struct RetrySchedule {
    delays: Vec<Duration>,
}

impl Default for RetrySchedule {
    fn default() -> Self {
        Self::new(&[200, 500, 1000])
    }
}

impl RetrySchedule {
    pub fn new(delays_ms: &[u64]) -> Self {
        Self {
            delays: delays_ms.iter().map(|ms| Duration::from_millis(*ms)).collect(),
        }
    }

    /// Schedule with the first `max_retries` delays of the default ladder.
    pub fn with_max_retries(max_retries: usize) -> Self {
        let mut schedule = Self::default();
        schedule.delays.truncate(max_retries);
        schedule
    }

    /// Delay before retry `attempt` (0-indexed), or `None` once the
    /// schedule is exhausted.
    pub fn delay_for_attempt(&self, attempt: usize) -> Option<Duration> {
        self.delays.get(attempt).copied()
    }

    pub fn max_retries(&self) -> usize {
        self.delays.len()
    }
}
