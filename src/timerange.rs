//! Query time-range token parsing.
//!
//! The read API accepts `1h`, `24h`, `7d` style relative tokens and
//! `custom:START,END` with ISO-8601 bounds. Ranges are clamped to a
//! configurable maximum look-back so a single query cannot scan the whole
//! store.

use chrono::{DateTime, Duration, Utc};

use crate::error::{Result, SkywardenError};

/// Maximum look-back for relative and custom ranges, hours (7 days).
pub const MAX_RANGE_HOURS: i64 = 168;

/// A resolved query time range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Parse a range token relative to `now`.
    ///
    /// # Errors
    ///
    /// Returns [`SkywardenError::InvalidTimeRange`] for unknown tokens and
    /// malformed or inverted custom ranges.
    pub fn parse(token: &str, now: DateTime<Utc>) -> Result<Self> {
        let range = if let Some(bounds) = token.strip_prefix("custom:") {
            Self::parse_custom(token, bounds)?
        } else {
            let hours = Self::parse_relative(token)?;
            Self {
                start: now - Duration::hours(hours),
                end: now,
            }
        };

        // Clamp to the maximum look-back.
        let floor = now - Duration::hours(MAX_RANGE_HOURS);
        Ok(Self {
            start: range.start.max(floor),
            end: range.end,
        })
    }

    fn parse_relative(token: &str) -> Result<i64> {
        let err = || SkywardenError::InvalidTimeRange(token.to_string());

        if let Some(h) = token.strip_suffix('h') {
            let hours: i64 = h.parse().map_err(|_| err())?;
            if hours < 1 {
                return Err(err());
            }
            Ok(hours)
        } else if let Some(d) = token.strip_suffix('d') {
            let days: i64 = d.parse().map_err(|_| err())?;
            if days < 1 {
                return Err(err());
            }
            Ok(days * 24)
        } else {
            Err(err())
        }
    }

    fn parse_custom(token: &str, bounds: &str) -> Result<Self> {
        let err = || SkywardenError::InvalidTimeRange(token.to_string());

        let (start_str, end_str) = bounds.split_once(',').ok_or_else(err)?;
        let start = parse_iso(start_str).ok_or_else(err)?;
        let end = parse_iso(end_str).ok_or_else(err)?;
        if end <= start {
            return Err(err());
        }
        Ok(Self { start, end })
    }

    /// Window length in whole seconds.
    pub fn duration_secs(&self) -> i64 {
        (self.end - self.start).num_seconds()
    }
}

fn parse_iso(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    // RFC 3339 first, then a bare `YYYY-MM-DDTHH:MM:SS` assumed UTC.
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
                .map(|naive| naive.and_utc())
                .ok()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_relative_tokens() {
        let range = TimeRange::parse("1h", now()).unwrap();
        assert_eq!(range.end, now());
        assert_eq!(range.duration_secs(), 3600);

        let range = TimeRange::parse("24h", now()).unwrap();
        assert_eq!(range.duration_secs(), 86_400);

        let range = TimeRange::parse("7d", now()).unwrap();
        assert_eq!(range.duration_secs(), 7 * 86_400);

        let range = TimeRange::parse("3d", now()).unwrap();
        assert_eq!(range.duration_secs(), 3 * 86_400);
    }

    #[test]
    fn test_clamped_to_max_range() {
        let range = TimeRange::parse("720h", now()).unwrap();
        assert_eq!(range.duration_secs(), MAX_RANGE_HOURS * 3600);
    }

    #[test]
    fn test_custom_range() {
        let range = TimeRange::parse("custom:2025-06-01T08:00:00,2025-06-01T10:30:00", now()).unwrap();
        assert_eq!(range.start, Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap());
        assert_eq!(range.end, Utc.with_ymd_and_hms(2025, 6, 1, 10, 30, 0).unwrap());
    }

    #[test]
    fn test_custom_range_with_zulu() {
        let range = TimeRange::parse("custom:2025-06-01T08:00:00Z,2025-06-01T09:00:00Z", now()).unwrap();
        assert_eq!(range.duration_secs(), 3600);
    }

    #[test]
    fn test_invalid_tokens() {
        for token in ["yesterday", "h", "0h", "-1h", "1w", "custom:", "custom:2025-06-01T08:00:00"] {
            assert!(
                TimeRange::parse(token, now()).is_err(),
                "token {token:?} should fail"
            );
        }
    }

    #[test]
    fn test_inverted_custom_range_rejected() {
        let result = TimeRange::parse("custom:2025-06-01T10:00:00,2025-06-01T08:00:00", now());
        assert!(result.is_err());
    }
}
