use crate::error::{config_error, AppResult, SkipReason};
use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use std::fmt;
use std::time::Duration;

/// Timestamp layout of `start.dateTime` values: no zone, fractional seconds
pub const EVENT_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

const NANOS_PER_SEC: i128 = 1_000_000_000;

/// Bucket size used to align polling and to match events
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Interval {
    nanos: i64,
}

impl Interval {
    /// Create an interval, rejecting zero and spans that overflow nanoseconds
    pub fn new(duration: Duration) -> AppResult<Self> {
        let nanos = i64::try_from(duration.as_nanos())
            .map_err(|_| config_error("Interval is too large"))?;
        if nanos <= 0 {
            return Err(config_error("Interval must be a positive duration"));
        }
        Ok(Self { nanos })
    }

    pub fn from_secs(secs: u64) -> AppResult<Self> {
        Self::new(Duration::from_secs(secs))
    }

    pub fn from_minutes(minutes: u32) -> AppResult<Self> {
        Self::new(Duration::from_secs(u64::from(minutes) * 60))
    }

    pub fn from_hours(hours: u32) -> AppResult<Self> {
        Self::new(Duration::from_secs(u64::from(hours) * 3600))
    }

    /// The interval as a chrono delta
    pub fn as_delta(&self) -> TimeDelta {
        TimeDelta::nanoseconds(self.nanos)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.nanos / 1_000_000_000;
        if self.nanos % 1_000_000_000 != 0 {
            write!(f, "{}ms", self.nanos / 1_000_000)
        } else if secs % 3600 == 0 {
            write!(f, "{}h", secs / 3600)
        } else if secs % 60 == 0 {
            write!(f, "{}m", secs / 60)
        } else {
            write!(f, "{}s", secs)
        }
    }
}

/// Floor `t` to the start of its bucket, counted from the Unix epoch
pub fn truncate(t: DateTime<Utc>, interval: Interval) -> DateTime<Utc> {
    let stamp = i128::from(t.timestamp()) * NANOS_PER_SEC + i128::from(t.timestamp_subsec_nanos());
    // rem_euclid keeps pre-epoch instants flooring downwards
    let offset = stamp.rem_euclid(i128::from(interval.nanos)) as i64;
    t - TimeDelta::nanoseconds(offset)
}

/// True when both instants fall in the same bucket
pub fn is_same_bucket(t1: DateTime<Utc>, t2: DateTime<Utc>, interval: Interval) -> bool {
    truncate(t1, interval) == truncate(t2, interval)
}

/// First bucket boundary strictly after `now`
pub fn next_boundary(now: DateTime<Utc>, interval: Interval) -> DateTime<Utc> {
    truncate(now, interval) + interval.as_delta()
}

/// Parse a zone-less event timestamp as UTC
pub fn parse_event_time(value: &str) -> Result<DateTime<Utc>, SkipReason> {
    NaiveDateTime::parse_from_str(value, EVENT_TIME_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|source| SkipReason::InvalidStart {
            value: value.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 14, h, m, s).unwrap()
    }

    #[test]
    fn test_interval_rejects_zero() {
        assert!(Interval::new(Duration::ZERO).is_err());
        assert!(Interval::from_minutes(0).is_err());
        assert!(Interval::new(Duration::from_secs(u64::MAX)).is_err());
        assert!(Interval::new(Duration::from_nanos(1)).is_ok());
    }

    #[test]
    fn test_interval_display() {
        assert_eq!(Interval::from_minutes(5).unwrap().to_string(), "5m");
        assert_eq!(Interval::from_hours(1).unwrap().to_string(), "1h");
        assert_eq!(Interval::from_secs(90).unwrap().to_string(), "90s");
    }

    #[test]
    fn test_truncate() {
        let minute = Interval::from_minutes(1).unwrap();
        let five = Interval::from_minutes(5).unwrap();
        let hour = Interval::from_hours(1).unwrap();
        let t = at(3, 7, 42) + TimeDelta::milliseconds(250);

        assert_eq!(truncate(t, minute), at(3, 7, 0));
        assert_eq!(truncate(t, five), at(3, 5, 0));
        assert_eq!(truncate(t, hour), at(3, 0, 0));
        // Already on a boundary
        assert_eq!(truncate(at(3, 5, 0), five), at(3, 5, 0));
    }

    #[test]
    fn test_truncate_before_epoch() {
        let minute = Interval::from_minutes(1).unwrap();
        let t = Utc.with_ymd_and_hms(1969, 12, 31, 23, 59, 30).unwrap();
        assert_eq!(truncate(t, minute), Utc.with_ymd_and_hms(1969, 12, 31, 23, 59, 0).unwrap());
    }

    #[test]
    fn test_same_bucket_is_reflexive_and_symmetric() {
        for interval in [
            Interval::from_secs(1).unwrap(),
            Interval::from_minutes(1).unwrap(),
            Interval::from_minutes(5).unwrap(),
            Interval::from_hours(1).unwrap(),
        ] {
            let a = at(3, 3, 10);
            let b = at(3, 3, 40);
            assert!(is_same_bucket(a, a, interval));
            assert_eq!(is_same_bucket(a, b, interval), is_same_bucket(b, a, interval));
        }
    }

    #[test]
    fn test_bucket_boundaries() {
        // (interval, bucket start, last second of bucket)
        let cases = [
            (Interval::from_minutes(1).unwrap(), at(3, 3, 0), at(3, 3, 59)),
            (Interval::from_minutes(5).unwrap(), at(3, 5, 0), at(3, 9, 59)),
            (Interval::from_hours(1).unwrap(), at(3, 0, 0), at(3, 59, 59)),
        ];

        for (interval, start, last) in cases {
            let now = start + TimeDelta::seconds(1);
            let before = start - TimeDelta::seconds(1);
            let after = start + interval.as_delta();

            assert!(!is_same_bucket(before, now, interval), "{} before", interval);
            assert!(is_same_bucket(start, now, interval), "{} start", interval);
            assert!(is_same_bucket(last, now, interval), "{} last", interval);
            assert!(!is_same_bucket(after, now, interval), "{} after", interval);
        }
    }

    #[test]
    fn test_next_boundary() {
        let minute = Interval::from_minutes(1).unwrap();
        assert_eq!(next_boundary(at(3, 3, 20), minute), at(3, 4, 0));
        // Strictly after, even on a boundary
        assert_eq!(next_boundary(at(3, 4, 0), minute), at(3, 5, 0));

        let five = Interval::from_minutes(5).unwrap();
        assert_eq!(next_boundary(at(3, 58, 1), five), at(4, 0, 0));
    }

    #[test]
    fn test_parse_event_time() {
        let parsed = parse_event_time("2024-05-14T03:03:00.0000000").unwrap();
        assert_eq!(parsed, at(3, 3, 0));

        let parsed = parse_event_time("2024-05-14T09:30:15.5000000").unwrap();
        assert_eq!(parsed, at(9, 30, 15) + TimeDelta::milliseconds(500));

        assert!(matches!(
            parse_event_time("14.05.2024 09:30"),
            Err(SkipReason::InvalidStart { .. })
        ));
        assert!(parse_event_time("").is_err());
    }
}
