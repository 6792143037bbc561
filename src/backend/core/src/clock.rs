//! Time ranges and schedule boundary arithmetic.

use chrono::{DateTime, Datelike, Duration, DurationRound, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Source of the current wall-clock time.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

/// A clock frozen at `at`.
pub fn fixed_clock(at: DateTime<Utc>) -> Clock {
    Arc::new(move || at)
}

/// English month names, used in storage folder paths.
pub const MONTH_NAMES: [&str; 12] = [
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December",
];

/// Inclusive time range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// `[HH:00:00.000, HH:59:59.999]` for the hour starting at `start`.
    pub fn hour_starting(start: DateTime<Utc>) -> Self {
        Self {
            start,
            end: start + Duration::hours(1) - Duration::milliseconds(1),
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant <= self.end
    }
}

/// `instant` rounded down to the top of its hour.
pub fn truncate_to_hour(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant
        .duration_trunc(Duration::hours(1))
        .unwrap_or(instant)
}

/// The hour that fully elapsed before `now`.
///
/// A job firing at 14:00:03 references 13:00:00.000 through 13:59:59.999.
pub fn reference_hour(now: DateTime<Utc>) -> TimeRange {
    TimeRange::hour_starting(truncate_to_hour(now) - Duration::hours(1))
}

/// Whole minutes to wait from `now` until the next time the minute-of-hour
/// equals `offset`; zero when it already does.
pub fn minutes_until_offset(now: DateTime<Utc>, offset: u32) -> u32 {
    let minute = now.minute();
    let offset = offset % 60;
    if minute <= offset {
        offset - minute
    } else {
        60 + offset - minute
    }
}

/// First firing instant on a minute-of-hour boundary, counted from the start
/// of `now`'s current minute.
pub fn first_run_at(now: DateTime<Utc>, offset: u32) -> DateTime<Utc> {
    let minute_start = now
        .duration_trunc(Duration::minutes(1))
        .unwrap_or(now);
    minute_start + Duration::minutes(minutes_until_offset(now, offset) as i64)
}

/// Wall-clock delay from `now` until `at`, zero if `at` has passed.
pub fn delay_until(now: DateTime<Utc>, at: DateTime<Utc>) -> std::time::Duration {
    (at - now).to_std().unwrap_or(std::time::Duration::ZERO)
}

/// Local midnight, as a UTC instant, of the day containing `instant` in `tz`.
pub fn start_of_local_day(instant: DateTime<Utc>, tz: chrono_tz::Tz) -> DateTime<Utc> {
    let midnight = instant
        .with_timezone(&tz)
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .unwrap_or_default();
    tz.from_local_datetime(&midnight)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
}

/// Month name for a date in any zone.
pub fn month_name<Tz: TimeZone>(date: &DateTime<Tz>) -> &'static str {
    MONTH_NAMES[date.month0() as usize]
}

/// Zero-based month index for a month folder name.
pub fn month_index(name: &str) -> Option<usize> {
    MONTH_NAMES.iter().position(|m| m.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_reference_hour_is_previous_full_hour() {
        let r = reference_hour(at("2024-06-10T14:00:03Z"));
        assert_eq!(r.start, at("2024-06-10T13:00:00Z"));
        assert_eq!(r.end, at("2024-06-10T13:59:59.999Z"));

        // Still the previous hour late in the current one.
        let r = reference_hour(at("2024-06-10T14:59:59Z"));
        assert_eq!(r.start, at("2024-06-10T13:00:00Z"));
    }

    #[test]
    fn test_reference_hour_crosses_midnight() {
        let r = reference_hour(at("2024-06-11T00:00:00Z"));
        assert_eq!(r.start, at("2024-06-10T23:00:00Z"));
        assert_eq!(r.end, at("2024-06-10T23:59:59.999Z"));
    }

    #[test]
    fn test_minutes_until_offset() {
        assert_eq!(minutes_until_offset(at("2024-06-10T14:00:00Z"), 0), 0);
        assert_eq!(minutes_until_offset(at("2024-06-10T14:01:00Z"), 0), 59);
        assert_eq!(minutes_until_offset(at("2024-06-10T14:10:00Z"), 16), 6);
        assert_eq!(minutes_until_offset(at("2024-06-10T14:16:00Z"), 16), 0);
        assert_eq!(minutes_until_offset(at("2024-06-10T14:20:00Z"), 16), 56);
    }

    #[test]
    fn test_first_run_at_drops_seconds() {
        let first = first_run_at(at("2024-06-10T14:20:42Z"), 0);
        assert_eq!(first, at("2024-06-10T15:00:00Z"));

        let first = first_run_at(at("2024-06-10T14:05:30Z"), 10);
        assert_eq!(first, at("2024-06-10T14:10:00Z"));
    }

    #[test]
    fn test_start_of_local_day() {
        let tz = chrono_tz::America::New_York;
        // 02:30 UTC on the 11th is 22:30 EDT on the 10th.
        let start = start_of_local_day(at("2024-06-11T02:30:00Z"), tz);
        assert_eq!(start, at("2024-06-10T04:00:00Z"));
        assert_eq!(start_of_local_day(at("2024-06-11T02:30:00Z"), chrono_tz::UTC), at("2024-06-11T00:00:00Z"));
    }

    #[test]
    fn test_month_lookup() {
        assert_eq!(month_name(&at("2024-02-01T00:00:00Z")), "February");
        assert_eq!(month_index("december"), Some(11));
        assert_eq!(month_index("movies"), None);
    }
}
