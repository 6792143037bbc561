//! Collection windows in a resource's own time zone.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

use super::solar::{solar_day, SolarDay};
use super::{CollectionSpan, Resource};

/// Inclusive start and end of the collection period on one local day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl CollectionWindow {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant <= self.end
    }
}

/// Collection window for the local day containing `instant`.
pub fn collection_window(resource: &Resource, instant: DateTime<Utc>) -> CollectionWindow {
    let tz = resource.time_zone;
    let day = instant.with_timezone(&tz).date_naive();

    match resource.collection_span {
        CollectionSpan::FullTime => hours_window(tz, day, 0, 24),
        CollectionSpan::SpecifiedTimes {
            start_hour,
            end_hour,
        } => {
            let end = if end_hour == 0 { 24 } else { end_hour.min(24) };
            hours_window(tz, day, start_hour.min(23), end)
        }
        CollectionSpan::DaylightHours {
            latitude,
            longitude,
            margin_minutes,
        } => daylight_window(tz, day, latitude, longitude, margin_minutes),
    }
}

/// Whether the resource is expected to collect at `instant`.
pub fn collects_at(resource: &Resource, instant: DateTime<Utc>) -> bool {
    match resource.collection_span {
        CollectionSpan::FullTime => true,
        _ => collection_window(resource, instant).contains(instant),
    }
}

fn hours_window(tz: Tz, day: NaiveDate, start_hour: u32, end_hour: u32) -> CollectionWindow {
    CollectionWindow {
        start: local_hour(tz, day, start_hour),
        end: local_hour(tz, day, end_hour) - Duration::milliseconds(1),
    }
}

/// From the hour holding sunrise minus the margin through the end of the hour
/// holding sunset plus the margin, kept inside the local day. Days without a
/// sunrise or sunset collect around the clock.
fn daylight_window(
    tz: Tz,
    day: NaiveDate,
    latitude: f64,
    longitude: f64,
    margin_minutes: u32,
) -> CollectionWindow {
    let whole_day = hours_window(tz, day, 0, 24);
    let SolarDay::Normal { sunrise, sunset } = solar_day(day, latitude, longitude) else {
        return whole_day;
    };

    let margin = Duration::minutes(i64::from(
        margin_minutes.min(CollectionSpan::MAX_DAYLIGHT_MARGIN_MINUTES),
    ));
    let first = (sunrise - margin).clamp(whole_day.start, whole_day.end);
    let last = (sunset + margin).clamp(whole_day.start, whole_day.end);

    CollectionWindow {
        start: local_hour(tz, day, first.with_timezone(&tz).hour()),
        end: local_hour(tz, day, last.with_timezone(&tz).hour() + 1) - Duration::milliseconds(1),
    }
}

/// `hour`:00 on `day` in `tz`; hour 24 is midnight of the next day.
fn local_hour(tz: Tz, day: NaiveDate, hour: u32) -> DateTime<Utc> {
    let (day, hour) = if hour >= 24 {
        (day.succ_opt().unwrap_or(day), 0)
    } else {
        (day, hour)
    };
    let naive = day.and_time(NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or_default());

    // Nonexistent local times (spring forward) fall through to the next hour.
    match tz.from_local_datetime(&naive) {
        chrono::LocalResult::Single(dt) => dt.with_timezone(&Utc),
        chrono::LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        chrono::LocalResult::None => {
            let shifted = naive + Duration::hours(1);
            tz.from_local_datetime(&shifted)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
        }
    }
}
