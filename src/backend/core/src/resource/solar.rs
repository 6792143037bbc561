//! Sunrise and sunset from the NOAA solar position equations.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};

/// Solar zenith at sunrise and sunset, including refraction.
const SUNRISE_ZENITH_DEG: f64 = 90.833;

/// Sunrise and sunset for one calendar day at one location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolarDay {
    Normal {
        sunrise: DateTime<Utc>,
        sunset: DateTime<Utc>,
    },
    /// The sun stays below the horizon.
    PolarNight,
    /// The sun stays above the horizon.
    MidnightSun,
}

/// Sunrise and sunset on `day` at the given coordinates (degrees, east positive).
pub fn solar_day(day: NaiveDate, latitude: f64, longitude: f64) -> SolarDay {
    let t = julian_century(day);

    let mean_long = (280.46646 + t * (36000.76983 + t * 0.0003032)).rem_euclid(360.0);
    let mean_anom = 357.52911 + t * (35999.05029 - 0.0001537 * t);
    let eccent = 0.016708634 - t * (0.000042037 + 0.0000001267 * t);

    let eq_of_center = sin_deg(mean_anom) * (1.914602 - t * (0.004817 + 0.000014 * t))
        + sin_deg(2.0 * mean_anom) * (0.019993 - 0.000101 * t)
        + sin_deg(3.0 * mean_anom) * 0.000289;
    let omega = 125.04 - 1934.136 * t;
    let apparent_long = mean_long + eq_of_center - 0.00569 - 0.00478 * sin_deg(omega);

    let mean_obliq =
        23.0 + (26.0 + (21.448 - t * (46.815 + t * (0.00059 - t * 0.001813))) / 60.0) / 60.0;
    let obliq = mean_obliq + 0.00256 * cos_deg(omega);
    let declination = (sin_deg(obliq) * sin_deg(apparent_long)).asin().to_degrees();

    let y = (obliq / 2.0).to_radians().tan().powi(2);
    let eq_of_time = 4.0
        * (y * sin_deg(2.0 * mean_long) - 2.0 * eccent * sin_deg(mean_anom)
            + 4.0 * eccent * y * sin_deg(mean_anom) * cos_deg(2.0 * mean_long)
            - 0.5 * y * y * sin_deg(4.0 * mean_long)
            - 1.25 * eccent * eccent * sin_deg(2.0 * mean_anom))
        .to_degrees();

    let cos_hour_angle = cos_deg(SUNRISE_ZENITH_DEG) / (cos_deg(latitude) * cos_deg(declination))
        - tan_deg(latitude) * tan_deg(declination);
    if cos_hour_angle > 1.0 {
        return SolarDay::PolarNight;
    }
    if cos_hour_angle < -1.0 {
        return SolarDay::MidnightSun;
    }
    let hour_angle = cos_hour_angle.acos().to_degrees();

    // Minutes after 00:00 UTC on `day`.
    let solar_noon = 720.0 - 4.0 * longitude - eq_of_time;
    let midnight = day.and_time(NaiveTime::MIN).and_utc();
    let at = |minutes: f64| midnight + Duration::seconds((minutes * 60.0).round() as i64);

    SolarDay::Normal {
        sunrise: at(solar_noon - 4.0 * hour_angle),
        sunset: at(solar_noon + 4.0 * hour_angle),
    }
}

/// Julian centuries since J2000.0, taken at noon UTC of `day`.
fn julian_century(day: NaiveDate) -> f64 {
    // 1970-01-01 is day 719_163 counted from 0001-01-01; JD 2440587.5 is its midnight.
    let unix_days = f64::from(day.num_days_from_ce() - 719_163);
    let julian_day = 2_440_588.0 + unix_days;
    (julian_day - 2_451_545.0) / 36_525.0
}

fn sin_deg(deg: f64) -> f64 {
    deg.to_radians().sin()
}

fn cos_deg(deg: f64) -> f64 {
    deg.to_radians().cos()
}

fn tan_deg(deg: f64) -> f64 {
    deg.to_radians().tan()
}
