//! Monitored resources (weather cameras and map loops).
//!
//! Resources are owned by the database collaborator. This crate only reads
//! them, apart from correcting recorded image dimensions.

mod solar;
mod window;

pub use solar::{solar_day, SolarDay};
pub use window::{collection_window, collects_at, CollectionWindow};

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Resource number as assigned by the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(pub i32);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What kind of source a resource is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    WeatherCamera,
    WeatherMapLoop,
    WeatherStation,
    Other,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WeatherCamera => "weather_camera",
            Self::WeatherMapLoop => "weather_map_loop",
            Self::WeatherStation => "weather_station",
            Self::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "weather_camera" => Self::WeatherCamera,
            "weather_map_loop" => Self::WeatherMapLoop,
            "weather_station" => Self::WeatherStation,
            _ => Self::Other,
        }
    }

    /// Kinds that produce hourly and day-long clips.
    pub fn is_clip_source(&self) -> bool {
        matches!(self, Self::WeatherCamera | Self::WeatherMapLoop)
    }
}

/// Capture file format of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureFormat {
    Jpeg,
    Gif,
    Png,
    Image,
    Text,
    Other,
}

impl CaptureFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Gif => "gif",
            Self::Png => "png",
            Self::Image => "image",
            Self::Text => "text",
            Self::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Self::Jpeg,
            "gif" => Self::Gif,
            "png" => Self::Png,
            "image" => Self::Image,
            "text" | "txt" => Self::Text,
            _ => Self::Other,
        }
    }

    /// Whether images of this format can be encoded into a clip.
    pub fn is_image(&self) -> bool {
        matches!(self, Self::Jpeg | Self::Gif | Self::Png | Self::Image)
    }
}

/// Which hours of the local day a resource is expected to collect data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum CollectionSpan {
    /// All day.
    FullTime,
    /// From `start_hour`:00 until the end of hour `end_hour - 1`. An end of 0 means midnight.
    SpecifiedTimes { start_hour: u32, end_hour: u32 },
    /// Whole local hours from `margin_minutes` before sunrise to `margin_minutes` after sunset.
    DaylightHours {
        latitude: f64,
        longitude: f64,
        margin_minutes: u32,
    },
}

impl CollectionSpan {
    /// Largest accepted daylight margin.
    pub const MAX_DAYLIGHT_MARGIN_MINUTES: u32 = 60;
}

/// A monitored camera or looping map feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub name: String,
    pub active: bool,
    pub kind: ResourceKind,
    pub format: CaptureFormat,
    /// Seconds between captures
    pub frequency_secs: u32,
    pub collection_span: CollectionSpan,
    pub time_zone: Tz,
    pub storage_folder: String,
    /// Local hour at which the live image dimensions are re-checked
    pub update_hour: u32,
    pub url: String,
    pub image_width: u32,
    pub image_height: u32,
}

impl Resource {
    /// Active camera or map loop.
    pub fn is_schedulable(&self) -> bool {
        self.active && self.kind.is_clip_source()
    }

    /// Images of this resource can be encoded.
    pub fn is_makeable(&self) -> bool {
        self.format.is_image()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// A full-time, active camera in UTC.
    pub fn camera(id: i32) -> Resource {
        Resource {
            id: ResourceId(id),
            name: format!("Camera {}", id),
            active: true,
            kind: ResourceKind::WeatherCamera,
            format: CaptureFormat::Jpeg,
            frequency_secs: 60,
            collection_span: CollectionSpan::FullTime,
            time_zone: chrono_tz::UTC,
            storage_folder: format!("cam{}", id),
            update_hour: 3,
            url: format!("http://cameras.invalid/{}.jpg", id),
            image_width: 640,
            image_height: 480,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::camera;
    use super::*;

    #[test]
    fn test_schedulable_requires_active_clip_source() {
        let mut r = camera(1);
        assert!(r.is_schedulable());

        r.active = false;
        assert!(!r.is_schedulable());

        r.active = true;
        r.kind = ResourceKind::WeatherStation;
        assert!(!r.is_schedulable());

        r.kind = ResourceKind::WeatherMapLoop;
        assert!(r.is_schedulable());
    }

    #[test]
    fn test_text_is_not_makeable() {
        let mut r = camera(1);
        r.format = CaptureFormat::Text;
        assert!(!r.is_makeable());
        r.format = CaptureFormat::Image;
        assert!(r.is_makeable());
    }

    #[test]
    fn test_format_parse() {
        assert_eq!(CaptureFormat::parse("JPG"), CaptureFormat::Jpeg);
        assert_eq!(CaptureFormat::parse("png"), CaptureFormat::Png);
        assert_eq!(CaptureFormat::parse("avi"), CaptureFormat::Other);
        assert_eq!(ResourceKind::parse("weather_map_loop"), ResourceKind::WeatherMapLoop);
    }
}
