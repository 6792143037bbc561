//! External collaborators.
//!
//! Everything slow or stateful that the scheduler and watchdogs depend on sits
//! behind one of these traits: the resource database, media storage, the clip
//! encoder, OS process control, the remote database proxy, live image probes,
//! admin email and outbound command dispatch. Each trait has one shipped
//! implementation in a sibling module; tests substitute in-memory mocks.

pub mod dispatch;
pub mod ffmpeg;
pub mod fs_storage;
pub mod postgres;
pub mod process;
pub mod probe;
pub mod remote_db;
pub mod smtp;
pub mod systemd;

pub use dispatch::CommandRouter;
pub use ffmpeg::FfmpegEncoder;
pub use fs_storage::FsStorage;
pub use postgres::PgDatabase;
pub use probe::HttpImageProbe;
pub use remote_db::HttpRemoteDatabase;
pub use smtp::{LogMailer, SmtpMailer};
pub use systemd::SystemctlControl;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use crate::clock::TimeRange;
use crate::command::Command;
use crate::error::{Result, SkyreelError};
use crate::resource::{CaptureFormat, Resource, ResourceId};

// ═══════════════════════════════════════════════════════════════════════════════
// Shared Types
// ═══════════════════════════════════════════════════════════════════════════════

/// Services monitored and controlled by the watchdogs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceName {
    Storage,
    Retrieval,
    Movie,
    WeatherDb,
}

impl ServiceName {
    /// Display name used in watchdog messages.
    pub fn short_name(&self) -> &'static str {
        match self {
            Self::Storage => "Storage",
            Self::Retrieval => "Retrieval",
            Self::Movie => "MovieMaker",
            Self::WeatherDb => "WeatherDB",
        }
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Stored media formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaFormat {
    Jpeg,
    Gif,
    Png,
    Avi,
    Mp4,
}

impl MediaFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Gif => "gif",
            Self::Png => "png",
            Self::Avi => "avi",
            Self::Mp4 => "mp4",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "gif" => Some(Self::Gif),
            "png" => Some(Self::Png),
            "avi" => Some(Self::Avi),
            "mp4" => Some(Self::Mp4),
            _ => None,
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self, Self::Avi | Self::Mp4)
    }

    /// Whether a stored file of this format matches a capture format filter.
    pub fn matches_capture(&self, capture: CaptureFormat) -> bool {
        match capture {
            CaptureFormat::Jpeg => *self == Self::Jpeg,
            CaptureFormat::Gif => *self == Self::Gif,
            CaptureFormat::Png => *self == Self::Png,
            CaptureFormat::Image => !self.is_video(),
            CaptureFormat::Text | CaptureFormat::Other => false,
        }
    }
}

/// What an instance holds. Storage files each kind in its own place.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceKind {
    /// A single captured image
    #[default]
    Capture,
    HourlyClip,
    DayLongClip,
}

/// A stored media artifact whose bytes live in a local file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub resource: ResourceId,
    #[serde(default)]
    pub kind: InstanceKind,
    pub format: MediaFormat,
    pub range: TimeRange,
    pub path: PathBuf,
    /// Reduced-quality variant (day-long clips only)
    #[serde(default)]
    pub low_quality: bool,
}

/// Output of one hourly encode. Either artifact may be missing.
#[derive(Debug, Clone, Default)]
pub struct HourlyClips {
    /// Primary clip (AVI)
    pub primary: Option<Instance>,
    /// Compatibility copy (MP4)
    pub compat: Option<Instance>,
}

impl HourlyClips {
    pub fn artifacts(&self) -> impl Iterator<Item = &Instance> {
        self.primary.iter().chain(self.compat.iter())
    }
}

/// Parameters of an hourly encode.
#[derive(Debug, Clone)]
pub struct ClipRequest {
    pub length_secs: u32,
    pub start: DateTime<Utc>,
    pub codec: String,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Collaborator Traits
// ═══════════════════════════════════════════════════════════════════════════════

/// Resource database.
#[async_trait]
pub trait Database: Send + Sync {
    async fn list_resources(&self) -> Result<Vec<Resource>>;

    /// Persist corrected image dimensions; returns the stored resource.
    async fn update_resource_dimensions(&self, resource: &Resource) -> Result<Resource>;
}

/// Media storage.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Stored instances of `format` for the resource within `range`, oldest first.
    async fn fetch_instances(
        &self,
        resource: &Resource,
        range: TimeRange,
        format: CaptureFormat,
        limit: usize,
    ) -> Result<Vec<Instance>>;

    /// Place an artifact into storage; returns it at its stored location.
    async fn store(&self, resource: &Resource, instance: &Instance) -> Result<Instance>;

    async fn ping(&self) -> Result<()>;

    /// Standard and low-quality day-long clips for the day, if both exist.
    async fn fetch_day_long_instances(
        &self,
        resource: &Resource,
        day: TimeRange,
    ) -> Result<Option<[Instance; 2]>>;
}

/// Clip encoder.
#[async_trait]
pub trait Encoder: Send + Sync {
    async fn make_hourly_clip(
        &self,
        instances: &[Instance],
        resource: &Resource,
        request: &ClipRequest,
    ) -> Result<HourlyClips>;

    /// Assemble the day ending at `end` from hourly clips and store it.
    async fn make_day_long_clip(
        &self,
        resource: &Resource,
        end: DateTime<Utc>,
        include_low_quality: bool,
        reason: &str,
    ) -> Result<bool>;
}

/// OS-level service control.
#[async_trait]
pub trait ProcessControl: Send + Sync {
    async fn is_running(&self, service: ServiceName) -> bool;
    async fn restart(&self, service: ServiceName) -> Result<()>;
    async fn start(&self, service: ServiceName) -> Result<()>;
}

/// Remote database proxy.
#[async_trait]
pub trait RemoteDatabase: Send + Sync {
    /// Lightweight liveness query.
    async fn server_is_running(&self) -> Result<bool>;

    /// Issue a resource list query; must yield a non-error response.
    async fn round_trip(&self) -> Result<()>;
}

/// Live image source probe.
#[async_trait]
pub trait ImageProbe: Send + Sync {
    /// Fetch the current image and return its pixel width and height.
    async fn dimensions(&self, url: &str) -> Result<(u32, u32)>;
}

/// Admin email.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_to_admins(&self, subject: &str, body: &str) -> Result<()>;
}

/// Outbound commands to a service's command boundary.
#[async_trait]
pub trait CommandSink: Send + Sync {
    async fn dispatch(&self, service: ServiceName, command: Command) -> Result<()>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════════════════════════

/// Bound a collaborator call by a timeout.
pub async fn bounded<T, F>(operation: &str, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(SkyreelError::timeout(operation, limit)),
    }
}
