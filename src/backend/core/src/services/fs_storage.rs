//! Filesystem media storage.
//!
//! Layout, with dates and times in the resource's own zone:
//!
//! ```text
//! <root>/<folder>/<year>/<MonthName>/<day>/<folder><YYYYMMDD>-<HHMMSS>.<ext>
//! <root>/<folder>/<year>/<MonthName>/<day>/movies/<folder><YYYYMMDD>-<HH>0000.<ext>
//! <root>/<folder>/<year>/<MonthName>/<day>/movies/<folder><YYYYMMDD>-daylong.mp4
//! ```
//!
//! The day folder is the unpadded day of the month.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use regex::Regex;
use std::path::{Path, PathBuf};

use super::{Instance, InstanceKind, MediaFormat, Storage};
use crate::clock::{TimeRange, MONTH_NAMES};
use crate::error::{ErrorCode, Result, SkyreelError};
use crate::resource::{CaptureFormat, Resource};

/// Name of the clip folder inside each day folder.
pub const MOVIES_DIR: &str = "movies";

/// Path arithmetic for the storage tree.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resource_dir(&self, folder: &str) -> PathBuf {
        self.root.join(folder)
    }

    pub fn day_dir(&self, folder: &str, date: NaiveDate) -> PathBuf {
        self.resource_dir(folder)
            .join(date.year().to_string())
            .join(MONTH_NAMES[date.month0() as usize])
            .join(date.day().to_string())
    }

    pub fn movies_dir(&self, folder: &str, date: NaiveDate) -> PathBuf {
        self.day_dir(folder, date).join(MOVIES_DIR)
    }

    /// Clip file for the local hour starting at `hour`.
    pub fn hourly_clip_path(&self, folder: &str, hour: NaiveDateTime, format: MediaFormat) -> PathBuf {
        self.movies_dir(folder, hour.date()).join(format!(
            "{}{}-{:02}0000.{}",
            folder,
            hour.format("%Y%m%d"),
            hour.hour(),
            format.extension()
        ))
    }

    pub fn day_long_path(&self, folder: &str, date: NaiveDate, low_quality: bool) -> PathBuf {
        let suffix = if low_quality { "-daylong-low" } else { "-daylong" };
        self.movies_dir(folder, date)
            .join(format!("{}{}{}.mp4", folder, date.format("%Y%m%d"), suffix))
    }

    pub fn image_path(&self, folder: &str, taken: NaiveDateTime, format: MediaFormat) -> PathBuf {
        self.day_dir(folder, taken.date()).join(format!(
            "{}{}.{}",
            folder,
            taken.format("%Y%m%d-%H%M%S"),
            format.extension()
        ))
    }
}

/// Media storage on a local or mounted filesystem.
pub struct FsStorage {
    layout: StorageLayout,
    image_name: Regex,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let image_name = Regex::new(r"^(?P<folder>.+)(?P<date>\d{8})-(?P<time>\d{6})\.(?P<ext>[A-Za-z0-9]+)$")
            .map_err(|e| SkyreelError::internal(format!("invalid image name pattern: {}", e)))?;
        Ok(Self {
            layout: StorageLayout::new(root),
            image_name,
        })
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Parse a capture file name into its UTC timestamp and format.
    fn parse_image_name(&self, folder: &str, name: &str, tz: Tz) -> Option<(DateTime<Utc>, MediaFormat)> {
        let caps = self.image_name.captures(name)?;
        if &caps["folder"] != folder {
            return None;
        }
        let format = MediaFormat::from_extension(&caps["ext"])?;
        let naive = NaiveDateTime::parse_from_str(
            &format!("{}{}", &caps["date"], &caps["time"]),
            "%Y%m%d%H%M%S",
        )
        .ok()?;
        let taken = tz.from_local_datetime(&naive).earliest()?;
        Some((taken.with_timezone(&Utc), format))
    }

    /// Local dates touched by `range` in `tz`, oldest first.
    fn local_days(range: TimeRange, tz: Tz) -> Vec<NaiveDate> {
        let first = range.start.with_timezone(&tz).date_naive();
        let last = range.end.with_timezone(&tz).date_naive();
        let mut days = Vec::new();
        let mut day = first;
        while day <= last {
            days.push(day);
            match day.succ_opt() {
                Some(next) => day = next,
                None => break,
            }
        }
        days
    }

    fn destination(&self, resource_folder: &str, tz: Tz, instance: &Instance) -> PathBuf {
        let local_start = instance.range.start.with_timezone(&tz).naive_local();
        match instance.kind {
            InstanceKind::Capture => {
                self.layout
                    .image_path(resource_folder, local_start, instance.format)
            }
            InstanceKind::HourlyClip => {
                self.layout
                    .hourly_clip_path(resource_folder, local_start, instance.format)
            }
            InstanceKind::DayLongClip => {
                self.layout
                    .day_long_path(resource_folder, local_start.date(), instance.low_quality)
            }
        }
    }
}

#[async_trait]
impl Storage for FsStorage {
    async fn fetch_instances(
        &self,
        resource: &Resource,
        range: TimeRange,
        format: CaptureFormat,
        limit: usize,
    ) -> Result<Vec<Instance>> {
        let folder = &resource.storage_folder;
        let mut found = Vec::new();

        for day in Self::local_days(range, resource.time_zone) {
            let dir = self.layout.day_dir(folder, day);
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name();
                let Some(name) = name.to_str() else { continue };
                let Some((taken, media)) = self.parse_image_name(folder, name, resource.time_zone) else {
                    continue;
                };
                if range.contains(taken) && media.matches_capture(format) {
                    found.push(Instance {
                        resource: resource.id,
                        kind: InstanceKind::Capture,
                        format: media,
                        range: TimeRange::new(taken, taken),
                        path: entry.path(),
                        low_quality: false,
                    });
                }
            }
        }

        found.sort_by_key(|i| i.range.start);
        found.truncate(limit);
        Ok(found)
    }

    async fn store(&self, resource: &Resource, instance: &Instance) -> Result<Instance> {
        let dest = self.destination(&resource.storage_folder, resource.time_zone, instance);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        if dest != instance.path {
            tokio::fs::copy(&instance.path, &dest).await?;
        }
        tracing::debug!(
            resource = %resource.id,
            path = %dest.display(),
            "Stored instance"
        );
        Ok(Instance {
            path: dest,
            ..instance.clone()
        })
    }

    async fn ping(&self) -> Result<()> {
        let meta = tokio::fs::metadata(self.layout.root()).await.map_err(|e| {
            SkyreelError::with_internal(
                ErrorCode::StorageUnavailable,
                "The storage system was not available",
                format!("{}: {}", self.layout.root().display(), e),
            )
        })?;
        if !meta.is_dir() {
            return Err(SkyreelError::with_internal(
                ErrorCode::StorageUnavailable,
                "The storage system was not available",
                format!("{} is not a directory", self.layout.root().display()),
            ));
        }
        tokio::fs::read_dir(self.layout.root()).await?;
        Ok(())
    }

    async fn fetch_day_long_instances(
        &self,
        resource: &Resource,
        day: TimeRange,
    ) -> Result<Option<[Instance; 2]>> {
        let date = day.start.with_timezone(&resource.time_zone).date_naive();
        let standard = self.layout.day_long_path(&resource.storage_folder, date, false);
        let low = self.layout.day_long_path(&resource.storage_folder, date, true);

        if !tokio::fs::try_exists(&standard).await? || !tokio::fs::try_exists(&low).await? {
            return Ok(None);
        }

        let make = |path: PathBuf, low_quality: bool| Instance {
            resource: resource.id,
            kind: InstanceKind::DayLongClip,
            format: MediaFormat::Mp4,
            range: day,
            path,
            low_quality,
        };
        Ok(Some([make(standard, false), make(low, true)]))
    }
}
