//! Retrieval check: every collecting resource must have a recent capture.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use super::{CheckContext, FailureTracker, SystemCheck, WatchdogErrorEvent};
use crate::clock::month_index;
use crate::error::Result;
use crate::resource::{collects_at, Resource};
use crate::services::fs_storage::{StorageLayout, MOVIES_DIR};
use crate::services::ServiceName;

const ERROR: &str = "A resource malfunctioned.";
const ERROR_REPEATED: &str = "A resource malfunctioned twice in a row";
const ACTION: &str = "Retrieval of the resource was restarted.";
const ACTION_REPEATED: &str = "The retrieval system was restarted";
const INFO: &str = "The resource has not stored a new capture within its expected interval. \
                    This message will be sent once daily until the issue is resolved.";

pub struct RetrievalCheck {
    ctx: CheckContext,
    layout: StorageLayout,
    tolerance_factor: u64,
    tracker: FailureTracker,
}

impl RetrievalCheck {
    pub fn new(ctx: CheckContext, layout: StorageLayout, tolerance_factor: u64) -> Self {
        Self {
            ctx,
            layout,
            tolerance_factor,
            tracker: FailureTracker::new(),
        }
    }

    pub fn tracker(&self) -> &FailureTracker {
        &self.tracker
    }

    /// Longest gap between captures before the resource counts as failed.
    pub fn tolerance(&self, resource: &Resource) -> Duration {
        Duration::milliseconds(resource.frequency_secs as i64 * self.tolerance_factor as i64 * 1000)
    }

    /// Milliseconds since the resource last stored a capture.
    async fn capture_age(&self, resource: &Resource, now: DateTime<Utc>) -> Duration {
        let layout = self.layout.clone();
        let folder = resource.storage_folder.clone();
        let latest = tokio::task::spawn_blocking(move || most_recent_capture(&layout, &folder))
            .await
            .ok()
            .flatten()
            .unwrap_or(UNIX_EPOCH);
        let latest: DateTime<Utc> = latest.into();
        now - latest
    }
}

#[async_trait]
impl SystemCheck for RetrievalCheck {
    fn service(&self) -> ServiceName {
        ServiceName::Retrieval
    }

    async fn is_alive(&self) -> bool {
        self.ctx.control.is_running(ServiceName::Retrieval).await
    }

    async fn restart(&self) -> Result<()> {
        self.ctx.restart_service(ServiceName::Retrieval).await
    }

    async fn run_checks(&self, resources: &[Resource], now: DateTime<Utc>) -> Vec<WatchdogErrorEvent> {
        let mut events = Vec::new();
        let mut restart_system = false;

        for resource in resources {
            if !resource.active || !collects_at(resource, now) {
                self.tracker.record_outcome(&resource.id, true);
                continue;
            }

            let age = self.capture_age(resource, now).await;
            if age <= self.tolerance(resource) {
                self.tracker.record_outcome(&resource.id, true);
                continue;
            }

            tracing::warn!(
                resource = %resource.id,
                age_ms = age.num_milliseconds(),
                tolerance_ms = self.tolerance(resource).num_milliseconds(),
                "Capture overdue"
            );

            let count = self.tracker.record_outcome(&resource.id, false);
            let (error, action) = if count >= 2 {
                restart_system = true;
                (ERROR_REPEATED, ACTION_REPEATED)
            } else {
                (ERROR, ACTION)
            };
            let event = WatchdogErrorEvent::new(ServiceName::Retrieval, error, action, INFO, now)
                .for_resource(resource);
            self.ctx.notifier.report(&self.tracker, &resource.id, &event).await;
            events.push(event);

            self.ctx.restart_resource(ServiceName::Retrieval, resource).await;
        }

        if restart_system {
            let _ = self.ctx.restart_service(ServiceName::Retrieval).await;
        }

        events
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Storage Tree Scan
// ═══════════════════════════════════════════════════════════════════════════════

/// Entry names in `dir`, sorted. Empty if unreadable.
fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .into_iter()
        .flatten()
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();
    names.sort();
    names
}

/// Latest `<year>/<Month>/<day>` folder date under a resource folder.
fn latest_day(resource_dir: &Path) -> Option<NaiveDate> {
    let year = entries(resource_dir)
        .iter()
        .filter_map(|name| name.parse::<i32>().ok())
        .max()?;
    let year_dir = resource_dir.join(year.to_string());
    let month = entries(&year_dir)
        .iter()
        .filter_map(|name| month_index(name))
        .max()?;
    let month_dir = year_dir.join(crate::clock::MONTH_NAMES[month]);
    let day = entries(&month_dir)
        .iter()
        .filter_map(|name| name.parse::<u32>().ok())
        .max()?;
    NaiveDate::from_ymd_opt(year, month as u32 + 1, day)
}

/// Last capture file in a day folder, by name.
fn last_capture(day_dir: &Path) -> Option<String> {
    entries(day_dir).into_iter().filter(|name| name != MOVIES_DIR).last()
}

/// Modification time of the newest capture for `folder`.
///
/// Looks at the latest day folder, falling back one day when it has no
/// captures yet (shortly after midnight).
pub fn most_recent_capture(layout: &StorageLayout, folder: &str) -> Option<SystemTime> {
    let day = latest_day(&layout.resource_dir(folder))?;
    let mut day_dir = layout.day_dir(folder, day);
    let name = match last_capture(&day_dir) {
        Some(name) => name,
        None => {
            day_dir = layout.day_dir(folder, day.pred_opt()?);
            last_capture(&day_dir)?
        }
    };
    fs::metadata(day_dir.join(name)).and_then(|m| m.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{File, FileTimes};

    fn touch(path: &Path, modified: SystemTime) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let file = File::create(path).unwrap();
        file.set_times(FileTimes::new().set_modified(modified)).unwrap();
    }

    fn secs(s: u64) -> SystemTime {
        UNIX_EPOCH + std::time::Duration::from_secs(s)
    }

    #[test]
    fn test_picks_latest_year_month_day() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path());
        let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day).unwrap();

        touch(&layout.day_dir("cam", d(2023, 12, 31)).join("cam20231231-235900.jpg"), secs(100));
        touch(&layout.day_dir("cam", d(2024, 2, 9)).join("cam20240209-120000.jpg"), secs(200));
        touch(&layout.day_dir("cam", d(2024, 2, 10)).join("cam20240210-080000.jpg"), secs(300));
        touch(&layout.day_dir("cam", d(2024, 2, 10)).join("cam20240210-090000.jpg"), secs(400));
        // "January" sorts before "February" alphabetically but not by month.
        touch(&layout.day_dir("cam", d(2024, 1, 30)).join("cam20240130-120000.jpg"), secs(500));
        fs::create_dir_all(layout.movies_dir("cam", d(2024, 2, 10))).unwrap();

        assert_eq!(most_recent_capture(&layout, "cam"), Some(secs(400)));
    }

    #[test]
    fn test_empty_day_falls_back_to_previous_month() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path());
        let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day).unwrap();

        touch(&layout.day_dir("cam", d(2024, 2, 29)).join("cam20240229-235900.jpg"), secs(700));
        fs::create_dir_all(layout.day_dir("cam", d(2024, 3, 1))).unwrap();

        assert_eq!(most_recent_capture(&layout, "cam"), Some(secs(700)));
    }

    #[test]
    fn test_missing_tree() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path());
        assert_eq!(most_recent_capture(&layout, "nothing"), None);
    }
}
