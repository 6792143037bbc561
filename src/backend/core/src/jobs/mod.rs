//! Recurring clip jobs.
//!
//! Two job families run per schedulable resource:
//!
//! - **Hourly**: encode the previous hour's images into a clip, at the top of every hour
//! - **Day-long**: assemble today's hourly clips into one video, shortly after every hour
//!
//! ```text
//! ┌──────────────┐  start/stop   ┌──────────────┐  each tick   ┌─────────────────┐
//! │   Command    │──────────────▶│ JobRegistry  │─────────────▶│ SerialJobRunner │
//! │   Handler    │               │ (per family) │   submit     │   (width 1)     │
//! └──────────────┘               └──────────────┘              └────────┬────────┘
//!                                                                       │ run(tick)
//!                                                        ┌──────────────┴───────────┐
//!                                                        │ HourlyClipJob            │
//!                                                        │ DayLongClipJob           │
//!                                                        └──────────────────────────┘
//! ```
//!
//! Registries own the per-resource timers; runners own execution. Stopping a
//! resource cancels its timer and any of its invocations still queued, but
//! never interrupts one that is already running.

pub mod day_long;
pub mod hourly;
pub mod registry;
pub mod runner;

pub use day_long::{DayLongClipFactory, DayLongClipJob};
pub use hourly::{HourlyClipFactory, HourlyClipJob};
pub use registry::{JobRegistry, ScheduledJobHandle};
pub use runner::{RunnerStats, SerialJobRunner};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::Result;
use crate::resource::{Resource, ResourceId};
use crate::services::{Database, Encoder, ImageProbe, Mailer, Storage};

// ═══════════════════════════════════════════════════════════════════════════════
// Job Types
// ═══════════════════════════════════════════════════════════════════════════════

/// Job family; each has its own registry and execution lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobFamily {
    Hourly,
    DayLong,
}

impl JobFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hourly => "hourly",
            Self::DayLong => "day_long",
        }
    }
}

impl fmt::Display for JobFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a job finished without producing anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    OutsideCollectionWindow,
    NotMakeable,
    InsufficientImages { found: usize, required: usize },
    NothingEncoded,
}

/// Result of one job invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    /// Artifacts were stored
    Completed { stored: usize },
    /// Nothing to do this hour
    Skipped(SkipReason),
    /// The day-long window had passed; admins were notified
    Expired,
}

impl JobOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed { .. } => "completed",
            Self::Skipped(_) => "skipped",
            Self::Expired => "expired",
        }
    }
}

/// Timing of one invocation.
///
/// A job queued behind a slow one starts late; the data it covers is still
/// chosen from `scheduled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobTick {
    /// Boundary the timer fired for
    pub scheduled: DateTime<Utc>,
    /// Wall clock when the lane picked the job up
    pub started: DateTime<Utc>,
}

impl JobTick {
    /// An invocation that starts exactly when it was due.
    pub fn on_time(at: DateTime<Utc>) -> Self {
        Self {
            scheduled: at,
            started: at,
        }
    }

    /// How long the invocation waited in the lane.
    pub fn lag(&self) -> chrono::Duration {
        self.started - self.scheduled
    }
}

/// One schedulable unit of work bound to a resource.
#[async_trait]
pub trait ClipJob: Send + Sync {
    fn family(&self) -> JobFamily;

    fn resource_id(&self) -> ResourceId;

    /// Execute the invocation described by `tick`.
    async fn run(&self, tick: JobTick) -> Result<JobOutcome>;
}

/// Builds the job a registry schedules for a resource.
pub trait JobFactory: Send + Sync {
    fn family(&self) -> JobFamily;

    /// Minute past the hour at which the job fires.
    fn offset_minutes(&self) -> u32;

    fn build(&self, resource: Resource) -> Arc<dyn ClipJob>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// Shared Job Context
// ═══════════════════════════════════════════════════════════════════════════════

/// Tunables used by clip jobs.
#[derive(Debug, Clone)]
pub struct ClipSettings {
    pub camera_min_instances: usize,
    pub map_loop_min_instances: usize,
    pub max_instances: usize,
    pub movie_length_secs: u32,
    pub vcodec: String,
    pub retrieve_grace_minutes: u32,
    pub day_long_max_wait_minutes: u32,
    pub brand: String,
    pub probe_timeout: Duration,
    pub storage_timeout: Duration,
    pub encode_timeout: Duration,
    pub email_timeout: Duration,
}

impl Default for ClipSettings {
    fn default() -> Self {
        Self {
            camera_min_instances: 1,
            map_loop_min_instances: 1,
            max_instances: 360,
            movie_length_secs: 12,
            vcodec: "mpeg4".to_string(),
            retrieve_grace_minutes: 10,
            day_long_max_wait_minutes: 30,
            brand: "Skyreel".to_string(),
            probe_timeout: Duration::from_secs(10),
            storage_timeout: Duration::from_secs(60),
            encode_timeout: Duration::from_secs(900),
            email_timeout: Duration::from_secs(30),
        }
    }
}

impl ClipSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            camera_min_instances: config.jobs.camera_min_instances,
            map_loop_min_instances: config.jobs.map_loop_min_instances,
            max_instances: config.storage.max_instances,
            movie_length_secs: config.encoder.movie_length_secs,
            vcodec: config.encoder.vcodec.clone(),
            retrieve_grace_minutes: config.jobs.retrieve_grace_minutes,
            day_long_max_wait_minutes: config.jobs.day_long_max_wait_minutes,
            brand: config.jobs.brand.clone(),
            probe_timeout: config.jobs.probe_timeout(),
            storage_timeout: config.storage.timeout(),
            encode_timeout: config.encoder.timeout(),
            email_timeout: config.email.timeout(),
        }
    }

    /// Latest minute of the hour at which a day-long assembly may start.
    pub fn last_runnable_minute(&self) -> u32 {
        self.retrieve_grace_minutes + self.day_long_max_wait_minutes
    }
}

/// Collaborators and settings shared by every clip job.
#[derive(Clone)]
pub struct JobContext {
    pub settings: ClipSettings,
    pub database: Arc<dyn Database>,
    pub storage: Arc<dyn Storage>,
    pub encoder: Arc<dyn Encoder>,
    pub probe: Arc<dyn ImageProbe>,
    pub mailer: Arc<dyn Mailer>,
}

pub(crate) fn record_outcome(family: JobFamily, outcome: &Result<JobOutcome>) {
    let label = match outcome {
        Ok(o) => o.label(),
        Err(_) => "failed",
    };
    metrics::counter!(
        "skyreel_jobs_total",
        "family" => family.as_str(),
        "outcome" => label
    )
    .increment(1);
}
