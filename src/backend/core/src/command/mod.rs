//! Inbound command boundary.
//!
//! Commands arrive over HTTP (see [`api`]) or in-process from the watchdogs
//! via [`crate::services::CommandRouter`], and are executed by the
//! [`CommandHandler`].

pub mod api;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::clock::{start_of_local_day, Clock, TimeRange};
use crate::error::{ErrorCode, Result, SkyreelError};
use crate::jobs::hourly::{produce_clips, ClipProduction};
use crate::jobs::{JobContext, JobRegistry, SkipReason};
use crate::resource::{Resource, ResourceId};
use crate::services::{bounded, ClipRequest, Instance};

/// Reason tag passed to the encoder for on-demand day-long clips.
pub const REQUESTED_REASON: &str = "requested day-long update";

fn default_true() -> bool {
    true
}

/// A command addressed to a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    /// Schedule clip jobs for a resource
    Start { resource: ResourceId },
    /// Cancel clip jobs for a resource
    Stop { resource: ResourceId },
    /// Make the clips for the hour starting at `start`
    MakeHourlyClips {
        resource: ResourceId,
        start: DateTime<Utc>,
        #[serde(default)]
        length_secs: Option<u32>,
        #[serde(default)]
        codec: Option<String>,
    },
    /// Make the day-long clip for a local calendar day
    MakeDayLongClip {
        resource: ResourceId,
        day: NaiveDate,
        #[serde(default = "default_true")]
        include_low_quality: bool,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start { .. } => "START",
            Self::Stop { .. } => "STOP",
            Self::MakeHourlyClips { .. } => "MAKE_HOURLY_CLIPS",
            Self::MakeDayLongClip { .. } => "MAKE_DAY_LONG_CLIP",
        }
    }

    pub fn resource(&self) -> ResourceId {
        match self {
            Self::Start { resource }
            | Self::Stop { resource }
            | Self::MakeHourlyClips { resource, .. }
            | Self::MakeDayLongClip { resource, .. } => *resource,
        }
    }
}

/// Result of a handled command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum CommandReply {
    Scheduled {
        resource: ResourceId,
        hourly_next_run: Option<DateTime<Utc>>,
        day_long_next_run: Option<DateTime<Utc>>,
    },
    Stopped {
        resource: ResourceId,
        was_scheduled: bool,
    },
    Clips {
        resource: ResourceId,
        instances: Vec<Instance>,
    },
}

/// Executes commands against the job registries.
pub struct CommandHandler {
    hourly: Arc<JobRegistry>,
    day_long: Arc<JobRegistry>,
    ctx: JobContext,
    clock: Clock,
}

impl CommandHandler {
    pub fn new(hourly: Arc<JobRegistry>, day_long: Arc<JobRegistry>, ctx: JobContext, clock: Clock) -> Self {
        Self {
            hourly,
            day_long,
            ctx,
            clock,
        }
    }

    pub fn hourly(&self) -> &Arc<JobRegistry> {
        &self.hourly
    }

    pub fn day_long(&self) -> &Arc<JobRegistry> {
        &self.day_long
    }

    async fn lookup(&self, id: ResourceId) -> Result<Resource> {
        let resources = bounded(
            "list resources",
            self.ctx.settings.storage_timeout,
            self.ctx.database.list_resources(),
        )
        .await?;
        resources
            .into_iter()
            .find(|r| r.id == id)
            .ok_or_else(|| SkyreelError::not_found("resource", id.to_string()))
    }

    /// Schedule every schedulable resource in the database. Returns how many were scheduled.
    pub async fn schedule_all(&self) -> Result<usize> {
        let resources = self.ctx.database.list_resources().await?;
        let mut scheduled = 0;
        for resource in resources.iter().filter(|r| r.is_schedulable()) {
            self.hourly.start(resource);
            self.day_long.start(resource);
            scheduled += 1;
        }
        tracing::info!(scheduled, total = resources.len(), "Scheduled resources at startup");
        Ok(scheduled)
    }

    pub async fn handle(&self, command: Command) -> Result<CommandReply> {
        tracing::info!(command = command.name(), resource = %command.resource(), "Handling command");
        metrics::counter!("skyreel_commands_total", "command" => command.name()).increment(1);

        match command {
            Command::Start { resource } => self.start(resource).await,
            Command::Stop { resource } => Ok(self.stop(resource)),
            Command::MakeHourlyClips {
                resource,
                start,
                length_secs,
                codec,
            } => self.make_hourly_clips(resource, start, length_secs, codec).await,
            Command::MakeDayLongClip {
                resource,
                day,
                include_low_quality,
            } => self.make_day_long_clip(resource, day, include_low_quality).await,
        }
    }

    async fn start(&self, id: ResourceId) -> Result<CommandReply> {
        let resource = self.lookup(id).await?;
        // Both registries see the rejection so neither keeps an old schedule.
        let hourly = self.hourly.start(&resource);
        let day_long = self.day_long.start(&resource);
        if !(hourly && day_long) {
            return Err(SkyreelError::new(
                ErrorCode::ResourceNotSchedulable,
                format!("resource {} is inactive or does not produce clips", id),
            ));
        }
        Ok(CommandReply::Scheduled {
            resource: id,
            hourly_next_run: self.hourly.next_run(id),
            day_long_next_run: self.day_long.next_run(id),
        })
    }

    fn stop(&self, id: ResourceId) -> CommandReply {
        let hourly = self.hourly.stop(id);
        let day_long = self.day_long.stop(id);
        CommandReply::Stopped {
            resource: id,
            was_scheduled: hourly || day_long,
        }
    }

    async fn make_hourly_clips(
        &self,
        id: ResourceId,
        start: DateTime<Utc>,
        length_secs: Option<u32>,
        codec: Option<String>,
    ) -> Result<CommandReply> {
        let resource = self.lookup(id).await?;
        let request = ClipRequest {
            length_secs: length_secs.unwrap_or(self.ctx.settings.movie_length_secs),
            start,
            codec: codec.unwrap_or_else(|| self.ctx.settings.vcodec.clone()),
        };

        match produce_clips(&self.ctx, &resource, TimeRange::hour_starting(start), &request).await? {
            ClipProduction::Stored(instances) => Ok(CommandReply::Clips {
                resource: id,
                instances,
            }),
            ClipProduction::Skipped(reason) => Err(skipped_error(reason)),
        }
    }

    async fn make_day_long_clip(
        &self,
        id: ResourceId,
        day: NaiveDate,
        include_low_quality: bool,
    ) -> Result<CommandReply> {
        let resource = self.lookup(id).await?;
        let day_range = local_day(&resource, day);
        let end = day_range.end.min((self.clock)());

        let made = bounded(
            "day-long encode",
            self.ctx.settings.encode_timeout,
            self.ctx
                .encoder
                .make_day_long_clip(&resource, end, include_low_quality, REQUESTED_REASON),
        )
        .await?;
        if !made {
            return Err(skipped_error(SkipReason::NothingEncoded));
        }

        let stored = bounded(
            "fetch day-long",
            self.ctx.settings.storage_timeout,
            self.ctx.storage.fetch_day_long_instances(&resource, day_range),
        )
        .await?;
        let instances = stored.map(Vec::from).unwrap_or_default();
        Ok(CommandReply::Clips {
            resource: id,
            instances,
        })
    }
}

/// Local calendar day of `resource` as a UTC range.
pub fn local_day(resource: &Resource, day: NaiveDate) -> TimeRange {
    let noon = day.and_hms_opt(12, 0, 0).unwrap_or_default();
    let anchor = resource
        .time_zone
        .from_local_datetime(&noon)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&noon));
    let start = start_of_local_day(anchor, resource.time_zone);
    let next = start_of_local_day(anchor + Duration::days(1), resource.time_zone);
    TimeRange::new(start, next - Duration::milliseconds(1))
}

fn skipped_error(reason: SkipReason) -> SkyreelError {
    let message = match reason {
        SkipReason::OutsideCollectionWindow => "The hour is outside the collection window".to_string(),
        SkipReason::NotMakeable => "The resource format cannot be made into a clip".to_string(),
        SkipReason::InsufficientImages { found, required } => {
            format!("Not enough images to make a clip ({} of {})", found, required)
        }
        SkipReason::NothingEncoded => "No clip was produced".to_string(),
    };
    SkyreelError::new(ErrorCode::EncoderError, message)
}
