//! Day-long clip job.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use super::{ClipJob, JobContext, JobFactory, JobFamily, JobOutcome, JobTick, SkipReason};
use crate::clock::{start_of_local_day, truncate_to_hour};
use crate::error::Result;
use crate::resource::{Resource, ResourceId};
use crate::services::bounded;

/// Reason tag passed to the encoder by scheduled runs.
pub const SCHEDULED_REASON: &str = "scheduled day-long update";

/// Time bounds computed for one day-long run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayLongWindow {
    pub start_of_video: DateTime<Utc>,
    pub end_of_video: DateTime<Utc>,
    pub attempted_run: DateTime<Utc>,
    pub last_possible_run: DateTime<Utc>,
}

impl DayLongWindow {
    /// Bounds come from the scheduled boundary; the attempt time is when the
    /// lane actually started the job.
    pub fn compute(resource: &Resource, tick: JobTick, last_runnable_minute: u32) -> Self {
        let hour = truncate_to_hour(tick.scheduled);
        let end_of_video = hour - Duration::milliseconds(1);
        Self {
            start_of_video: start_of_local_day(end_of_video, resource.time_zone),
            end_of_video,
            attempted_run: tick.started,
            last_possible_run: hour + Duration::minutes(last_runnable_minute as i64),
        }
    }

    pub fn expired(&self) -> bool {
        self.attempted_run > self.last_possible_run
    }
}

pub struct DayLongClipJob {
    ctx: JobContext,
    resource: Resource,
}

impl DayLongClipJob {
    pub fn new(ctx: JobContext, resource: Resource) -> Self {
        Self { ctx, resource }
    }

    fn format_time(&self, instant: DateTime<Utc>) -> String {
        instant
            .with_timezone(&self.resource.time_zone)
            .format("%m-%d-%Y %I:%M:%S %p %Z")
            .to_string()
    }

    /// Subject and body of the missed-window email.
    pub fn expired_message(&self, window: &DayLongWindow) -> (String, String) {
        let subject = format!(
            "{} Unable to Create Day-Long Video for {}",
            self.ctx.settings.brand, self.resource.name
        );
        let body = format!(
            "The server was unable to make a day-long video.  The window time during which \
             the server can make the video has expired.  Please see the details below:\n\
             Resource: {} (#{})\n\
             Start of attempted video: {}\n\
             End of attempted video: {}\n\
             Attempted run time: {}\n\
             Last possible run time: {}\n",
            self.resource.name,
            self.resource.id,
            self.format_time(window.start_of_video),
            self.format_time(window.end_of_video),
            self.format_time(window.attempted_run),
            self.format_time(window.last_possible_run),
        );
        (subject, body)
    }

    async fn notify_expired(&self, window: &DayLongWindow) {
        tracing::error!(
            resource = %self.resource.id,
            attempted = %window.attempted_run,
            last_possible = %window.last_possible_run,
            "Day-long window expired, video not made"
        );

        let (subject, body) = self.expired_message(window);
        let sent = bounded(
            "day-long email",
            self.ctx.settings.email_timeout,
            self.ctx.mailer.send_to_admins(&subject, &body),
        )
        .await;
        if let Err(e) = sent {
            tracing::error!(resource = %self.resource.id, error = %e, "Failed to email admins");
        }
    }
}

#[async_trait]
impl ClipJob for DayLongClipJob {
    fn family(&self) -> JobFamily {
        JobFamily::DayLong
    }

    fn resource_id(&self) -> ResourceId {
        self.resource.id
    }

    async fn run(&self, tick: JobTick) -> Result<JobOutcome> {
        let window = DayLongWindow::compute(
            &self.resource,
            tick,
            self.ctx.settings.last_runnable_minute(),
        );

        if window.expired() {
            self.notify_expired(&window).await;
            return Ok(JobOutcome::Expired);
        }

        let made = bounded(
            "day-long encode",
            self.ctx.settings.encode_timeout,
            self.ctx.encoder.make_day_long_clip(
                &self.resource,
                window.end_of_video,
                true,
                SCHEDULED_REASON,
            ),
        )
        .await
        .map_err(|e| {
            tracing::error!(
                resource = %self.resource.id,
                name = %self.resource.name,
                error = %e,
                "Day-long clip failed"
            );
            e
        })?;

        if made {
            tracing::info!(
                resource = %self.resource.id,
                through = %window.end_of_video,
                "Day-long clip made"
            );
            Ok(JobOutcome::Completed { stored: 2 })
        } else {
            Ok(JobOutcome::Skipped(SkipReason::NothingEncoded))
        }
    }
}

pub struct DayLongClipFactory {
    ctx: JobContext,
}

impl DayLongClipFactory {
    pub fn new(ctx: JobContext) -> Self {
        Self { ctx }
    }
}

impl JobFactory for DayLongClipFactory {
    fn family(&self) -> JobFamily {
        JobFamily::DayLong
    }

    /// Fires once the retrieval grace period has passed.
    fn offset_minutes(&self) -> u32 {
        self.ctx.settings.retrieve_grace_minutes
    }

    fn build(&self, resource: Resource) -> Arc<dyn ClipJob> {
        Arc::new(DayLongClipJob::new(self.ctx.clone(), resource))
    }
}
