//! Hourly clip job.
//!
//! Each run encodes the images of the hour that fully elapsed before it fired,
//! so a run at 14:00:03 produces the 13:00 clip.

use async_trait::async_trait;
use chrono::Timelike;
use parking_lot::Mutex;
use std::sync::Arc;

use super::{ClipJob, JobContext, JobFactory, JobFamily, JobOutcome, JobTick, SkipReason};
use crate::clock::{reference_hour, TimeRange};
use crate::error::Result;
use crate::resource::{collection_window, CollectionSpan, Resource, ResourceId, ResourceKind};
use crate::services::{bounded, ClipRequest, Instance};

/// Result of producing the clips for one hour.
#[derive(Debug, Clone)]
pub enum ClipProduction {
    Stored(Vec<Instance>),
    Skipped(SkipReason),
}

pub struct HourlyClipJob {
    ctx: JobContext,
    resource: Mutex<Resource>,
}

impl HourlyClipJob {
    pub fn new(ctx: JobContext, resource: Resource) -> Self {
        Self {
            ctx,
            resource: Mutex::new(resource),
        }
    }

    /// Current view of the resource, including adopted dimensions.
    pub fn resource(&self) -> Resource {
        self.resource.lock().clone()
    }

    /// Re-probe the live image size and persist it if it changed.
    async fn check_dimensions(&self, resource: &mut Resource) {
        let probed = bounded(
            "image probe",
            self.ctx.settings.probe_timeout,
            self.ctx.probe.dimensions(&resource.url),
        )
        .await;

        let (width, height) = match probed {
            Ok(dims) => dims,
            Err(e) => {
                tracing::warn!(resource = %resource.id, error = %e, "Dimension probe failed");
                return;
            }
        };

        if width == 0 || height == 0 {
            return;
        }
        if width == resource.image_width && height == resource.image_height {
            return;
        }

        let mut updated = resource.clone();
        updated.image_width = width;
        updated.image_height = height;

        match self.ctx.database.update_resource_dimensions(&updated).await {
            Ok(stored) => {
                tracing::info!(
                    resource = %resource.id,
                    width = stored.image_width,
                    height = stored.image_height,
                    "Updated resource dimensions"
                );
                resource.image_width = stored.image_width;
                resource.image_height = stored.image_height;
            }
            Err(e) => {
                tracing::error!(resource = %resource.id, error = %e, "Failed to update resource dimensions");
            }
        }
    }
}

/// Minimum number of images needed to make a clip for `resource`.
pub fn required_instances(ctx: &JobContext, resource: &Resource) -> usize {
    match resource.kind {
        ResourceKind::WeatherMapLoop => ctx.settings.map_loop_min_instances,
        _ => ctx.settings.camera_min_instances,
    }
}

/// Fetch, validate, encode and store the clips for `hour`.
pub async fn produce_clips(
    ctx: &JobContext,
    resource: &Resource,
    hour: TimeRange,
    request: &ClipRequest,
) -> Result<ClipProduction> {
    if !resource.is_makeable() {
        tracing::warn!(
            resource = %resource.id,
            format = resource.format.as_str(),
            "Resource format cannot be made into a clip"
        );
        return Ok(ClipProduction::Skipped(SkipReason::NotMakeable));
    }

    let required = required_instances(ctx, resource);

    let instances = bounded(
        "fetch instances",
        ctx.settings.storage_timeout,
        ctx.storage
            .fetch_instances(resource, hour, resource.format, ctx.settings.max_instances),
    )
    .await
    .map_err(|e| {
        tracing::error!(
            resource = %resource.id,
            name = %resource.name,
            expected_min = required,
            actual = 0,
            error = %e,
            "Unable to fetch images for clip"
        );
        e
    })?;

    if instances.len() < required {
        tracing::info!(
            resource = %resource.id,
            name = %resource.name,
            expected_min = required,
            actual = instances.len(),
            hour = %hour.start,
            "Not enough images to make a clip"
        );
        return Ok(ClipProduction::Skipped(SkipReason::InsufficientImages {
            found: instances.len(),
            required,
        }));
    }

    let clips = bounded(
        "hourly encode",
        ctx.settings.encode_timeout,
        ctx.encoder.make_hourly_clip(&instances, resource, request),
    )
    .await
    .map_err(|e| {
        tracing::error!(
            resource = %resource.id,
            name = %resource.name,
            expected_min = required,
            actual = instances.len(),
            error = %e,
            "Clip encode failed"
        );
        e
    })?;

    let mut stored = Vec::new();
    for artifact in clips.artifacts() {
        let result = bounded(
            "store clip",
            ctx.settings.storage_timeout,
            ctx.storage.store(resource, artifact),
        )
        .await;
        match result {
            Ok(instance) => stored.push(instance),
            Err(e) => tracing::error!(
                resource = %resource.id,
                format = artifact.format.extension(),
                error = %e,
                "Failed to store clip"
            ),
        }
    }

    if stored.is_empty() {
        tracing::warn!(resource = %resource.id, hour = %hour.start, "No clip artifacts stored");
        return Ok(ClipProduction::Skipped(SkipReason::NothingEncoded));
    }
    Ok(ClipProduction::Stored(stored))
}

#[async_trait]
impl ClipJob for HourlyClipJob {
    fn family(&self) -> JobFamily {
        JobFamily::Hourly
    }

    fn resource_id(&self) -> ResourceId {
        self.resource.lock().id
    }

    async fn run(&self, tick: JobTick) -> Result<JobOutcome> {
        let mut resource = self.resource();

        let local_hour = tick.scheduled.with_timezone(&resource.time_zone).hour();
        if local_hour == resource.update_hour {
            self.check_dimensions(&mut resource).await;
            *self.resource.lock() = resource.clone();
        }

        let hour = reference_hour(tick.scheduled);

        if resource.collection_span != CollectionSpan::FullTime {
            if !collection_window(&resource, hour.start).contains(hour.start) {
                tracing::debug!(resource = %resource.id, hour = %hour.start, "Outside collection window");
                return Ok(JobOutcome::Skipped(SkipReason::OutsideCollectionWindow));
            }
        }

        let request = ClipRequest {
            length_secs: self.ctx.settings.movie_length_secs,
            start: hour.start,
            codec: self.ctx.settings.vcodec.clone(),
        };

        match produce_clips(&self.ctx, &resource, hour, &request).await? {
            ClipProduction::Stored(stored) => {
                tracing::info!(
                    resource = %resource.id,
                    hour = %hour.start,
                    stored = stored.len(),
                    "Hourly clip made"
                );
                Ok(JobOutcome::Completed {
                    stored: stored.len(),
                })
            }
            ClipProduction::Skipped(reason) => Ok(JobOutcome::Skipped(reason)),
        }
    }
}

pub struct HourlyClipFactory {
    ctx: JobContext,
}

impl HourlyClipFactory {
    pub fn new(ctx: JobContext) -> Self {
        Self { ctx }
    }
}

impl JobFactory for HourlyClipFactory {
    fn family(&self) -> JobFamily {
        JobFamily::Hourly
    }

    fn offset_minutes(&self) -> u32 {
        0
    }

    fn build(&self, resource: Resource) -> Arc<dyn ClipJob> {
        Arc::new(HourlyClipJob::new(self.ctx.clone(), resource))
    }
}
