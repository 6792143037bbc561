//! Movie-making check.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use super::{CheckContext, FailureTracker, SystemCheck, WatchdogErrorEvent};
use crate::clock::reference_hour;
use crate::error::Result;
use crate::resource::{collects_at, Resource};
use crate::services::fs_storage::StorageLayout;
use crate::services::{bounded, ImageProbe, MediaFormat, ServiceName, Storage};

/// Error, per-resource action, escalated service action.
struct Problem {
    error: &'static str,
    action: &'static str,
    escalated_action: &'static str,
}

const URL_ERROR: Problem = Problem {
    error: "The Resource URL is not producing images.",
    action: "No action taken.",
    escalated_action: "No action taken.",
};

const NO_IMAGES: Problem = Problem {
    error: "No images were available to make a movie.",
    action: "Collection and movie making were restarted for the resource.",
    escalated_action: "Retrieval and MovieMaker systems were restarted.",
};

const NO_MOVIE: Problem = Problem {
    error: "No movie was made.",
    action: "Movie making was restarted for the resource.",
    escalated_action: "The MovieMaker system was restarted.",
};

const RESOURCE_INFO: &str = "This may indicate an error with the resource or the system. \
                             This message will be sent once daily until the issue is resolved.";
const ESCALATED_PREFIX: &str = "This resource has failed at least twice in a row. ";

pub struct MovieCheck {
    ctx: CheckContext,
    storage: Arc<dyn Storage>,
    probe: Arc<dyn ImageProbe>,
    layout: StorageLayout,
    tracker: FailureTracker,
    probe_timeout: std::time::Duration,
    storage_timeout: std::time::Duration,
}

impl MovieCheck {
    pub fn new(
        ctx: CheckContext,
        storage: Arc<dyn Storage>,
        probe: Arc<dyn ImageProbe>,
        layout: StorageLayout,
        probe_timeout: std::time::Duration,
        storage_timeout: std::time::Duration,
    ) -> Self {
        Self {
            ctx,
            storage,
            probe,
            layout,
            tracker: FailureTracker::new(),
            probe_timeout,
            storage_timeout,
        }
    }

    pub fn tracker(&self) -> &FailureTracker {
        &self.tracker
    }

    async fn url_produces_images(&self, resource: &Resource) -> bool {
        match bounded("url probe", self.probe_timeout, self.probe.dimensions(&resource.url)).await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(resource = %resource.id, error = %e, "Resource URL probe failed");
                false
            }
        }
    }

    /// Whether any image was stored during the hour before `now`.
    async fn has_images(&self, resource: &Resource, now: DateTime<Utc>) -> bool {
        let fetched = bounded(
            "fetch instances",
            self.storage_timeout,
            self.storage
                .fetch_instances(resource, reference_hour(now), resource.format, 1),
        )
        .await;
        matches!(fetched, Ok(instances) if !instances.is_empty())
    }

    /// Whether the hourly clip for the local hour one hour before `now` exists.
    async fn has_movie(&self, resource: &Resource, now: DateTime<Utc>) -> bool {
        let hour = (now - Duration::hours(1))
            .with_timezone(&resource.time_zone)
            .naive_local();
        let path = self
            .layout
            .hourly_clip_path(&resource.storage_folder, hour, MediaFormat::Avi);
        tokio::fs::try_exists(&path).await.unwrap_or(false)
    }

    async fn fail(
        &self,
        resource: &Resource,
        problem: &Problem,
        now: DateTime<Utc>,
    ) -> (WatchdogErrorEvent, u32) {
        let count = self.tracker.record_outcome(&resource.id, false);
        let (action, info) = if self.tracker.escalate(&resource.id) {
            (problem.escalated_action, format!("{}{}", ESCALATED_PREFIX, RESOURCE_INFO))
        } else {
            (problem.action, RESOURCE_INFO.to_string())
        };
        let event = WatchdogErrorEvent::new(ServiceName::Movie, problem.error, action, info, now)
            .for_resource(resource);
        self.ctx.notifier.report(&self.tracker, &resource.id, &event).await;
        (event, count)
    }
}

#[async_trait]
impl SystemCheck for MovieCheck {
    fn service(&self) -> ServiceName {
        ServiceName::Movie
    }

    async fn is_alive(&self) -> bool {
        self.ctx.control.is_running(ServiceName::Movie).await
    }

    async fn restart(&self) -> Result<()> {
        self.ctx.restart_service(ServiceName::Movie).await
    }

    async fn run_checks(&self, resources: &[Resource], now: DateTime<Utc>) -> Vec<WatchdogErrorEvent> {
        let mut events = Vec::new();
        let mut restart_retrieval = false;
        let mut restart_movie = false;
        let hour_ago = now - Duration::hours(1);

        for resource in resources {
            if !resource.is_schedulable() || !collects_at(resource, now) {
                continue;
            }

            if !self.url_produces_images(resource).await {
                let (event, _) = self.fail(resource, &URL_ERROR, now).await;
                events.push(event);
                continue;
            }

            let collected_last_hour = collects_at(resource, hour_ago);

            if collected_last_hour && !self.has_images(resource, now).await {
                let (event, count) = self.fail(resource, &NO_IMAGES, now).await;
                events.push(event);
                self.ctx.restart_resource(ServiceName::Retrieval, resource).await;
                self.ctx.restart_resource(ServiceName::Movie, resource).await;
                if count >= 2 {
                    restart_retrieval = true;
                    restart_movie = true;
                }
                continue;
            }

            if collected_last_hour && !self.has_movie(resource, now).await {
                let (event, count) = self.fail(resource, &NO_MOVIE, now).await;
                events.push(event);
                self.ctx.restart_resource(ServiceName::Movie, resource).await;
                if count >= 2 {
                    restart_movie = true;
                }
                continue;
            }

            self.tracker.record_outcome(&resource.id, true);
        }

        // Failures are already logged by restart_service.
        if restart_retrieval {
            let _ = self.ctx.restart_service(ServiceName::Retrieval).await;
        }
        if restart_movie {
            let _ = self.ctx.restart_service(ServiceName::Movie).await;
        }

        events
    }
}
