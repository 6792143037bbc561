//! Per-resource recurring job handles.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{JobFactory, JobFamily, SerialJobRunner};
use crate::clock::{delay_until, first_run_at, Clock};
use crate::resource::{Resource, ResourceId};

/// Period between invocations of a scheduled job.
pub const JOB_PERIOD_MINUTES: i64 = 60;

/// A live schedule for one resource.
pub struct ScheduledJobHandle {
    resource: ResourceId,
    token: CancellationToken,
    task: JoinHandle<()>,
    first_run: DateTime<Utc>,
}

impl ScheduledJobHandle {
    pub fn resource(&self) -> ResourceId {
        self.resource
    }

    /// Next firing strictly after `now`, or the first firing if still ahead.
    pub fn next_run(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        if now < self.first_run {
            return self.first_run;
        }
        let period = ChronoDuration::minutes(JOB_PERIOD_MINUTES);
        let elapsed = (now - self.first_run).num_milliseconds();
        let periods = elapsed / period.num_milliseconds() + 1;
        self.first_run + period * periods as i32
    }

    fn cancel(self) {
        self.token.cancel();
        // The timer exits on cancellation; abort covers a task parked elsewhere.
        self.task.abort();
    }
}

/// Bookkeeping of scheduled jobs for one family.
///
/// The handle map is guarded by its own mutex, independent of the lane the
/// jobs execute on.
pub struct JobRegistry {
    factory: Arc<dyn JobFactory>,
    runner: Arc<SerialJobRunner>,
    clock: Clock,
    handles: Mutex<HashMap<ResourceId, ScheduledJobHandle>>,
}

impl JobRegistry {
    pub fn new(factory: Arc<dyn JobFactory>, runner: Arc<SerialJobRunner>, clock: Clock) -> Self {
        Self {
            factory,
            runner,
            clock,
            handles: Mutex::new(HashMap::new()),
        }
    }

    pub fn family(&self) -> JobFamily {
        self.factory.family()
    }

    pub fn runner(&self) -> &Arc<SerialJobRunner> {
        &self.runner
    }

    /// Schedule recurring runs for `resource`, replacing any existing schedule.
    ///
    /// Returns false when the resource is not schedulable. Any schedule it
    /// already had is cancelled, so a deactivated resource stops running.
    pub fn start(&self, resource: &Resource) -> bool {
        let family = self.family();
        if !resource.is_schedulable() {
            let previous = self.handles.lock().remove(&resource.id);
            let dropped = previous.is_some();
            if let Some(previous) = previous {
                previous.cancel();
            }
            tracing::info!(
                family = %family,
                resource = %resource.id,
                active = resource.active,
                kind = resource.kind.as_str(),
                dropped_schedule = dropped,
                "Resource not schedulable, not starting"
            );
            return false;
        }

        let now = (self.clock)();
        let first_run = first_run_at(now, self.factory.offset_minutes());
        let delay = delay_until(now, first_run);

        let job = self.factory.build(resource.clone());
        let runner = self.runner.clone();
        let token = CancellationToken::new();
        let timer_token = token.clone();

        let task = tokio::spawn(async move {
            let period = Duration::from_secs(JOB_PERIOD_MINUTES as u64 * 60);
            let mut ticker = tokio::time::interval_at(Instant::now() + delay, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut due = first_run;
            loop {
                tokio::select! {
                    _ = timer_token.cancelled() => break,
                    _ = ticker.tick() => {
                        runner.submit(job.clone(), timer_token.clone(), due);
                        due += ChronoDuration::minutes(JOB_PERIOD_MINUTES);
                    }
                }
            }
        });

        let handle = ScheduledJobHandle {
            resource: resource.id,
            token,
            task,
            first_run,
        };

        let previous = self.handles.lock().insert(resource.id, handle);
        if let Some(previous) = previous {
            tracing::warn!(family = %family, resource = %resource.id, "Double start, replacing schedule");
            previous.cancel();
        }

        tracing::info!(
            family = %family,
            resource = %resource.id,
            name = %resource.name,
            first_run = %first_run,
            "Scheduled resource"
        );
        true
    }

    /// Cancel the schedule for `resource`. Returns whether one existed.
    pub fn stop(&self, resource: ResourceId) -> bool {
        let removed = self.handles.lock().remove(&resource);
        match removed {
            Some(handle) => {
                handle.cancel();
                tracing::info!(family = %self.family(), resource = %resource, "Stopped resource");
                true
            }
            None => {
                tracing::debug!(family = %self.family(), resource = %resource, "Stop for unscheduled resource");
                false
            }
        }
    }

    /// Resources with a live schedule, in ascending order.
    pub fn active(&self) -> Vec<ResourceId> {
        let mut ids: Vec<_> = self.handles.lock().keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.handles.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn next_run(&self, resource: ResourceId) -> Option<DateTime<Utc>> {
        let now = (self.clock)();
        self.handles.lock().get(&resource).map(|h| h.next_run(now))
    }

    /// Cancel every schedule.
    pub fn shutdown(&self) {
        let drained: Vec<_> = self.handles.lock().drain().map(|(_, h)| h).collect();
        let count = drained.len();
        for handle in drained {
            handle.cancel();
        }
        tracing::info!(family = %self.family(), cancelled = count, "Registry shut down");
    }
}

impl Drop for JobRegistry {
    fn drop(&mut self) {
        for (_, handle) in self.handles.get_mut().drain() {
            handle.cancel();
        }
    }
}
