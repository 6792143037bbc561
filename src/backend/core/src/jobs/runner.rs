//! Single-worker execution lane.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{record_outcome, ClipJob, JobFamily, JobTick};
use crate::clock::Clock;
use crate::error::SkyreelError;

/// Counters for one lane.
#[derive(Debug, Clone, Default)]
pub struct RunnerStats {
    pub submitted: Arc<AtomicU64>,
    pub completed: Arc<AtomicU64>,
    pub failed: Arc<AtomicU64>,
    pub skipped: Arc<AtomicU64>,
}

impl RunnerStats {
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Submitted jobs not yet finished or skipped.
    pub fn pending(&self) -> u64 {
        self.submitted()
            .saturating_sub(self.completed() + self.failed() + self.skipped())
    }

    pub fn snapshot(&self) -> RunnerSnapshot {
        RunnerSnapshot {
            submitted: self.submitted(),
            completed: self.completed(),
            failed: self.failed(),
            skipped: self.skipped(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunnerSnapshot {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub skipped: u64,
}

struct QueuedJob {
    job: Arc<dyn ClipJob>,
    token: CancellationToken,
    scheduled: DateTime<Utc>,
}

/// FIFO lane that runs at most one job at a time.
///
/// Jobs whose token is cancelled while queued are dropped when they reach the
/// head of the queue. A job that fails or panics is logged and the lane moves on.
pub struct SerialJobRunner {
    family: JobFamily,
    queue: mpsc::UnboundedSender<QueuedJob>,
    stats: RunnerStats,
    shutdown: CancellationToken,
}

impl SerialJobRunner {
    /// Create the lane and spawn its worker.
    pub fn start(family: JobFamily, clock: Clock) -> Arc<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<QueuedJob>();
        let stats = RunnerStats::default();
        let shutdown = CancellationToken::new();

        let worker_stats = stats.clone();
        let worker_shutdown = shutdown.clone();
        tokio::spawn(async move {
            tracing::info!(family = %family, "Job lane started");

            loop {
                let queued = tokio::select! {
                    _ = worker_shutdown.cancelled() => break,
                    next = rx.recv() => match next {
                        Some(queued) => queued,
                        None => break,
                    },
                };

                let resource = queued.job.resource_id();
                if queued.token.is_cancelled() {
                    tracing::debug!(family = %family, resource = %resource, "Skipping cancelled job");
                    worker_stats.skipped.fetch_add(1, Ordering::Relaxed);
                    continue;
                }

                let job = queued.job.clone();
                let tick = JobTick {
                    scheduled: queued.scheduled,
                    started: clock(),
                };
                if tick.lag() >= chrono::Duration::minutes(1) {
                    tracing::warn!(
                        family = %family,
                        resource = %resource,
                        scheduled = %tick.scheduled,
                        lag_secs = tick.lag().num_seconds(),
                        "Job started late"
                    );
                }
                // Spawned so a panic in the job body cannot take the lane down.
                let result = match tokio::spawn(async move { job.run(tick).await }).await {
                    Ok(result) => result,
                    Err(join) => Err(SkyreelError::from(join)),
                };
                record_outcome(family, &result);

                match result {
                    Ok(outcome) => {
                        tracing::debug!(
                            family = %family,
                            resource = %resource,
                            outcome = outcome.label(),
                            "Job finished"
                        );
                        worker_stats.completed.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        tracing::error!(
                            family = %family,
                            resource = %resource,
                            error = %e,
                            "Job failed"
                        );
                        worker_stats.failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }

            tracing::info!(family = %family, "Job lane stopped");
        });

        Arc::new(Self {
            family,
            queue: tx,
            stats,
            shutdown,
        })
    }

    /// Enqueue the invocation due at `scheduled`, guarded by `token`.
    pub fn submit(&self, job: Arc<dyn ClipJob>, token: CancellationToken, scheduled: DateTime<Utc>) {
        self.stats.submitted.fetch_add(1, Ordering::Relaxed);
        let queued = QueuedJob {
            job,
            token,
            scheduled,
        };
        if self.queue.send(queued).is_err() {
            tracing::warn!(family = %self.family, "Job lane closed, submission dropped");
            self.stats.skipped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn family(&self) -> JobFamily {
        self.family
    }

    pub fn stats(&self) -> &RunnerStats {
        &self.stats
    }

    /// Stop the worker after its current job.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}
