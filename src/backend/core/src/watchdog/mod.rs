//! Self-healing watchdogs.
//!
//! One [`WatchdogLoop`] runs per monitored service. Each tick reloads the
//! resource list, makes sure the service process is alive (restarting it if
//! not), then runs the service's [`SystemCheck`] over every resource.
//! Problems become [`WatchdogErrorEvent`]s: logged always, emailed to admins
//! subject to the check's [`FailureTracker`], and kept in the loop's
//! [`EventLog`].

pub mod event;
pub mod movie;
pub mod notifier;
pub mod remote_db;
pub mod retrieval;
pub mod service;
pub mod storage;
pub mod tracker;

pub use event::{EventLog, ResourceRef, WatchdogErrorEvent};
pub use movie::MovieCheck;
pub use notifier::Notifier;
pub use remote_db::RemoteDatabaseCheck;
pub use retrieval::RetrievalCheck;
pub use service::{WatchdogCollaborators, WatchdogService};
pub use storage::StorageCheck;
pub use tracker::{FailureRecord, FailureTracker};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::clock::{delay_until, first_run_at, Clock};
use crate::command::Command;
use crate::config::TickConfig;
use crate::error::Result;
use crate::resource::Resource;
use crate::services::{bounded, CommandSink, Database, ProcessControl, ServiceName};

// ═══════════════════════════════════════════════════════════════════════════════
// Check Contract
// ═══════════════════════════════════════════════════════════════════════════════

/// Service-specific behavior plugged into a [`WatchdogLoop`].
#[async_trait]
pub trait SystemCheck: Send + Sync {
    fn service(&self) -> ServiceName;

    async fn is_alive(&self) -> bool;

    /// Bring a stopped service back.
    async fn restart(&self) -> Result<()>;

    /// Inspect the system; returns the problems found.
    async fn run_checks(&self, resources: &[Resource], now: DateTime<Utc>) -> Vec<WatchdogErrorEvent>;
}

/// Collaborators shared by the checks.
#[derive(Clone)]
pub struct CheckContext {
    pub notifier: Arc<Notifier>,
    pub control: Arc<dyn ProcessControl>,
    pub commands: Arc<dyn CommandSink>,
    pub control_timeout: Duration,
}

impl CheckContext {
    /// Restart a whole service, logging failure.
    pub async fn restart_service(&self, service: ServiceName) -> Result<()> {
        tracing::warn!(service = %service, "Restarting service");
        let result = bounded("service restart", self.control_timeout, self.control.restart(service)).await;
        if let Err(e) = &result {
            tracing::error!(service = %service, error = %e, "Service restart failed");
        }
        result
    }

    /// Send STOP then START for one resource to a service's command boundary.
    pub async fn restart_resource(&self, service: ServiceName, resource: &Resource) {
        for command in [Command::Stop { resource: resource.id }, Command::Start { resource: resource.id }] {
            let sent = bounded(
                "command dispatch",
                self.control_timeout,
                self.commands.dispatch(service, command),
            )
            .await;
            if let Err(e) = sent {
                tracing::error!(
                    service = %service,
                    resource = %resource.id,
                    name = %resource.name,
                    error = %e,
                    "Could not restart resource"
                );
                return;
            }
        }
        tracing::info!(service = %service, resource = %resource.id, "Resource restarted");
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Watchdog Loop
// ═══════════════════════════════════════════════════════════════════════════════

pub const STOPPED_ERROR: &str = "The system service was stopped.";
pub const STOPPED_ACTION: &str = "The system service was restarted.";
pub const STOPPED_ACTION_FAILED: &str = "The system service could not be restarted.";
pub const STOPPED_INFO: &str = "This may indicate an error with the system.";

/// Periodic driver for one [`SystemCheck`].
pub struct WatchdogLoop {
    check: Arc<dyn SystemCheck>,
    database: Arc<dyn Database>,
    notifier: Arc<Notifier>,
    schedule: TickConfig,
    database_timeout: Duration,
    clock: Clock,
    events: EventLog,
}

impl WatchdogLoop {
    pub fn new(
        check: Arc<dyn SystemCheck>,
        database: Arc<dyn Database>,
        notifier: Arc<Notifier>,
        schedule: TickConfig,
        database_timeout: Duration,
        clock: Clock,
    ) -> Self {
        Self {
            check,
            database,
            notifier,
            schedule,
            database_timeout,
            clock,
            events: EventLog::new(),
        }
    }

    pub fn service(&self) -> ServiceName {
        self.check.service()
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    async fn load_resources(&self) -> Vec<Resource> {
        match bounded("list resources", self.database_timeout, self.database.list_resources()).await {
            Ok(resources) => resources,
            Err(e) => {
                tracing::error!(service = %self.service(), error = %e, "Unable to load resources");
                Vec::new()
            }
        }
    }

    /// Run one watchdog pass as of `now`. Returns the events it recorded.
    pub async fn tick(&self, now: DateTime<Utc>) -> Vec<WatchdogErrorEvent> {
        let service = self.service();
        tracing::info!(service = %service, "Watchdog tick");

        let resources = self.load_resources().await;
        let mut found = Vec::new();

        if !self.check.is_alive().await {
            let action = match self.check.restart().await {
                Ok(()) => STOPPED_ACTION,
                Err(e) => {
                    tracing::error!(service = %service, error = %e, "Failed to restart stopped service");
                    STOPPED_ACTION_FAILED
                }
            };
            let event = WatchdogErrorEvent::new(service, STOPPED_ERROR, action, STOPPED_INFO, now);
            self.notifier.notify(&event).await;
            metrics::counter!("skyreel_watchdog_restarts_total", "system" => service.short_name())
                .increment(1);
            found.push(event);
        }

        found.extend(self.check.run_checks(&resources, now).await);

        if !found.is_empty() {
            metrics::counter!("skyreel_watchdog_failures_total", "system" => service.short_name())
                .increment(found.len() as u64);
        }
        self.events.extend(found.iter().cloned());
        found
    }

    /// Run ticks on the configured schedule until `token` is cancelled.
    pub fn spawn(self: Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let now = (self.clock)();
            let first = first_run_at(now, self.schedule.offset_minutes);
            let period = Duration::from_secs(self.schedule.interval_minutes.max(1) as u64 * 60);
            let mut ticker = tokio::time::interval_at(Instant::now() + delay_until(now, first), period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            tracing::info!(
                service = %self.service(),
                first_tick = %first,
                interval_minutes = self.schedule.interval_minutes,
                "Watchdog scheduled"
            );

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let now = (self.clock)();
                        self.tick(now).await;
                    }
                }
            }

            tracing::info!(service = %self.service(), "Watchdog stopped");
        })
    }
}
