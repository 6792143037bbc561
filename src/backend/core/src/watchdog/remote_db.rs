//! Remote database proxy check.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

use super::{CheckContext, FailureTracker, SystemCheck, WatchdogErrorEvent};
use crate::error::Result;
use crate::resource::Resource;
use crate::services::{bounded, RemoteDatabase, ServiceName};

const ERROR: &str = "The system could not properly return a query.";
const ACTION: &str = "The system service was restarted.";
const INFO: &str = "This may indicate an error with the system.";
const REPEATED_PREFIX: &str = "The system has failed at least twice consecutively. ";

pub struct RemoteDatabaseCheck {
    ctx: CheckContext,
    remote: Arc<dyn RemoteDatabase>,
    query_timeout: Duration,
    tracker: FailureTracker<()>,
}

impl RemoteDatabaseCheck {
    pub fn new(ctx: CheckContext, remote: Arc<dyn RemoteDatabase>, query_timeout: Duration) -> Self {
        Self {
            ctx,
            remote,
            query_timeout,
            tracker: FailureTracker::new(),
        }
    }

    pub fn tracker(&self) -> &FailureTracker<()> {
        &self.tracker
    }
}

#[async_trait]
impl SystemCheck for RemoteDatabaseCheck {
    fn service(&self) -> ServiceName {
        ServiceName::WeatherDb
    }

    async fn is_alive(&self) -> bool {
        if !self.ctx.control.is_running(ServiceName::WeatherDb).await {
            return false;
        }
        matches!(
            bounded("remote db liveness", self.query_timeout, self.remote.server_is_running()).await,
            Ok(true)
        )
    }

    async fn restart(&self) -> Result<()> {
        tracing::warn!(service = %ServiceName::WeatherDb, "Starting service");
        bounded(
            "service start",
            self.ctx.control_timeout,
            self.ctx.control.start(ServiceName::WeatherDb),
        )
        .await
    }

    async fn run_checks(&self, _resources: &[Resource], now: DateTime<Utc>) -> Vec<WatchdogErrorEvent> {
        match bounded("remote db query", self.query_timeout, self.remote.round_trip()).await {
            Ok(()) => {
                self.tracker.record_outcome(&(), true);
                Vec::new()
            }
            Err(e) => {
                tracing::warn!(error = %e, "Remote database query failed");
                let count = self.tracker.record_outcome(&(), false);
                let info = if count >= 2 {
                    format!("{}{}", REPEATED_PREFIX, INFO)
                } else {
                    INFO.to_string()
                };
                let event = WatchdogErrorEvent::new(ServiceName::WeatherDb, ERROR, ACTION, info, now);
                self.ctx.notifier.report(&self.tracker, &(), &event).await;
                let _ = self.ctx.restart_service(ServiceName::WeatherDb).await;
                vec![event]
            }
        }
    }
}
