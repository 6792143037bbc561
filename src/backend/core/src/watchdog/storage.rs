//! Storage availability check.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::sync::Arc;

use super::tracker::NOTIFY_INTERVAL_HOURS;
use super::{CheckContext, SystemCheck, WatchdogErrorEvent};
use crate::error::Result;
use crate::resource::Resource;
use crate::services::{bounded, ServiceName, Storage};

const ERROR: &str = "The storage system was not available.";
const ACTION: &str = "The system service was restarted.";
const INFO: &str = "This may indicate an error with the system.";
const CRITICAL_INFO: &str = "This is a critical error and may require administrator attention.";

/// Restart order after a storage failure.
pub const RESTART_ORDER: [ServiceName; 3] =
    [ServiceName::Storage, ServiceName::Retrieval, ServiceName::Movie];

#[derive(Debug, Default)]
struct FailureTimes {
    last_error: Option<DateTime<Utc>>,
    last_critical_notice: Option<DateTime<Utc>>,
}

pub struct StorageCheck {
    ctx: CheckContext,
    storage: Arc<dyn Storage>,
    interval: Duration,
    ping_timeout: std::time::Duration,
    times: Mutex<FailureTimes>,
}

impl StorageCheck {
    pub fn new(
        ctx: CheckContext,
        storage: Arc<dyn Storage>,
        interval_minutes: u32,
        ping_timeout: std::time::Duration,
    ) -> Self {
        Self {
            ctx,
            storage,
            interval: Duration::minutes(interval_minutes as i64),
            ping_timeout,
            times: Mutex::new(FailureTimes::default()),
        }
    }

    /// Decide criticality and whether to email, updating the failure times.
    ///
    /// A failure within two intervals of the previous one is critical. Critical
    /// failures email at most once a day.
    fn classify(&self, now: DateTime<Utc>) -> (bool, bool) {
        let mut times = self.times.lock();
        let critical = times
            .last_error
            .is_some_and(|last| now - last < self.interval * 2);
        let notify = !critical
            || times
                .last_critical_notice
                .map_or(true, |last| now - last > Duration::hours(NOTIFY_INTERVAL_HOURS));

        times.last_error = Some(now);
        if critical && notify {
            times.last_critical_notice = Some(now);
        }
        (critical, notify)
    }
}

#[async_trait]
impl SystemCheck for StorageCheck {
    fn service(&self) -> ServiceName {
        ServiceName::Storage
    }

    async fn is_alive(&self) -> bool {
        self.ctx.control.is_running(ServiceName::Storage).await
    }

    async fn restart(&self) -> Result<()> {
        self.ctx.restart_service(ServiceName::Storage).await
    }

    async fn run_checks(&self, _resources: &[Resource], now: DateTime<Utc>) -> Vec<WatchdogErrorEvent> {
        let error = match bounded("storage ping", self.ping_timeout, self.storage.ping()).await {
            Ok(()) => return Vec::new(),
            Err(e) => e,
        };
        tracing::warn!(error = %error, "Storage ping failed");

        let (critical, notify) = self.classify(now);
        let info = if critical { CRITICAL_INFO } else { INFO };
        let event = WatchdogErrorEvent::new(ServiceName::Storage, ERROR, ACTION, info, now);

        super::Notifier::log(&event);
        if notify {
            self.ctx.notifier.send(&event).await;
        }

        for service in RESTART_ORDER {
            let _ = self.ctx.restart_service(service).await;
        }

        vec![event]
    }
}
