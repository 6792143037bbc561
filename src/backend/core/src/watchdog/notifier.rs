//! Admin notification for watchdog events.

use chrono::Local;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use super::{FailureTracker, WatchdogErrorEvent};
use crate::services::{bounded, Mailer};

pub struct Notifier {
    mailer: Arc<dyn Mailer>,
    timeout: Duration,
}

impl Notifier {
    pub fn new(mailer: Arc<dyn Mailer>, timeout: Duration) -> Self {
        Self { mailer, timeout }
    }

    pub fn subject(event: &WatchdogErrorEvent) -> String {
        match &event.resource {
            Some(resource) => format!(
                "Server Watchdog: Error on {} for resource {}",
                event.system, resource.name
            ),
            None => format!("Server Watchdog: {} System Error", event.system),
        }
    }

    /// Event details shared by the log line and the email body.
    pub fn details(event: &WatchdogErrorEvent) -> String {
        let local = event.timestamp.with_timezone(&Local);
        let mut message = format!(
            "The server watchdog has found an error.\nSystem: {}\n",
            event.system
        );
        if let Some(resource) = &event.resource {
            message.push_str(&format!("Resource: {}, {}\n", resource.name, resource.id));
        }
        message.push_str(&format!(
            "Error: {}\nAction: {}\nDate: {}\nTime: {}\n\n{}\n",
            event.error,
            event.action,
            local.format("%m-%d-%Y"),
            local.format("%I:%M:%S %p"),
            event.info
        ));
        message
    }

    pub fn body(event: &WatchdogErrorEvent) -> String {
        format!(
            "This is an automated message from the Server Watchdog.\n{}",
            Self::details(event)
        )
    }

    /// Log the event at error level.
    pub fn log(event: &WatchdogErrorEvent) {
        tracing::error!(
            system = %event.system,
            resource = ?event.resource.as_ref().map(|r| r.id),
            error = %event.error,
            action = %event.action,
            "{}",
            Self::details(event)
        );
    }

    /// Email the event to admins. Send failures are logged, not returned.
    pub async fn send(&self, event: &WatchdogErrorEvent) {
        let subject = Self::subject(event);
        let body = Self::body(event);
        match bounded("watchdog email", self.timeout, self.mailer.send_to_admins(&subject, &body)).await {
            Ok(()) => {
                metrics::counter!(
                    "skyreel_watchdog_notifications_total",
                    "system" => event.system.short_name()
                )
                .increment(1);
                tracing::debug!(subject = %subject, "Administrators notified");
            }
            Err(e) => tracing::error!(subject = %subject, error = %e, "Error emailing admins"),
        }
    }

    /// Log and email.
    pub async fn notify(&self, event: &WatchdogErrorEvent) {
        Self::log(event);
        self.send(event).await;
    }

    /// Log, then email only if the tracker allows it for `key`.
    pub async fn report<K: Eq + Hash + Clone>(
        &self,
        tracker: &FailureTracker<K>,
        key: &K,
        event: &WatchdogErrorEvent,
    ) {
        Self::log(event);
        if tracker.should_notify(key, event.timestamp) {
            self.send(event).await;
        } else {
            tracing::debug!(system = %event.system, "Notification suppressed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::fixtures::camera;
    use crate::services::ServiceName;
    use chrono::{DateTime, Utc};

    fn event() -> WatchdogErrorEvent {
        WatchdogErrorEvent::new(
            ServiceName::Retrieval,
            "A resource malfunctioned.",
            "Retrieval of the resource was restarted.",
            "Extra info",
            DateTime::parse_from_rfc3339("2024-06-10T13:05:09Z")
                .unwrap()
                .with_timezone(&Utc),
        )
    }

    #[test]
    fn test_subjects() {
        assert_eq!(
            Notifier::subject(&event()),
            "Server Watchdog: Retrieval System Error"
        );
        let with_resource = event().for_resource(&camera(4));
        assert_eq!(
            Notifier::subject(&with_resource),
            "Server Watchdog: Error on Retrieval for resource Camera 4"
        );
    }

    #[test]
    fn test_body_layout() {
        let body = Notifier::body(&event().for_resource(&camera(4)));
        assert!(body.starts_with(
            "This is an automated message from the Server Watchdog.\n\
             The server watchdog has found an error.\n\
             System: Retrieval\n\
             Resource: Camera 4, 4\n\
             Error: A resource malfunctioned.\n\
             Action: Retrieval of the resource was restarted.\n\
             Date: "
        ));
        assert!(body.contains("\nTime: "));
        assert!(body.ends_with("M\n\nExtra info\n"));
    }
}
