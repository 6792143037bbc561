//! Watchdog error events and the per-loop event log.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::resource::{Resource, ResourceId};
use crate::services::ServiceName;

/// Resource named by an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceRef {
    pub name: String,
    pub id: ResourceId,
}

impl From<&Resource> for ResourceRef {
    fn from(resource: &Resource) -> Self {
        Self {
            name: resource.name.clone(),
            id: resource.id,
        }
    }
}

/// One problem found by a watchdog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatchdogErrorEvent {
    pub system: ServiceName,
    pub error: String,
    pub action: String,
    pub info: String,
    pub resource: Option<ResourceRef>,
    pub timestamp: DateTime<Utc>,
}

impl WatchdogErrorEvent {
    pub fn new(
        system: ServiceName,
        error: impl Into<String>,
        action: impl Into<String>,
        info: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            system,
            error: error.into(),
            action: action.into(),
            info: info.into(),
            resource: None,
            timestamp,
        }
    }

    pub fn for_resource(mut self, resource: &Resource) -> Self {
        self.resource = Some(resource.into());
        self
    }
}

/// Append-only event list, always ordered by timestamp.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<WatchdogErrorEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert after any events with the same or earlier timestamp.
    pub fn push(&self, event: WatchdogErrorEvent) {
        let mut events = self.events.lock();
        let at = events.partition_point(|e| e.timestamp <= event.timestamp);
        events.insert(at, event);
    }

    pub fn extend(&self, events: impl IntoIterator<Item = WatchdogErrorEvent>) {
        for event in events {
            self.push(event);
        }
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<WatchdogErrorEvent> {
        self.events.lock().clone()
    }
}
