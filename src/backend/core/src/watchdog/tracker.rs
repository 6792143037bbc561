//! Consecutive-failure counting and notification gating.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;

use crate::resource::ResourceId;

/// Minimum spacing between repeated notifications for one key.
pub const NOTIFY_INTERVAL_HOURS: i64 = 24;

/// Failure count at which a problem is escalated.
pub const ESCALATION_COUNT: u32 = 2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailureRecord {
    pub count: u32,
    pub last_notified: Option<DateTime<Utc>>,
}

/// Per-key failure counters for one check.
///
/// Keys are usually resources; service-level checks use `()`.
#[derive(Debug)]
pub struct FailureTracker<K = ResourceId> {
    records: Mutex<HashMap<K, FailureRecord>>,
}

impl<K> Default for FailureTracker<K> {
    fn default() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone> FailureTracker<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset on success, increment on failure. Returns the new count.
    pub fn record_outcome(&self, key: &K, success: bool) -> u32 {
        let mut records = self.records.lock();
        let record = records.entry(key.clone()).or_default();
        if success {
            record.count = 0;
        } else {
            record.count = record.count.saturating_add(1);
        }
        record.count
    }

    /// Whether an admin should be told about this failure now.
    ///
    /// True when the count just reached the escalation point, when the key has
    /// never notified, or when a day has passed since it last did. A true
    /// answer records `now` as the last notification.
    pub fn should_notify(&self, key: &K, now: DateTime<Utc>) -> bool {
        let mut records = self.records.lock();
        let record = records.entry(key.clone()).or_default();
        let notify = record.count == ESCALATION_COUNT
            || match record.last_notified {
                None => true,
                Some(last) => now - last >= Duration::hours(NOTIFY_INTERVAL_HOURS),
            };
        if notify {
            record.last_notified = Some(now);
        }
        notify
    }

    pub fn escalate(&self, key: &K) -> bool {
        self.count(key) >= ESCALATION_COUNT
    }

    pub fn count(&self, key: &K) -> u32 {
        self.records.lock().get(key).map_or(0, |r| r.count)
    }

    pub fn record(&self, key: &K) -> Option<FailureRecord> {
        self.records.lock().get(key).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_failures_then_success_resets() {
        let tracker = FailureTracker::new();
        let key = ResourceId(1);
        for expected in 1..=5 {
            assert_eq!(tracker.record_outcome(&key, false), expected);
        }
        assert!(tracker.escalate(&key));
        assert_eq!(tracker.record_outcome(&key, true), 0);
        assert!(!tracker.escalate(&key));
        assert_eq!(tracker.count(&key), 0);
    }

    #[test]
    fn test_notification_suppressed_within_a_day() {
        let tracker = FailureTracker::new();
        let key = ResourceId(1);

        tracker.record_outcome(&key, false);
        assert!(tracker.should_notify(&key, at("2024-06-10T10:00:00Z")));

        // Count 2 always notifies.
        tracker.record_outcome(&key, false);
        assert!(tracker.should_notify(&key, at("2024-06-10T11:00:00Z")));

        tracker.record_outcome(&key, false);
        assert!(!tracker.should_notify(&key, at("2024-06-10T12:00:00Z")));
        assert!(!tracker.should_notify(&key, at("2024-06-11T10:59:59Z")));
        assert!(tracker.should_notify(&key, at("2024-06-11T11:00:00Z")));
    }

    #[test]
    fn test_keys_are_independent() {
        let tracker = FailureTracker::new();
        tracker.record_outcome(&ResourceId(1), false);
        tracker.record_outcome(&ResourceId(1), false);
        assert_eq!(tracker.count(&ResourceId(2)), 0);
        assert!(tracker.should_notify(&ResourceId(2), at("2024-06-10T10:00:00Z")));
    }

    #[test]
    fn test_unit_key_for_service_checks() {
        let tracker: FailureTracker<()> = FailureTracker::new();
        tracker.record_outcome(&(), false);
        tracker.record_outcome(&(), false);
        assert!(tracker.escalate(&()));
    }
}
