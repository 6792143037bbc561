//! Watchdog checks and loops against in-memory collaborators.
//!
//! Tests cover:
//! - Stopped-service detection and restart
//! - Movie check problem classification and per-resource restarts
//! - Retrieval capture-age tolerance and escalation
//! - Storage criticality, restart order and email rate limiting
//! - Remote database query failures
//! - Notification suppression

mod common;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use common::*;
use skyreel_core::clock::fixed_clock;
use skyreel_core::command::Command;
use skyreel_core::config::TickConfig;
use skyreel_core::resource::Resource;
use skyreel_core::services::fs_storage::StorageLayout;
use skyreel_core::services::{MediaFormat, ServiceName};
use skyreel_core::watchdog::{
    CheckContext, MovieCheck, Notifier, RemoteDatabaseCheck, RetrievalCheck, StorageCheck,
    SystemCheck, WatchdogLoop, STOPPED_ACTION, STOPPED_ACTION_FAILED, STOPPED_ERROR,
};
use std::fs::{File, FileTimes};
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

struct Fixture {
    mailer: Arc<MockMailer>,
    control: Arc<MockControl>,
    sink: Arc<MockSink>,
    ctx: CheckContext,
}

impl Fixture {
    fn new() -> Self {
        let mailer = Arc::new(MockMailer::default());
        let control = Arc::new(MockControl::default());
        let sink = Arc::new(MockSink::default());
        let ctx = CheckContext {
            notifier: Arc::new(Notifier::new(mailer.clone(), Duration::from_secs(5))),
            control: control.clone(),
            commands: sink.clone(),
            control_timeout: Duration::from_secs(5),
        };
        Self {
            mailer,
            control,
            sink,
            ctx,
        }
    }

    fn watchdog(&self, check: Arc<dyn SystemCheck>, resources: Vec<Resource>) -> WatchdogLoop {
        WatchdogLoop::new(
            check,
            MockDatabase::with(resources),
            self.ctx.notifier.clone(),
            TickConfig::new(15, 0),
            Duration::from_secs(5),
            fixed_clock(at("2024-06-10T12:00:00Z")),
        )
    }

    fn restart_pair(service: ServiceName, resource: &Resource) -> Vec<(ServiceName, Command)> {
        vec![
            (service, Command::Stop { resource: resource.id }),
            (service, Command::Start { resource: resource.id }),
        ]
    }
}

fn touch(path: &Path, modified: DateTime<Utc>) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let file = File::create(path).unwrap();
    file.set_times(FileTimes::new().set_modified(SystemTime::from(modified)))
        .unwrap();
}

// ============================================================================
// Loop Tests
// ============================================================================

#[tokio::test]
async fn test_stopped_service_is_restarted_and_reported() {
    let fx = Fixture::new();
    fx.control.stop(ServiceName::Storage);
    let storage = Arc::new(MockStorage::default());
    let check = Arc::new(StorageCheck::new(fx.ctx.clone(), storage, 15, Duration::from_secs(5)));
    let watchdog = fx.watchdog(check, Vec::new());

    let events = watchdog.tick(at("2024-06-10T12:12:00Z")).await;

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].error, STOPPED_ERROR);
    assert_eq!(events[0].action, STOPPED_ACTION);
    assert_eq!(fx.control.calls(), vec![ControlCall::Restart(ServiceName::Storage)]);
    assert_eq!(fx.mailer.subjects(), vec!["Server Watchdog: Storage System Error"]);
    assert_eq!(watchdog.events().len(), 1);
}

#[tokio::test]
async fn test_failed_restart_changes_action() {
    let fx = Fixture::new();
    fx.control.stop(ServiceName::Movie);
    fx.control.restart_fails.store(true, Ordering::SeqCst);
    let check = Arc::new(MovieCheck::new(
        fx.ctx.clone(),
        Arc::new(MockStorage::default()),
        MockProbe::returning(Some((640, 480))),
        StorageLayout::new("/nonexistent"),
        Duration::from_secs(5),
        Duration::from_secs(5),
    ));
    let watchdog = fx.watchdog(check, Vec::new());

    let events = watchdog.tick(at("2024-06-10T12:16:00Z")).await;
    assert_eq!(events[0].action, STOPPED_ACTION_FAILED);
}

#[tokio::test]
async fn test_database_failure_still_checks_service() {
    let fx = Fixture::new();
    let database = MockDatabase::with(vec![camera(1)]);
    database.fail.store(true, Ordering::SeqCst);
    let check = Arc::new(RemoteDatabaseCheck::new(fx.ctx.clone(), MockRemote::healthy(), Duration::from_secs(5)));
    let watchdog = WatchdogLoop::new(
        check,
        database,
        fx.ctx.notifier.clone(),
        TickConfig::new(15, 5),
        Duration::from_secs(5),
        fixed_clock(at("2024-06-10T12:00:00Z")),
    );

    assert!(watchdog.tick(at("2024-06-10T12:05:00Z")).await.is_empty());
}

// ============================================================================
// Movie Check Tests
// ============================================================================

fn movie_check(fx: &Fixture, storage: Arc<MockStorage>, probe: Arc<MockProbe>, root: &Path) -> MovieCheck {
    MovieCheck::new(
        fx.ctx.clone(),
        storage,
        probe,
        StorageLayout::new(root),
        Duration::from_secs(5),
        Duration::from_secs(5),
    )
}

#[tokio::test]
async fn test_movie_url_error_takes_no_action() {
    let fx = Fixture::new();
    let dir = tempfile::tempdir().unwrap();
    let resource = camera(1);
    let check = movie_check(&fx, Arc::new(MockStorage::default()), MockProbe::returning(None), dir.path());

    let events = check.run_checks(&[resource.clone()], at("2024-06-10T14:16:00Z")).await;

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].error, "The Resource URL is not producing images.");
    assert_eq!(events[0].action, "No action taken.");
    assert!(fx.sink.sent().is_empty());
    assert_eq!(
        fx.mailer.subjects(),
        vec!["Server Watchdog: Error on MovieMaker for resource Camera 1"]
    );
}

#[tokio::test]
async fn test_movie_no_images_restarts_retrieval_and_movie() {
    let fx = Fixture::new();
    let dir = tempfile::tempdir().unwrap();
    let resource = camera(2);
    let check = movie_check(&fx, Arc::new(MockStorage::default()), MockProbe::returning(Some((640, 480))), dir.path());

    let events = check.run_checks(&[resource.clone()], at("2024-06-10T14:16:00Z")).await;

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].error, "No images were available to make a movie.");
    let mut expected = Fixture::restart_pair(ServiceName::Retrieval, &resource);
    expected.extend(Fixture::restart_pair(ServiceName::Movie, &resource));
    assert_eq!(fx.sink.sent(), expected);
    assert!(fx.control.calls().is_empty());

    // Second consecutive failure escalates to whole services.
    let events = check.run_checks(&[resource.clone()], at("2024-06-10T15:16:00Z")).await;
    assert_eq!(events[0].action, "Retrieval and MovieMaker systems were restarted.");
    assert!(events[0].info.starts_with("This resource has failed at least twice in a row. "));
    assert_eq!(
        fx.control.calls(),
        vec![
            ControlCall::Restart(ServiceName::Retrieval),
            ControlCall::Restart(ServiceName::Movie)
        ]
    );
}

#[tokio::test]
async fn test_movie_missing_clip_then_present() {
    let fx = Fixture::new();
    let dir = tempfile::tempdir().unwrap();
    let resource = camera(3);
    let storage = MockStorage::with_images(vec![image(&resource, at("2024-06-10T13:05:00Z"))]);
    let check = movie_check(&fx, storage, MockProbe::returning(Some((640, 480))), dir.path());
    let now = at("2024-06-10T14:16:00Z");

    let events = check.run_checks(&[resource.clone()], now).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].error, "No movie was made.");
    assert_eq!(fx.sink.sent(), Fixture::restart_pair(ServiceName::Movie, &resource));
    assert_eq!(check.tracker().count(&resource.id), 1);

    let layout = StorageLayout::new(dir.path());
    let hour = (now - ChronoDuration::hours(1)).naive_utc();
    touch(
        &layout.hourly_clip_path(&resource.storage_folder, hour, MediaFormat::Avi),
        now,
    );

    let events = check.run_checks(&[resource.clone()], now).await;
    assert!(events.is_empty());
    assert_eq!(check.tracker().count(&resource.id), 0);
}

#[tokio::test]
async fn test_movie_image_check_needs_a_single_image() {
    let fx = Fixture::new();
    let dir = tempfile::tempdir().unwrap();
    let resource = camera(4);
    let images = (0..5)
        .map(|i| image(&resource, at("2024-06-10T13:05:00Z") + ChronoDuration::minutes(i)))
        .collect();
    let storage = MockStorage::with_images(images);
    let check = movie_check(&fx, storage.clone(), MockProbe::returning(Some((640, 480))), dir.path());

    let events = check.run_checks(&[resource.clone()], at("2024-06-10T14:16:00Z")).await;

    assert_eq!(events[0].error, "No movie was made.");
    assert_eq!(*storage.fetch_limits.lock(), vec![1]);
}

#[tokio::test]
async fn test_movie_skips_inactive_resources() {
    let fx = Fixture::new();
    let dir = tempfile::tempdir().unwrap();
    let mut resource = camera(4);
    resource.active = false;
    let check = movie_check(&fx, Arc::new(MockStorage::default()), MockProbe::returning(None), dir.path());

    assert!(check.run_checks(&[resource], at("2024-06-10T14:16:00Z")).await.is_empty());
}

// ============================================================================
// Retrieval Check Tests
// ============================================================================

#[tokio::test]
async fn test_retrieval_tolerance() {
    let fx = Fixture::new();
    let dir = tempfile::tempdir().unwrap();
    let layout = StorageLayout::new(dir.path());
    let resource = camera(5);
    let captured = at("2024-06-10T12:00:00Z");
    touch(
        &layout
            .day_dir(&resource.storage_folder, captured.date_naive())
            .join("cam520240610-120000.jpg"),
        captured,
    );
    let check = RetrievalCheck::new(fx.ctx.clone(), layout, 15);
    assert_eq!(check.tolerance(&resource), ChronoDuration::milliseconds(900_000));

    let late = captured + ChronoDuration::milliseconds(1_000_000);
    let events = check.run_checks(&[resource.clone()], late).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].error, "A resource malfunctioned.");
    assert_eq!(events[0].action, "Retrieval of the resource was restarted.");
    assert_eq!(fx.sink.sent(), Fixture::restart_pair(ServiceName::Retrieval, &resource));
    assert_eq!(check.tracker().count(&resource.id), 1);

    let fresh = captured + ChronoDuration::milliseconds(500_000);
    assert!(check.run_checks(&[resource.clone()], fresh).await.is_empty());
    assert_eq!(check.tracker().count(&resource.id), 0);
}

#[tokio::test]
async fn test_retrieval_notifications_suppressed_after_escalation() {
    let fx = Fixture::new();
    let dir = tempfile::tempdir().unwrap();
    let resource = camera(6);
    let check = RetrievalCheck::new(fx.ctx.clone(), StorageLayout::new(dir.path()), 15);

    for minute in [0, 15, 30] {
        let now = at("2024-06-10T12:00:00Z") + ChronoDuration::minutes(minute);
        let events = check.run_checks(&[resource.clone()], now).await;
        assert_eq!(events.len(), 1);
    }

    // First failure and the escalation notify; the third is suppressed.
    assert_eq!(fx.mailer.sent.lock().len(), 2);
    assert_eq!(check.tracker().count(&resource.id), 3);
    let restarts = fx
        .control
        .calls()
        .into_iter()
        .filter(|c| *c == ControlCall::Restart(ServiceName::Retrieval))
        .count();
    assert_eq!(restarts, 2);
}

#[tokio::test]
async fn test_retrieval_inactive_resource_passes() {
    let fx = Fixture::new();
    let dir = tempfile::tempdir().unwrap();
    let mut resource = camera(7);
    resource.active = false;
    let check = RetrievalCheck::new(fx.ctx.clone(), StorageLayout::new(dir.path()), 15);

    assert!(check.run_checks(&[resource], at("2024-06-10T12:00:00Z")).await.is_empty());
    assert!(fx.sink.sent().is_empty());
}

// ============================================================================
// Storage Check Tests
// ============================================================================

#[tokio::test]
async fn test_storage_failure_restart_order_and_criticality() {
    let fx = Fixture::new();
    let storage = Arc::new(MockStorage::default());
    storage.ping_fails.store(true, Ordering::SeqCst);
    let check = StorageCheck::new(fx.ctx.clone(), storage.clone(), 15, Duration::from_secs(5));
    let start = at("2024-06-10T12:12:00Z");

    let events = check.run_checks(&[], start).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].error, "The storage system was not available.");
    assert!(!events[0].info.contains("critical"));
    assert_eq!(
        fx.control.calls(),
        vec![
            ControlCall::Restart(ServiceName::Storage),
            ControlCall::Restart(ServiceName::Retrieval),
            ControlCall::Restart(ServiceName::Movie),
        ]
    );

    // Within two intervals: critical, notified once per day.
    let events = check.run_checks(&[], start + ChronoDuration::minutes(15)).await;
    assert!(events[0].info.contains("critical error"));
    let events = check.run_checks(&[], start + ChronoDuration::minutes(30)).await;
    assert!(events[0].info.contains("critical error"));
    assert_eq!(fx.mailer.sent.lock().len(), 2);

    storage.ping_fails.store(false, Ordering::SeqCst);
    assert!(check.run_checks(&[], start + ChronoDuration::minutes(45)).await.is_empty());
}

// ============================================================================
// Remote Database Check Tests
// ============================================================================

#[tokio::test]
async fn test_remote_database_query_failure() {
    let fx = Fixture::new();
    let remote = MockRemote::healthy();
    remote.query_ok.store(false, Ordering::SeqCst);
    let check = RemoteDatabaseCheck::new(fx.ctx.clone(), remote.clone(), Duration::from_secs(5));

    let events = check.run_checks(&[], at("2024-06-10T12:05:00Z")).await;
    assert_eq!(events[0].error, "The system could not properly return a query.");
    assert_eq!(events[0].system, ServiceName::WeatherDb);
    assert_eq!(fx.control.calls(), vec![ControlCall::Restart(ServiceName::WeatherDb)]);

    let events = check.run_checks(&[], at("2024-06-10T12:20:00Z")).await;
    assert!(events[0]
        .info
        .starts_with("The system has failed at least twice consecutively. "));

    remote.query_ok.store(true, Ordering::SeqCst);
    assert!(check.run_checks(&[], at("2024-06-10T12:35:00Z")).await.is_empty());
    assert_eq!(check.tracker().count(&()), 0);
}

#[tokio::test]
async fn test_remote_database_unresponsive_is_started() {
    let fx = Fixture::new();
    let remote = MockRemote::healthy();
    remote.running.store(false, Ordering::SeqCst);
    let check = Arc::new(RemoteDatabaseCheck::new(fx.ctx.clone(), remote, Duration::from_secs(5)));
    let watchdog = fx.watchdog(check, Vec::new());

    let events = watchdog.tick(at("2024-06-10T12:05:00Z")).await;
    assert_eq!(events[0].error, STOPPED_ERROR);
    assert_eq!(fx.control.calls(), vec![ControlCall::Start(ServiceName::WeatherDb)]);
}
