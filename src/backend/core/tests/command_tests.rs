//! Command boundary tests: handler, HTTP routes and outbound routing.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::NaiveDate;
use common::*;
use skyreel_core::clock::{fixed_clock, Clock};
use skyreel_core::command::api::{self, AppState};
use skyreel_core::command::{Command, CommandHandler, CommandReply};
use skyreel_core::error::ErrorCode;
use skyreel_core::jobs::{
    ClipSettings, DayLongClipFactory, HourlyClipFactory, JobFamily, JobRegistry, SerialJobRunner,
};
use skyreel_core::resource::{Resource, ResourceId};
use skyreel_core::services::{CommandRouter, CommandSink, ServiceName};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn handler(harness: &Harness, clock: Clock) -> Arc<CommandHandler> {
    let ctx = harness.context(ClipSettings::default());
    let hourly = Arc::new(JobRegistry::new(
        Arc::new(HourlyClipFactory::new(ctx.clone())),
        SerialJobRunner::start(JobFamily::Hourly, clock.clone()),
        clock.clone(),
    ));
    let day_long = Arc::new(JobRegistry::new(
        Arc::new(DayLongClipFactory::new(ctx.clone())),
        SerialJobRunner::start(JobFamily::DayLong, clock.clone()),
        clock.clone(),
    ));
    Arc::new(CommandHandler::new(hourly, day_long, ctx, clock))
}

fn resources() -> Vec<Resource> {
    let mut inactive = camera(2);
    inactive.active = false;
    vec![camera(1), inactive]
}

// ============================================================================
// Handler Tests
// ============================================================================

#[tokio::test]
async fn test_start_schedules_both_families() {
    let harness = Harness::new(resources(), Vec::new());
    let handler = handler(&harness, fixed_clock(at("2024-06-10T13:05:00Z")));

    let reply = handler.handle(Command::Start { resource: ResourceId(1) }).await.unwrap();
    assert_eq!(
        reply,
        CommandReply::Scheduled {
            resource: ResourceId(1),
            hourly_next_run: Some(at("2024-06-10T14:00:00Z")),
            day_long_next_run: Some(at("2024-06-10T13:10:00Z")),
        }
    );
    assert_eq!(handler.hourly().active(), vec![ResourceId(1)]);
    assert_eq!(handler.day_long().active(), vec![ResourceId(1)]);

    let reply = handler.handle(Command::Stop { resource: ResourceId(1) }).await.unwrap();
    assert_eq!(
        reply,
        CommandReply::Stopped {
            resource: ResourceId(1),
            was_scheduled: true
        }
    );
    assert!(handler.hourly().is_empty());
    assert!(handler.day_long().is_empty());
}

#[tokio::test]
async fn test_start_rejects_inactive_and_unknown() {
    let harness = Harness::new(resources(), Vec::new());
    let handler = handler(&harness, fixed_clock(at("2024-06-10T13:05:00Z")));

    let err = handler.handle(Command::Start { resource: ResourceId(2) }).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::ResourceNotSchedulable);

    let err = handler.handle(Command::Start { resource: ResourceId(99) }).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::ResourceNotFound);
}

#[tokio::test]
async fn test_start_after_deactivation_clears_schedules() {
    let harness = Harness::new(resources(), Vec::new());
    let handler = handler(&harness, fixed_clock(at("2024-06-10T13:05:00Z")));

    handler.handle(Command::Start { resource: ResourceId(1) }).await.unwrap();
    assert_eq!(handler.day_long().len(), 1);

    harness.database.resources.lock()[0].active = false;
    let err = handler.handle(Command::Start { resource: ResourceId(1) }).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::ResourceNotSchedulable);
    assert!(handler.hourly().is_empty());
    assert!(handler.day_long().is_empty());
}

#[tokio::test]
async fn test_stop_when_unscheduled() {
    let harness = Harness::new(resources(), Vec::new());
    let handler = handler(&harness, fixed_clock(at("2024-06-10T13:05:00Z")));

    let reply = handler.handle(Command::Stop { resource: ResourceId(1) }).await.unwrap();
    assert_eq!(
        reply,
        CommandReply::Stopped {
            resource: ResourceId(1),
            was_scheduled: false
        }
    );
}

#[tokio::test]
async fn test_schedule_all_skips_inactive() {
    let harness = Harness::new(resources(), Vec::new());
    let handler = handler(&harness, fixed_clock(at("2024-06-10T13:05:00Z")));

    assert_eq!(handler.schedule_all().await.unwrap(), 1);
    assert_eq!(handler.hourly().len(), 1);
}

#[tokio::test]
async fn test_make_hourly_clips_on_demand() {
    let resource = camera(1);
    let images = vec![image(&resource, at("2024-06-09T08:10:00Z"))];
    let harness = Harness::new(vec![resource], images);
    let handler = handler(&harness, fixed_clock(at("2024-06-10T13:05:00Z")));

    let reply = handler
        .handle(Command::MakeHourlyClips {
            resource: ResourceId(1),
            start: at("2024-06-09T08:00:00Z"),
            length_secs: Some(20),
            codec: None,
        })
        .await
        .unwrap();
    match reply {
        CommandReply::Clips { instances, .. } => assert_eq!(instances.len(), 2),
        other => panic!("unexpected reply: {:?}", other),
    }

    // No images in this hour
    let err = handler
        .handle(Command::MakeHourlyClips {
            resource: ResourceId(1),
            start: at("2024-06-09T09:00:00Z"),
            length_secs: None,
            codec: None,
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::EncoderError);
    assert_eq!(harness.encoder.hourly_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_make_day_long_clip_for_past_day() {
    let harness = Harness::new(vec![camera(1)], Vec::new());
    let handler = handler(&harness, fixed_clock(at("2024-06-10T13:05:00Z")));

    handler
        .handle(Command::MakeDayLongClip {
            resource: ResourceId(1),
            day: NaiveDate::from_ymd_opt(2024, 6, 9).unwrap(),
            include_low_quality: false,
        })
        .await
        .unwrap();

    let calls = harness.encoder.day_long_calls.lock().clone();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].end, at("2024-06-09T23:59:59.999Z"));
    assert!(!calls[0].include_low_quality);
}

// ============================================================================
// HTTP Tests
// ============================================================================

#[tokio::test]
async fn test_http_command_round_trip() {
    let harness = Harness::new(resources(), Vec::new());
    let handler = handler(&harness, fixed_clock(at("2024-06-10T13:05:00Z")));
    let app = api::router(AppState {
        handler,
        watchdogs: None,
        metrics: None,
    });

    let response = app
        .clone()
        .oneshot(
            Request::post("/api/v1/commands")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"command":"START","resource":1}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(Request::get("/api/v1/resources/1/schedule").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(
            Request::post("/api/v1/commands")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"command":"START","resource":2}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ============================================================================
// Outbound Routing Tests
// ============================================================================

#[tokio::test]
async fn test_router_posts_retrieval_commands() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/commands"))
        .and(body_json(serde_json::json!({"command": "STOP", "resource": 1})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let harness = Harness::new(resources(), Vec::new());
    let handler = handler(&harness, fixed_clock(at("2024-06-10T13:05:00Z")));
    let router = CommandRouter::new(handler.clone(), server.uri(), Duration::from_secs(5)).unwrap();

    router
        .dispatch(ServiceName::Retrieval, Command::Stop { resource: ResourceId(1) })
        .await
        .unwrap();

    router
        .dispatch(ServiceName::Movie, Command::Start { resource: ResourceId(1) })
        .await
        .unwrap();
    assert_eq!(handler.hourly().active(), vec![ResourceId(1)]);

    let err = router
        .dispatch(ServiceName::Storage, Command::Start { resource: ResourceId(1) })
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidCommand);
}
