//! HTTP surface of the command boundary.

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{Command, CommandHandler, CommandReply};
use crate::error::{ErrorCode, Result, SkyreelError};
use crate::jobs::runner::RunnerSnapshot;
use crate::resource::ResourceId;
use crate::services::ServiceName;
use crate::watchdog::WatchdogService;

/// Shared state of the command API.
#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<CommandHandler>,
    pub watchdogs: Option<Arc<WatchdogService>>,
    pub metrics: Option<PrometheusHandle>,
}

/// Response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(prometheus_metrics))
        .route("/api/v1/commands", post(handle_command))
        .route("/api/v1/resources/:id/schedule", get(schedule))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Handlers
// ═══════════════════════════════════════════════════════════════════════════════

async fn handle_command(
    State(state): State<AppState>,
    Json(command): Json<Command>,
) -> Result<Json<ApiResponse<CommandReply>>> {
    let reply = state.handler.handle(command).await?;
    Ok(Json(ApiResponse::success(reply)))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScheduleView {
    pub resource: ResourceId,
    pub hourly_next_run: Option<chrono::DateTime<chrono::Utc>>,
    pub day_long_next_run: Option<chrono::DateTime<chrono::Utc>>,
}

async fn schedule(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<ScheduleView>>> {
    let resource = ResourceId(id);
    let hourly_next_run = state.handler.hourly().next_run(resource);
    let day_long_next_run = state.handler.day_long().next_run(resource);
    if hourly_next_run.is_none() && day_long_next_run.is_none() {
        return Err(SkyreelError::new(
            ErrorCode::ResourceNotFound,
            format!("resource {} is not scheduled", id),
        ));
    }
    Ok(Json(ApiResponse::success(ScheduleView {
        resource,
        hourly_next_run,
        day_long_next_run,
    })))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LaneHealth {
    pub scheduled: usize,
    pub stats: RunnerSnapshot,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WatchdogHealth {
    pub system: ServiceName,
    pub events: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub hourly: LaneHealth,
    pub day_long: LaneHealth,
    pub watchdogs: Vec<WatchdogHealth>,
}

async fn health(State(state): State<AppState>) -> Json<Health> {
    let lane = |registry: &crate::jobs::JobRegistry| LaneHealth {
        scheduled: registry.len(),
        stats: registry.runner().stats().snapshot(),
    };
    let watchdogs = state
        .watchdogs
        .as_ref()
        .map(|service| {
            service
                .loops()
                .iter()
                .map(|l| WatchdogHealth {
                    system: l.service(),
                    events: l.events().len(),
                })
                .collect()
        })
        .unwrap_or_default();

    Json(Health {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
        hourly: lane(state.handler.hourly()),
        day_long: lane(state.handler.day_long()),
        watchdogs,
    })
}

async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = state.metrics.as_ref().map(|h| h.render()).unwrap_or_default();
    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
