//! Monitor control endpoints.
//!
//! Start and stop the proximity monitor, read its status, and fire the lock
//! action on demand.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use umbra_core::{MonitorStatus, TestActionOutcome};

use crate::api::error::ApiResult;
use crate::state::SharedState;

/// Creates the monitor router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(get_status))
        .route("/start", post(start_monitor))
        .route("/stop", post(stop_monitor))
        .route("/test-action", post(test_action))
}

/// Get monitor status.
#[utoipa::path(
    get,
    path = "/api/monitor",
    tag = "monitor",
    operation_id = "getMonitorStatus",
    summary = "Get monitor status",
    description = "Returns whether monitoring is running or paused, what the radio \
        is doing, and how the last lock action ended.",
    responses(
        (status = 200, description = "Monitor status", body = MonitorStatus),
        (status = 503, description = "Monitor task is not running", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn get_status(State(state): State<SharedState>) -> ApiResult<Json<MonitorStatus>> {
    Ok(Json(state.monitor.status().await?))
}

/// Start monitoring.
#[utoipa::path(
    post,
    path = "/api/monitor/start",
    tag = "monitor",
    operation_id = "startMonitor",
    summary = "Start monitoring",
    description = "Starts continuous scanning of the monitored devices. \
        Starting an already running monitor changes nothing.",
    responses(
        (status = 200, description = "Monitoring started", body = MonitorStatus),
        (status = 503, description = "Monitor task is not running", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn start_monitor(State(state): State<SharedState>) -> ApiResult<Json<MonitorStatus>> {
    let status = state.monitor.start().await?;
    tracing::info!(scan_state = ?status.scan_state, "monitoring started via API");
    Ok(Json(status))
}

/// Stop monitoring.
#[utoipa::path(
    post,
    path = "/api/monitor/stop",
    tag = "monitor",
    operation_id = "stopMonitor",
    summary = "Stop monitoring",
    description = "Stops scanning, forgets every device's timer and cancels a \
        lock that is waiting on its notice delay.",
    responses(
        (status = 200, description = "Monitoring stopped", body = MonitorStatus),
        (status = 503, description = "Monitor task is not running", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn stop_monitor(State(state): State<SharedState>) -> ApiResult<Json<MonitorStatus>> {
    let status = state.monitor.stop().await?;
    tracing::info!("monitoring stopped via API");
    Ok(Json(status))
}

/// Fire the lock action now.
#[utoipa::path(
    post,
    path = "/api/monitor/test-action",
    tag = "monitor",
    operation_id = "testAction",
    summary = "Fire the lock action",
    description = "Runs the lock action immediately, ignoring the cooldown. \
        The action is still refused when auto-lock is disabled or another \
        action is in flight; `fired` is false and `reason` says why.",
    responses(
        (status = 200, description = "Dispatch result", body = TestActionOutcome),
        (status = 503, description = "Monitor task is not running", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn test_action(State(state): State<SharedState>) -> ApiResult<Json<TestActionOutcome>> {
    Ok(Json(state.monitor.test_action().await?))
}
