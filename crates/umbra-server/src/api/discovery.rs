//! Discovery window endpoints.
//!
//! A discovery window scans for every nearby device for a fixed time so the
//! user can pick which ones to monitor.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use umbra_core::{DiscoveredDevice, MonitorStatus};

use crate::api::error::ApiResult;
use crate::state::SharedState;

/// Creates the discovery router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_discovered))
        .route("/start", post(start_discovery))
        .route("/stop", post(stop_discovery))
}

/// List discovered devices.
#[utoipa::path(
    get,
    path = "/api/discovery",
    tag = "discovery",
    operation_id = "listDiscovered",
    summary = "List discovered devices",
    description = "Returns the devices heard in the current or last discovery \
        window, strongest signal first.",
    responses(
        (status = 200, description = "Discovered devices", body = Vec<DiscoveredDevice>),
        (status = 503, description = "Monitor task is not running", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn list_discovered(
    State(state): State<SharedState>,
) -> ApiResult<Json<Vec<DiscoveredDevice>>> {
    Ok(Json(state.monitor.discovered_devices().await?))
}

/// Open a discovery window.
#[utoipa::path(
    post,
    path = "/api/discovery/start",
    tag = "discovery",
    operation_id = "startDiscovery",
    summary = "Start discovery",
    description = "Clears earlier results and scans for all nearby devices for \
        30 seconds. Monitoring resumes when the window closes.",
    responses(
        (status = 200, description = "Discovery started", body = MonitorStatus),
        (status = 503, description = "Bluetooth radio is not ready", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn start_discovery(State(state): State<SharedState>) -> ApiResult<Json<MonitorStatus>> {
    let status = state.monitor.start_discovery().await?;
    tracing::info!(ends_at = ?status.discovery_ends_at, "discovery started via API");
    Ok(Json(status))
}

/// Close the discovery window early.
#[utoipa::path(
    post,
    path = "/api/discovery/stop",
    tag = "discovery",
    operation_id = "stopDiscovery",
    summary = "Stop discovery",
    description = "Ends the discovery window. Results stay available until the \
        next window starts.",
    responses(
        (status = 200, description = "Discovery stopped", body = MonitorStatus),
        (status = 503, description = "Monitor task is not running", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn stop_discovery(State(state): State<SharedState>) -> ApiResult<Json<MonitorStatus>> {
    Ok(Json(state.monitor.stop_discovery().await?))
}
