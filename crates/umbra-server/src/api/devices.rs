//! Monitored device endpoints.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use umbra_core::{DeviceId, DeviceStatus, ToggleOutcome};

use crate::api::error::{ApiError, ApiResult};
use crate::state::SharedState;

/// Creates the devices router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_devices))
        .route("/{id}/toggle", post(toggle_device))
}

/// List monitored devices.
#[utoipa::path(
    get,
    path = "/api/devices",
    tag = "devices",
    operation_id = "listDevices",
    summary = "List monitored devices",
    description = "Returns every monitored device with its last reading and \
        whether it currently counts as in range.",
    responses(
        (status = 200, description = "Monitored devices", body = Vec<DeviceStatus>),
        (status = 503, description = "Monitor task is not running", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn list_devices(State(state): State<SharedState>) -> ApiResult<Json<Vec<DeviceStatus>>> {
    Ok(Json(state.monitor.monitored_devices().await?))
}

/// Toggle monitoring of a device.
#[utoipa::path(
    post,
    path = "/api/devices/{id}/toggle",
    tag = "devices",
    operation_id = "toggleDevice",
    summary = "Toggle monitoring of a device",
    description = "Removes a monitored device, or adds a device heard in the \
        current discovery window. The device list is saved before the change \
        takes effect. Adding the first device starts monitoring; removing the \
        last one stops it.",
    params(
        ("id" = String, Path, description = "Bluetooth address", example = "AA:BB:CC:DD:EE:FF")
    ),
    responses(
        (status = 200, description = "Device toggled", body = ToggleOutcome),
        (status = 400, description = "Malformed address", body = crate::api::error::ErrorResponse),
        (status = 404, description = "Device neither monitored nor discovered", body = crate::api::error::ErrorResponse),
        (status = 500, description = "Device list could not be saved", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn toggle_device(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ToggleOutcome>> {
    let id = DeviceId::parse(&id).map_err(ApiError::from)?;
    Ok(Json(state.monitor.toggle_monitoring(id).await?))
}
