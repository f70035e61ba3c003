//! OpenAPI specification generation for the umbra API.
//!
//! The document is served at `/api/openapi.json` next to Swagger UI, and
//! written to disk by the `gen-openapi` binary for client generation.

use utoipa::OpenApi;

use super::config::{
    ConfigResponse, MonitorConfigResponse, NotificationsConfigResponse, UpdateMonitorRequest,
    UpdateNotificationsRequest,
};
use super::error::ErrorResponse;
use super::health::HealthResponse;
use umbra_core::{
    ActionOutcome, ActionReport, DeviceState, DeviceStatus, DeviceType, DiscoveredDevice,
    MonitorStatus, MonitoredDevice, RadioState, ScanState, SignalStrength, TestActionOutcome,
    ToggleOutcome,
};

/// Returns the OpenAPI specification as pretty-printed JSON.
///
/// # Errors
///
/// Returns an error if the document cannot be serialized.
pub fn get_openapi_json() -> serde_json::Result<String> {
    ApiDoc::openapi().to_pretty_json()
}

/// Main OpenAPI document structure for umbra.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "umbra API",
        version = "0.1.0",
        description = r#"
# umbra API

umbra locks your session once every trusted Bluetooth device has walked away.

## Overview

The server runs next to the desktop session and provides:

1. **Monitoring**: Start and stop the proximity monitor and read its status
2. **Devices**: Choose which nearby devices count as "you"
3. **Discovery**: Scan for nearby devices for 30 seconds
4. **Configuration**: Signal threshold, lock delay and notifications

## How locking works

Every two seconds each monitored device is checked. A device counts as in
range when it was heard in the last 5 seconds at or above the RSSI
threshold. When every monitored device has been out of range for the lock
delay, the session is locked. After a lock, no automatic lock happens for
60 seconds.
"#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "/", description = "Local umbra server")
    ),
    tags(
        (
            name = "system",
            description = "Health checks"
        ),
        (
            name = "monitor",
            description = "Proximity monitor control and the lock action"
        ),
        (
            name = "devices",
            description = "Devices whose presence keeps the session unlocked"
        ),
        (
            name = "discovery",
            description = "Time-boxed scan for nearby devices"
        ),
        (
            name = "config",
            description = "Proximity and notification settings"
        )
    ),
    paths(
        // Health endpoints
        super::health::health_check,
        // Monitor endpoints
        super::monitor::get_status,
        super::monitor::start_monitor,
        super::monitor::stop_monitor,
        super::monitor::test_action,
        // Device endpoints
        super::devices::list_devices,
        super::devices::toggle_device,
        // Discovery endpoints
        super::discovery::list_discovered,
        super::discovery::start_discovery,
        super::discovery::stop_discovery,
        // Config endpoints
        super::config::get_config,
        super::config::update_monitor,
        super::config::update_notifications,
    ),
    components(
        schemas(
            // Error types
            ErrorResponse,
            // Health types
            HealthResponse,
            // Monitor types
            MonitorStatus,
            ScanState,
            RadioState,
            ActionReport,
            ActionOutcome,
            TestActionOutcome,
            // Device types
            DeviceStatus,
            DeviceState,
            DeviceType,
            SignalStrength,
            MonitoredDevice,
            DiscoveredDevice,
            ToggleOutcome,
            // Config types
            ConfigResponse,
            MonitorConfigResponse,
            NotificationsConfigResponse,
            UpdateMonitorRequest,
            UpdateNotificationsRequest,
        )
    )
)]
pub struct ApiDoc;
