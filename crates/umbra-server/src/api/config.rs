//! Configuration API endpoints.
//!
//! Provides endpoints for reading and updating the proximity and
//! notification settings. Changes are saved to disk and picked up by the
//! monitor on its next tick.

use axum::extract::State;
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use umbra_core::{
    Config, MAX_LOCK_DELAY_SECS, MAX_NOTICE_DELAY_MS, MAX_RSSI_THRESHOLD, MIN_RSSI_THRESHOLD,
};
use utoipa::ToSchema;

use crate::api::error::{ApiError, ApiResult};
use crate::state::SharedState;

/// Creates the config router with all endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(get_config))
        .route("/monitor", put(update_monitor))
        .route("/notifications", put(update_notifications))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Current configuration response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "monitor": {
        "rssi_threshold": -70,
        "lock_delay_secs": 10,
        "auto_lock_enabled": true,
        "start_on_launch": true
    },
    "notifications": {
        "enabled": true,
        "notice_delay_ms": 500
    }
}))]
pub struct ConfigResponse {
    /// Proximity settings.
    pub monitor: MonitorConfigResponse,

    /// Pre-lock notification settings.
    pub notifications: NotificationsConfigResponse,
}

/// Proximity settings in responses.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MonitorConfigResponse {
    /// RSSI at or above which a device counts as nearby.
    #[schema(example = -70)]
    pub rssi_threshold: i16,

    /// Seconds every device must stay out of range before locking.
    #[schema(example = 10)]
    pub lock_delay_secs: i64,

    /// Whether the lock action may fire.
    #[schema(example = true)]
    pub auto_lock_enabled: bool,

    /// Whether monitoring starts on launch.
    #[schema(example = true)]
    pub start_on_launch: bool,
}

/// Notification settings in responses.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NotificationsConfigResponse {
    /// Whether a notification is shown before locking.
    #[schema(example = true)]
    pub enabled: bool,

    /// Pause between the notification and the lock.
    #[schema(example = 500)]
    pub notice_delay_ms: u64,
}

impl From<&Config> for ConfigResponse {
    fn from(config: &Config) -> Self {
        Self {
            monitor: MonitorConfigResponse {
                rssi_threshold: config.monitor.rssi_threshold,
                lock_delay_secs: config.monitor.lock_delay_secs,
                auto_lock_enabled: config.monitor.auto_lock_enabled,
                start_on_launch: config.monitor.start_on_launch,
            },
            notifications: NotificationsConfigResponse {
                enabled: config.notifications.enabled,
                notice_delay_ms: config.notifications.notice_delay_ms,
            },
        }
    }
}

/// Partial update of the proximity settings. Omitted fields keep their value.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
#[schema(example = json!({
    "rssi_threshold": -65,
    "lock_delay_secs": 20
}))]
pub struct UpdateMonitorRequest {
    /// RSSI threshold (-100 to 0 dBm).
    #[schema(example = -65, minimum = -100, maximum = 0)]
    pub rssi_threshold: Option<i16>,

    /// Lock delay (0 to 3600 seconds).
    #[schema(example = 20, minimum = 0, maximum = 3600)]
    pub lock_delay_secs: Option<i64>,

    /// Enable or disable the lock action.
    pub auto_lock_enabled: Option<bool>,

    /// Start monitoring on launch.
    pub start_on_launch: Option<bool>,
}

/// Partial update of the notification settings.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
#[schema(example = json!({
    "enabled": true,
    "notice_delay_ms": 1000
}))]
pub struct UpdateNotificationsRequest {
    /// Show a notification before locking.
    pub enabled: Option<bool>,

    /// Pause between the notification and the lock (at most 10000 ms).
    #[schema(example = 1000, maximum = 10000)]
    pub notice_delay_ms: Option<u64>,
}

impl UpdateMonitorRequest {
    fn validate(&self) -> ApiResult<()> {
        if let Some(threshold) = self.rssi_threshold {
            if !(MIN_RSSI_THRESHOLD..=MAX_RSSI_THRESHOLD).contains(&threshold) {
                return Err(ApiError::bad_request(
                    "invalid_rssi_threshold",
                    format!(
                        "RSSI threshold must be between {MIN_RSSI_THRESHOLD} and {MAX_RSSI_THRESHOLD} dBm"
                    ),
                ));
            }
        }
        if let Some(delay) = self.lock_delay_secs {
            if !(0..=MAX_LOCK_DELAY_SECS).contains(&delay) {
                return Err(ApiError::bad_request(
                    "invalid_lock_delay",
                    format!("Lock delay must be between 0 and {MAX_LOCK_DELAY_SECS} seconds"),
                ));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Get current configuration.
#[utoipa::path(
    get,
    path = "/api/config",
    tag = "config",
    operation_id = "getConfig",
    summary = "Get current configuration",
    description = "Returns the proximity and notification settings.",
    responses(
        (status = 200, description = "Configuration retrieved", body = ConfigResponse)
    )
)]
pub async fn get_config(State(state): State<SharedState>) -> Json<ConfigResponse> {
    Json(ConfigResponse::from(&state.config()))
}

/// Update proximity settings.
#[utoipa::path(
    put,
    path = "/api/config/monitor",
    tag = "config",
    operation_id = "updateMonitorConfig",
    summary = "Update proximity settings",
    description = "Updates the RSSI threshold, lock delay and switches. \
        The monitor applies the new values on its next tick.",
    request_body = UpdateMonitorRequest,
    responses(
        (status = 200, description = "Settings updated", body = ConfigResponse),
        (status = 400, description = "Value out of range", body = crate::api::error::ErrorResponse),
        (status = 500, description = "Configuration could not be saved", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn update_monitor(
    State(state): State<SharedState>,
    Json(request): Json<UpdateMonitorRequest>,
) -> ApiResult<Json<ConfigResponse>> {
    request.validate()?;

    let config = state
        .update_config(|config| {
            if let Some(threshold) = request.rssi_threshold {
                config.monitor.rssi_threshold = threshold;
            }
            if let Some(delay) = request.lock_delay_secs {
                config.monitor.lock_delay_secs = delay;
            }
            if let Some(enabled) = request.auto_lock_enabled {
                config.monitor.auto_lock_enabled = enabled;
            }
            if let Some(start) = request.start_on_launch {
                config.monitor.start_on_launch = start;
            }
        })
        .await?;

    Ok(Json(ConfigResponse::from(&config)))
}

/// Update notification settings.
#[utoipa::path(
    put,
    path = "/api/config/notifications",
    tag = "config",
    operation_id = "updateNotificationsConfig",
    summary = "Update notification settings",
    description = "Turns the pre-lock notification on or off and sets how long \
        to wait after it before locking.",
    request_body = UpdateNotificationsRequest,
    responses(
        (status = 200, description = "Settings updated", body = ConfigResponse),
        (status = 400, description = "Value out of range", body = crate::api::error::ErrorResponse),
        (status = 500, description = "Configuration could not be saved", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn update_notifications(
    State(state): State<SharedState>,
    Json(request): Json<UpdateNotificationsRequest>,
) -> ApiResult<Json<ConfigResponse>> {
    if request.notice_delay_ms.is_some_and(|ms| ms > MAX_NOTICE_DELAY_MS) {
        return Err(ApiError::bad_request(
            "invalid_notice_delay",
            format!("Notice delay must be at most {MAX_NOTICE_DELAY_MS} ms"),
        ));
    }

    let config = state
        .update_config(|config| {
            if let Some(enabled) = request.enabled {
                config.notifications.enabled = enabled;
            }
            if let Some(delay) = request.notice_delay_ms {
                config.notifications.notice_delay_ms = delay;
            }
        })
        .await?;

    Ok(Json(ConfigResponse::from(&config)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestApp;
    use axum::http::StatusCode;
    use serde_json::json;

    #[test]
    fn test_update_monitor_request_validation() {
        let ok = UpdateMonitorRequest {
            rssi_threshold: Some(-100),
            lock_delay_secs: Some(3600),
            ..UpdateMonitorRequest::default()
        };
        assert!(ok.validate().is_ok());

        let loud = UpdateMonitorRequest {
            rssi_threshold: Some(5),
            ..UpdateMonitorRequest::default()
        };
        assert!(matches!(
            loud.validate(),
            Err(ApiError::BadRequest { ref error_code, .. }) if error_code == "invalid_rssi_threshold"
        ));

        let negative = UpdateMonitorRequest {
            lock_delay_secs: Some(-1),
            ..UpdateMonitorRequest::default()
        };
        assert!(matches!(
            negative.validate(),
            Err(ApiError::BadRequest { ref error_code, .. }) if error_code == "invalid_lock_delay"
        ));
    }

    #[tokio::test]
    async fn test_get_config() {
        let app = TestApp::spawn().await;
        let config: serde_json::Value = app.server.get("/api/config").await.json();
        assert_eq!(config["monitor"]["rssi_threshold"], -70);
        assert_eq!(config["monitor"]["lock_delay_secs"], 10);
        assert!(config.get("server").is_none());
    }

    #[tokio::test]
    async fn test_update_monitor_saves_and_applies() {
        let app = TestApp::spawn().await;

        let response = app
            .server
            .put("/api/config/monitor")
            .json(&json!({ "rssi_threshold": -60, "auto_lock_enabled": false }))
            .await;
        response.assert_status_ok();
        let config: serde_json::Value = response.json();
        assert_eq!(config["monitor"]["rssi_threshold"], -60);
        assert_eq!(config["monitor"]["auto_lock_enabled"], false);
        assert_eq!(config["monitor"]["lock_delay_secs"], 10);

        let saved = Config::load(app.dir.path().join("config.toml")).unwrap();
        assert_eq!(saved.monitor.rssi_threshold, -60);

        let status: serde_json::Value = app.server.get("/api/monitor").await.json();
        assert_eq!(status["auto_lock_enabled"], false);
    }

    #[tokio::test]
    async fn test_update_monitor_rejects_out_of_range() {
        let app = TestApp::spawn().await;

        let response = app
            .server
            .put("/api/config/monitor")
            .json(&json!({ "lock_delay_secs": 7200 }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: serde_json::Value = response.json();
        assert_eq!(body["error"], "invalid_lock_delay");
        assert!(!app.dir.path().join("config.toml").exists());
    }

    #[tokio::test]
    async fn test_update_notifications() {
        let app = TestApp::spawn().await;

        let response = app
            .server
            .put("/api/config/notifications")
            .json(&json!({ "notice_delay_ms": 20_000 }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);

        let config: serde_json::Value = app
            .server
            .put("/api/config/notifications")
            .json(&json!({ "enabled": true, "notice_delay_ms": 2000 }))
            .await
            .json();
        assert_eq!(config["notifications"]["enabled"], true);
        assert_eq!(config["notifications"]["notice_delay_ms"], 2000);
    }
}
