//! HTTP API routes and handlers.
//!
//! This module contains all HTTP endpoint implementations organized by domain:
//! - `monitor` - Monitor status, start/stop and the test action
//! - `devices` - Monitored devices
//! - `discovery` - Discovery window
//! - `config` - Configuration management
//! - `health` - Service health checks
//! - `error` - API error types
//! - `openapi` - OpenAPI specification generation

use axum::Router;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::state::SharedState;

pub mod config;
pub mod devices;
pub mod discovery;
pub mod error;
pub mod health;
pub mod monitor;
pub mod openapi;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use openapi::{get_openapi_json, ApiDoc};

/// Creates the combined API router with all endpoints.
///
/// # Route Structure
///
/// ```text
/// /health                - Health check
/// /swagger-ui            - Interactive documentation
/// /api
/// ├── /monitor           - Status, start, stop, test action
/// ├── /devices           - Monitored devices and toggling
/// ├── /discovery         - Discovery window and results
/// ├── /config            - Configuration management
/// └── /openapi.json      - OpenAPI specification
/// ```
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .nest("/health", health::router())
        .nest(
            "/api",
            Router::new()
                .nest("/monitor", monitor::router())
                .nest("/devices", devices::router())
                .nest("/discovery", discovery::router())
                .nest("/config", config::router()),
        )
        .merge(SwaggerUi::new("/swagger-ui").url("/api/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
