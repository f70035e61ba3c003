//! # umbra-server
//!
//! Runs the umbra proximity monitor and serves its REST API.
//!
//! This binary provides:
//! - The monitor task: Bluetooth scanning, the debounce rule and the lock
//! - REST API for status, devices, discovery and configuration
//! - OpenAPI documentation via Swagger UI
//! - Structured logging to file and stdout
//!
//! ## Running
//!
//! ```bash
//! # Development, without a Bluetooth adapter
//! cargo run --package umbra-server --features mock-bluetooth
//!
//! # Production
//! UMBRA_ENV=production ./umbra-server
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use umbra_core::{default_config_path, Config};
use umbra_server::api::create_router;
use umbra_server::logging::{self, LogProfile};
use umbra_server::state::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init(LogProfile::from_env())?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting umbra-server");

    let config_path = default_config_path();
    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    config.validate().context("invalid configuration")?;
    info!(path = %config_path.display(), "configuration loaded");

    let addr = format!("{}:{}", config.server.bind_address, config.server.port);
    let (config_tx, config_rx) = watch::channel(config);

    let shutdown = CancellationToken::new();
    let monitor = state::start_monitor(config_rx, shutdown.clone()).await?;

    let app_state = Arc::new(AppState::new(monitor.handle, config_tx, config_path));
    let app = create_router(app_state);

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(address = %addr, "Listening");

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("Shutdown requested"),
                () = signal.cancelled() => {}
            }
        })
        .await?;

    shutdown.cancel();
    if let Err(e) = monitor.task.await {
        error!(error = %e, "monitor task ended abnormally");
    }
    info!("umbra-server stopped");

    Ok(())
}
