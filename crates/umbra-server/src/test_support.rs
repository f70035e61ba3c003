//! In-process server with a mock scanner, used by the handler tests.

use std::sync::Arc;

use axum_test::TestServer;
use tempfile::TempDir;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use umbra_core::{
    Config, DeviceId, DeviceStore, DryRunActuator, MockScanner, MonitorParts, NeverInEffect,
    NotificationsConfig, ScanSink, SightingEvent,
};

use crate::api::create_router;
use crate::state::{spawn_monitor, AppState};

pub(crate) struct TestApp {
    pub server: TestServer,
    pub scanner: MockScanner,
    pub dir: TempDir,
    shutdown: CancellationToken,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(Config::default()).await
    }

    pub async fn spawn_with(mut config: Config) -> Self {
        config.monitor.start_on_launch = false;
        config.notifications = NotificationsConfig {
            enabled: false,
            notice_delay_ms: 0,
        };

        let dir = TempDir::new().unwrap();
        let (sink, feed) = ScanSink::channel(64);
        let scanner = MockScanner::new(sink);
        let (config_tx, config_rx) = watch::channel(config);
        let shutdown = CancellationToken::new();

        let monitor = spawn_monitor(
            MonitorParts {
                scanner: Box::new(scanner.clone()),
                actuator: Arc::new(DryRunActuator),
                notifier: None,
                probe: Arc::new(NeverInEffect),
                store: DeviceStore::new(dir.path().join("data")),
            },
            config_rx,
            feed,
            shutdown.clone(),
        )
        .unwrap();

        let state = Arc::new(AppState::new(
            monitor.handle,
            config_tx,
            dir.path().join("config.toml"),
        ));
        let server = TestServer::new(create_router(state)).unwrap();

        Self {
            server,
            scanner,
            dir,
            shutdown,
        }
    }

    /// Emits a sighting and waits until the monitor has seen it.
    pub async fn hear(&self, address: &str, name: &str, rssi: i16) {
        let id = DeviceId::parse(address).unwrap();
        assert!(self
            .scanner
            .emit(SightingEvent::new(id, rssi, chrono::Utc::now()).with_name(name)));

        for _ in 0..100 {
            let body: serde_json::Value = self.server.get("/api/discovery").await.json();
            let heard = body
                .as_array()
                .is_some_and(|devices| devices.iter().any(|d| d["id"] == address));
            if heard {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        panic!("sighting of {address} never reached the monitor");
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
