//! Bluetooth Low Energy scanning via BlueZ.
//!
//! [`BluezScanner`] drives the default adapter through `bluer`:
//! - reports adapter power changes as [`RadioState`]s
//! - runs LE discovery in a background task while a scan is active
//! - turns every advertisement (and RSSI update) into a [`SightingEvent`]

use bluer::{
    Adapter, AdapterEvent, AdapterProperty, Address, DiscoveryFilter, DiscoveryTransport, Session,
};
use futures::{pin_mut, StreamExt};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::scanner::{RadioState, ScanSink, Scanner, ScannerError, ScannerResult};
use crate::types::{DeviceId, SightingEvent};

/// Bluetooth scanner backed by the system's BlueZ daemon.
pub struct BluezScanner {
    adapter: Adapter,
    sink: ScanSink,
    discovery: Option<JoinHandle<()>>,
    radio_watch: JoinHandle<()>,
}

impl BluezScanner {
    /// Opens a BlueZ session on the default adapter and starts watching its
    /// power state.
    ///
    /// # Errors
    ///
    /// Returns an error if the daemon is unreachable or no adapter exists.
    pub async fn new(sink: ScanSink) -> ScannerResult<Self> {
        let session = Session::new()
            .await
            .map_err(|e| ScannerError::SessionInitFailed {
                message: e.to_string(),
            })?;
        let adapter = session
            .default_adapter()
            .await
            .map_err(|_| ScannerError::AdapterNotFound)?;

        let powered = adapter.is_powered().await.unwrap_or(false);
        info!(adapter = adapter.name(), powered, "using Bluetooth adapter");
        sink.radio(if powered {
            RadioState::Ready
        } else {
            RadioState::PoweredOff
        });

        let events = adapter
            .events()
            .await
            .map_err(|e| ScannerError::SessionInitFailed {
                message: e.to_string(),
            })?;
        let radio_sink = sink.clone();
        let radio_watch = tokio::spawn(async move {
            pin_mut!(events);
            while let Some(event) = events.next().await {
                if let AdapterEvent::PropertyChanged(AdapterProperty::Powered(on)) = event {
                    debug!(powered = on, "adapter power changed");
                    radio_sink.radio(if on {
                        RadioState::Ready
                    } else {
                        RadioState::PoweredOff
                    });
                }
            }
            warn!("adapter event stream ended");
            radio_sink.radio(RadioState::Unsupported);
        });

        Ok(Self {
            adapter,
            sink,
            discovery: None,
            radio_watch,
        })
    }
}

impl Scanner for BluezScanner {
    fn start(&mut self, continuous: bool) -> ScannerResult<()> {
        self.stop();

        let adapter = self.adapter.clone();
        let sink = self.sink.clone();
        let filter = DiscoveryFilter {
            transport: DiscoveryTransport::Le,
            duplicate_data: continuous,
            ..DiscoveryFilter::default()
        };

        self.discovery = Some(tokio::spawn(async move {
            if let Err(e) = adapter.set_discovery_filter(filter).await {
                warn!(error = %e, "failed to set discovery filter");
            }
            let events = match adapter.discover_devices_with_changes().await {
                Ok(events) => events,
                Err(e) => {
                    warn!(error = %e, "failed to start discovery");
                    return;
                }
            };
            debug!(continuous, "discovery started");

            // Dropping the stream ends discovery on the adapter.
            pin_mut!(events);
            while let Some(event) = events.next().await {
                if let AdapterEvent::DeviceAdded(address) = event {
                    report_device(&adapter, address, &sink).await;
                }
            }
        }));
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(task) = self.discovery.take() {
            task.abort();
            debug!("discovery stopped");
        }
    }
}

impl Drop for BluezScanner {
    fn drop(&mut self) {
        self.stop();
        self.radio_watch.abort();
    }
}

/// Reads the current advertisement data of `address` and forwards it.
async fn report_device(adapter: &Adapter, address: Address, sink: &ScanSink) {
    let Ok(device) = adapter.device(address) else {
        return;
    };
    // Cached devices without a fresh RSSI were not actually heard.
    let Ok(Some(rssi)) = device.rssi().await else {
        return;
    };
    let Ok(id) = DeviceId::parse(&address.to_string()) else {
        return;
    };

    let name = device.name().await.ok().flatten();
    let company_id = device
        .manufacturer_data()
        .await
        .ok()
        .flatten()
        .and_then(|data| data.keys().min().copied());

    let mut event = SightingEvent::new(id, rssi, chrono::Utc::now());
    event.name = name;
    event.company_id = company_id;
    sink.sighting(event);
}
