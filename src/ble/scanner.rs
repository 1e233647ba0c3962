//! BLE scanning functionality.
//!
//! [`BleScanner`] is the btleplug-backed [`CentralAdapter`]: it finds the
//! peripheral that advertises a given local name.

use async_trait::async_trait;
use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::stream::{Stream, StreamExt};
use std::time::Duration;
use tracing::{debug, info, trace};

use crate::ble::device::CentralAdapter;
use crate::error::{Error, Result};

/// Check an advertised local name against the wanted one.
pub fn name_matches(local_name: Option<&str>, wanted: &str) -> bool {
    local_name.is_some_and(|name| name == wanted)
}

/// BLE scanner for finding link peripherals by name.
#[derive(Debug, Clone)]
pub struct BleScanner {
    /// The BLE adapter to use for scanning.
    adapter: Adapter,
}

impl BleScanner {
    /// Create a scanner on the first Bluetooth adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new()
            .await
            .map_err(|_e| Error::BluetoothUnavailable)?;

        let adapters = manager.adapters().await.map_err(Error::Bluetooth)?;

        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(Error::BluetoothUnavailable)?;

        info!(
            "Using Bluetooth adapter: {:?}",
            adapter.adapter_info().await.ok()
        );

        Ok(Self { adapter })
    }

    /// Create a scanner with a specific adapter.
    pub fn with_adapter(adapter: Adapter) -> Self {
        Self { adapter }
    }

    /// Get the underlying adapter.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    async fn local_name_of(&self, id: &PeripheralId) -> Option<(Peripheral, Option<String>)> {
        let peripheral = match self.adapter.peripheral(id).await {
            Ok(p) => p,
            Err(e) => {
                trace!("Failed to get peripheral: {}", e);
                return None;
            }
        };

        let name = match peripheral.properties().await {
            Ok(Some(p)) => p.local_name,
            _ => None,
        };

        Some((peripheral, name))
    }

    /// Wait until a peripheral called `name` shows up.
    async fn wait_for_name<S>(&self, name: &str, mut events: S) -> Result<Option<Peripheral>>
    where
        S: Stream<Item = CentralEvent> + Unpin,
    {
        // Already-known peripherals never produce a discovery event.
        for peripheral in self.adapter.peripherals().await.map_err(Error::Bluetooth)? {
            if let Ok(Some(properties)) = peripheral.properties().await {
                if name_matches(properties.local_name.as_deref(), name) {
                    return Ok(Some(peripheral));
                }
            }
        }

        while let Some(event) = events.next().await {
            let id = match event {
                CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
                _ => continue,
            };

            if let Some((peripheral, local_name)) = self.local_name_of(&id).await {
                trace!("Saw {:?} ({:?})", id, local_name);
                if name_matches(local_name.as_deref(), name) {
                    return Ok(Some(peripheral));
                }
            }
        }

        debug!("Adapter event stream ended");
        Ok(None)
    }
}

#[async_trait]
impl CentralAdapter for BleScanner {
    type Device = Peripheral;

    async fn find_device_by_name(&self, name: &str, timeout: Duration) -> Result<Option<Peripheral>> {
        info!("Scanning for {}", name);

        let events = self.adapter.events().await.map_err(Error::Bluetooth)?;
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(Error::Bluetooth)?;

        let found = tokio::time::timeout(timeout, self.wait_for_name(name, events)).await;

        if let Err(e) = self.adapter.stop_scan().await {
            debug!("Failed to stop scan: {}", e);
        }

        match found {
            Ok(result) => result,
            Err(_) => {
                debug!("No advertiser named {} within {:?}", name, timeout);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_matches_exactly() {
        assert!(name_matches(Some("BLE-LINK-TEST"), "BLE-LINK-TEST"));
        assert!(!name_matches(Some("BLE-LINK-TEST-2"), "BLE-LINK-TEST"));
        assert!(!name_matches(Some("ble-link-test"), "BLE-LINK-TEST"));
        assert!(!name_matches(None, "BLE-LINK-TEST"));
    }

    #[test]
    fn test_scanner_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<BleScanner>();
    }
}
