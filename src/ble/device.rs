//! Central-side capability seam.
//!
//! The connection manager only needs a handful of operations from the
//! host's BLE stack: find an advertiser by name, then connect, discover,
//! subscribe and write on it. [`CentralAdapter`] and [`RemoteDevice`]
//! describe exactly that; the btleplug implementation lives here and in
//! [`scanner`](crate::ble::scanner).

use async_trait::async_trait;
use btleplug::api::{Characteristic, Peripheral as BtPeripheral, WriteType};
use btleplug::platform::Peripheral;
use futures::stream::{BoxStream, StreamExt};
use std::time::Duration;
use tracing::trace;
use uuid::Uuid;

use crate::config::WriteMode;
use crate::error::{Error, Result};

/// A characteristic as seen through discovery.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GattCharacteristic {
    /// Characteristic identifier.
    pub uuid: Uuid,
    /// Identifier of the owning service.
    pub service_uuid: Uuid,
    /// Position of the owning service in discovery order. Tells apart two
    /// service instances that share an identifier.
    pub service_index: usize,
}

/// A discovered service instance and its characteristics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattService {
    /// Service identifier.
    pub uuid: Uuid,
    /// Position in discovery order.
    pub index: usize,
    /// Characteristics of this instance only.
    pub characteristics: Vec<GattCharacteristic>,
}

impl GattService {
    /// Find a characteristic of this service instance.
    pub fn characteristic(&self, uuid: &Uuid) -> Option<&GattCharacteristic> {
        self.characteristics.iter().find(|c| c.uuid == *uuid)
    }
}

/// A value notified by the remote device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattNotification {
    /// Characteristic that notified.
    pub uuid: Uuid,
    /// Notified bytes.
    pub value: Vec<u8>,
}

/// Finds remote devices.
#[async_trait]
pub trait CentralAdapter: Send + Sync + 'static {
    /// Handle type of a found device.
    type Device: RemoteDevice;

    /// Scan for an advertiser called `name` for at most `timeout`.
    ///
    /// Returns `Ok(None)` if nothing matched in time. Implementations stop
    /// any scan they started before returning.
    async fn find_device_by_name(&self, name: &str, timeout: Duration) -> Result<Option<Self::Device>>;
}

/// A remote GATT server.
#[async_trait]
pub trait RemoteDevice: Clone + Send + Sync + 'static {
    /// Platform identifier, for logging.
    fn id(&self) -> String;

    /// Establish the link.
    async fn connect(&self) -> Result<()>;

    /// Close the link.
    async fn disconnect(&self) -> Result<()>;

    /// Check if the stack reports an active link.
    async fn is_connected(&self) -> Result<bool>;

    /// Discover services and return every instance in discovery order.
    async fn discover_services(&self) -> Result<Vec<GattService>>;

    /// Enable notifications on `characteristic`.
    async fn subscribe(&self, characteristic: &GattCharacteristic) -> Result<()>;

    /// Disable notifications on `characteristic`.
    async fn unsubscribe(&self, characteristic: &GattCharacteristic) -> Result<()>;

    /// Stream of notifications from every subscribed characteristic.
    async fn notifications(&self) -> Result<BoxStream<'static, GattNotification>>;

    /// Write `data` to `characteristic`.
    async fn write(&self, characteristic: &GattCharacteristic, data: &[u8], mode: WriteMode) -> Result<()>;
}

impl From<WriteMode> for WriteType {
    fn from(mode: WriteMode) -> Self {
        match mode {
            WriteMode::WithResponse => WriteType::WithResponse,
            WriteMode::WithoutResponse => WriteType::WithoutResponse,
        }
    }
}

/// Map the platform's services onto the discovery model.
fn gatt_services(peripheral: &Peripheral) -> Vec<GattService> {
    BtPeripheral::services(peripheral)
        .into_iter()
        .enumerate()
        .map(|(index, service)| GattService {
            uuid: service.uuid,
            index,
            characteristics: service
                .characteristics
                .iter()
                .map(|c| GattCharacteristic {
                    uuid: c.uuid,
                    service_uuid: service.uuid,
                    service_index: index,
                })
                .collect(),
        })
        .collect()
}

/// Look a discovered characteristic up again in its own service instance.
fn platform_characteristic(peripheral: &Peripheral, target: &GattCharacteristic) -> Result<Characteristic> {
    let service = BtPeripheral::services(peripheral)
        .into_iter()
        .nth(target.service_index)
        .filter(|s| s.uuid == target.service_uuid)
        .ok_or_else(|| Error::ServiceNotFound {
            uuid: target.service_uuid.to_string(),
        })?;

    service
        .characteristics
        .into_iter()
        .find(|c| c.uuid == target.uuid)
        .ok_or_else(|| Error::CharacteristicNotFound {
            uuid: target.uuid.to_string(),
        })
}

#[async_trait]
impl RemoteDevice for Peripheral {
    fn id(&self) -> String {
        BtPeripheral::id(self).to_string()
    }

    async fn connect(&self) -> Result<()> {
        BtPeripheral::connect(self).await.map_err(|e| Error::LinkFailed {
            reason: e.to_string(),
        })
    }

    async fn disconnect(&self) -> Result<()> {
        BtPeripheral::disconnect(self).await.map_err(Error::Bluetooth)
    }

    async fn is_connected(&self) -> Result<bool> {
        BtPeripheral::is_connected(self).await.map_err(Error::Bluetooth)
    }

    async fn discover_services(&self) -> Result<Vec<GattService>> {
        BtPeripheral::discover_services(self).await.map_err(Error::Bluetooth)?;
        let services = gatt_services(self);
        trace!("Discovered {} services", services.len());
        Ok(services)
    }

    async fn subscribe(&self, characteristic: &GattCharacteristic) -> Result<()> {
        let target = platform_characteristic(self, characteristic)?;
        BtPeripheral::subscribe(self, &target)
            .await
            .map_err(|e| Error::SubscribeFailed { reason: e.to_string() })
    }

    async fn unsubscribe(&self, characteristic: &GattCharacteristic) -> Result<()> {
        let target = platform_characteristic(self, characteristic)?;
        BtPeripheral::unsubscribe(self, &target).await.map_err(Error::Bluetooth)
    }

    async fn notifications(&self) -> Result<BoxStream<'static, GattNotification>> {
        let stream = BtPeripheral::notifications(self).await.map_err(Error::Bluetooth)?;
        Ok(stream
            .map(|n| GattNotification {
                uuid: n.uuid,
                value: n.value,
            })
            .boxed())
    }

    async fn write(&self, characteristic: &GattCharacteristic, data: &[u8], mode: WriteMode) -> Result<()> {
        let target = platform_characteristic(self, characteristic)?;
        BtPeripheral::write(self, &target, data, mode.into())
            .await
            .map_err(|e| Error::WriteFailed { reason: e.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_mode_maps_to_write_type() {
        assert_eq!(WriteType::from(WriteMode::WithResponse), WriteType::WithResponse);
        assert_eq!(WriteType::from(WriteMode::WithoutResponse), WriteType::WithoutResponse);
    }

    #[test]
    fn test_service_characteristic_lookup() {
        let service_uuid = Uuid::from_u128(1);
        let wanted = Uuid::from_u128(2);
        let service = GattService {
            uuid: service_uuid,
            index: 0,
            characteristics: vec![GattCharacteristic {
                uuid: wanted,
                service_uuid,
                service_index: 0,
            }],
        };

        assert!(service.characteristic(&wanted).is_some());
        assert!(service.characteristic(&Uuid::from_u128(3)).is_none());
    }
}
