//! In-memory central stack for tests.

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::stream::{BoxStream, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::ble::device::{CentralAdapter, GattCharacteristic, GattNotification, GattService, RemoteDevice};
use crate::ble::uuids::{UART_RX_UUID, UART_SERVICE_UUID, UART_TX_UUID};
use crate::config::WriteMode;
use crate::error::{Error, Result};

pub(crate) const TEST_NAME: &str = "BLE-LINK-TEST";

/// What the fake device saw and how it should misbehave.
#[derive(Default)]
pub(crate) struct DeviceLog {
    pub connects: u32,
    pub disconnects: u32,
    pub connected: bool,
    /// Whether a link was already open each time `connect` was called.
    pub open_at_connect: Vec<bool>,
    pub subscribed: Vec<Uuid>,
    pub written: Vec<(Uuid, Vec<u8>, WriteMode)>,
    /// Discoveries left that come back without the UART service.
    pub discovery_failures: u32,
    pub fail_subscribe: bool,
    pub connect_delay: Duration,
    notifier: Option<mpsc::UnboundedSender<GattNotification>>,
}

#[derive(Clone, Default)]
pub(crate) struct FakeDevice {
    pub log: Arc<Mutex<DeviceLog>>,
}

impl FakeDevice {
    /// Deliver a notification as if the peripheral sent it.
    pub fn notify(&self, uuid: Uuid, value: &[u8]) {
        if let Some(tx) = &self.log.lock().notifier {
            let _ = tx.unbounded_send(GattNotification {
                uuid,
                value: value.to_vec(),
            });
        }
    }

    /// Simulate the peripheral dropping the link: the stack reports no
    /// connection and the notification stream ends.
    pub fn drop_link(&self) {
        let mut log = self.log.lock();
        log.connected = false;
        log.notifier = None;
    }

    pub fn written_bytes(&self) -> Vec<u8> {
        self.log
            .lock()
            .written
            .iter()
            .flat_map(|(_, data, _)| data.clone())
            .collect()
    }
}

pub(crate) fn uart_services() -> Vec<GattService> {
    let characteristic = |uuid| GattCharacteristic {
        uuid,
        service_uuid: UART_SERVICE_UUID,
        service_index: 0,
    };
    vec![GattService {
        uuid: UART_SERVICE_UUID,
        index: 0,
        characteristics: vec![characteristic(UART_RX_UUID), characteristic(UART_TX_UUID)],
    }]
}

#[async_trait]
impl RemoteDevice for FakeDevice {
    fn id(&self) -> String {
        "fake".to_string()
    }

    async fn connect(&self) -> Result<()> {
        let delay = self.log.lock().connect_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut log = self.log.lock();
        let already_open = log.connected;
        log.open_at_connect.push(already_open);
        log.connects += 1;
        log.connected = true;
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let mut log = self.log.lock();
        log.disconnects += 1;
        log.connected = false;
        log.subscribed.clear();
        log.notifier = None;
        Ok(())
    }

    async fn is_connected(&self) -> Result<bool> {
        Ok(self.log.lock().connected)
    }

    async fn discover_services(&self) -> Result<Vec<GattService>> {
        let mut log = self.log.lock();
        if log.discovery_failures > 0 {
            log.discovery_failures -= 1;
            return Ok(Vec::new());
        }
        Ok(uart_services())
    }

    async fn subscribe(&self, characteristic: &GattCharacteristic) -> Result<()> {
        let mut log = self.log.lock();
        if log.fail_subscribe {
            return Err(Error::SubscribeFailed {
                reason: "CCCD write rejected".to_string(),
            });
        }
        log.subscribed.push(characteristic.uuid);
        Ok(())
    }

    async fn unsubscribe(&self, characteristic: &GattCharacteristic) -> Result<()> {
        self.log.lock().subscribed.retain(|u| *u != characteristic.uuid);
        Ok(())
    }

    async fn notifications(&self) -> Result<BoxStream<'static, GattNotification>> {
        let (tx, rx) = mpsc::unbounded();
        self.log.lock().notifier = Some(tx);
        Ok(rx.boxed())
    }

    async fn write(&self, characteristic: &GattCharacteristic, data: &[u8], mode: WriteMode) -> Result<()> {
        let mut log = self.log.lock();
        if !log.connected {
            return Err(Error::WriteFailed {
                reason: "link down".to_string(),
            });
        }
        log.written.push((characteristic.uuid, data.to_vec(), mode));
        Ok(())
    }
}

/// Adapter that finds `device` under [`TEST_NAME`], or nothing.
#[derive(Clone, Default)]
pub(crate) struct FakeAdapter {
    pub device: Option<FakeDevice>,
    pub scans: Arc<Mutex<u32>>,
}

impl FakeAdapter {
    pub fn with_device(device: FakeDevice) -> Self {
        Self {
            device: Some(device),
            scans: Arc::default(),
        }
    }
}

#[async_trait]
impl CentralAdapter for FakeAdapter {
    type Device = FakeDevice;

    async fn find_device_by_name(&self, name: &str, _timeout: Duration) -> Result<Option<FakeDevice>> {
        *self.scans.lock() += 1;
        Ok(self.device.clone().filter(|_| name == TEST_NAME))
    }
}

/// Let spawned listener tasks catch up.
pub(crate) async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}
