//! Seam between the link and the local BLE peripheral stack.
//!
//! The link never talks to a concrete stack (NimBLE, BlueZ, ...). It drives
//! a [`PeripheralStack`] and hands the stack a [`PeripheralEvents`] handle,
//! which the stack calls from its own callback context when a central
//! connects, disconnects or writes.

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::ble::uuids::{UART_RX_UUID, UART_SERVICE_UUID, UART_TX_UUID};
use crate::config::PeripheralConfig;
use crate::error::Result;
use crate::peripheral::state::ConnectionStateMachine;
use crate::protocol::FrameBuffer;

/// What the stack has to build: one service with a notify and a write
/// characteristic, advertised under a name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattServerLayout {
    /// Advertised name.
    pub device_name: String,
    /// Service to create and advertise.
    pub service_uuid: Uuid,
    /// Notify characteristic (device → host).
    pub tx_uuid: Uuid,
    /// Write and write-without-response characteristic (host → device).
    pub rx_uuid: Uuid,
    /// MTU to request from the stack.
    pub preferred_mtu: u16,
}

impl GattServerLayout {
    /// Nordic UART layout for the given configuration.
    pub fn uart(config: &PeripheralConfig) -> Self {
        Self {
            device_name: config.device_name.clone(),
            service_uuid: UART_SERVICE_UUID,
            tx_uuid: UART_TX_UUID,
            rx_uuid: UART_RX_UUID,
            preferred_mtu: config.preferred_mtu,
        }
    }
}

/// Capabilities the link needs from a peripheral BLE stack.
///
/// Implementations wrap global or reference-counted stack objects, so every
/// method takes `&self`.
#[cfg_attr(test, mockall::automock)]
pub trait PeripheralStack: Send + Sync {
    /// Build the server, service and characteristics described by `layout`
    /// and route the stack's callbacks to `events`.
    fn initialize(&self, layout: &GattServerLayout, events: PeripheralEvents) -> Result<()>;

    /// Start advertising the service.
    fn start_advertising(&self) -> Result<()>;

    /// Stop advertising.
    fn stop_advertising(&self) -> Result<()>;

    /// Set the TX characteristic to `chunk` and notify the central.
    fn notify(&self, chunk: &[u8]) -> Result<()>;

    /// Check if the TX characteristic exists.
    fn can_notify(&self) -> bool;

    /// Number of centrals the stack believes are connected.
    fn connected_count(&self) -> usize;

    /// Tear down every stack object built by `initialize`.
    fn deinit(&self) -> Result<()>;
}

/// State shared by the stack callback context and the host loop.
#[derive(Debug)]
pub(crate) struct LinkShared {
    pub(crate) machine: ConnectionStateMachine,
    /// Receive accumulator; holds at most one partial frame.
    pub(crate) rx: FrameBuffer,
    /// Complete frames waiting for the host loop to dispatch them.
    pub(crate) inbox: VecDeque<Bytes>,
}

impl LinkShared {
    pub(crate) fn new(machine: ConnectionStateMachine) -> Self {
        Self {
            machine,
            rx: FrameBuffer::new(),
            inbox: VecDeque::new(),
        }
    }
}

/// Handle the stack calls from its callback context.
///
/// Every method only flips state, appends bytes or toggles advertising.
/// Dispatch and reinit happen later, in the host loop.
#[derive(Clone)]
pub struct PeripheralEvents {
    shared: Arc<Mutex<LinkShared>>,
}

impl PeripheralEvents {
    pub(crate) fn new(shared: Arc<Mutex<LinkShared>>) -> Self {
        Self { shared }
    }

    /// A central connected.
    pub fn connected(&self, stack: &dyn PeripheralStack) {
        let accepted = self.shared.lock().machine.on_connect(Instant::now());
        if !accepted {
            debug!("Duplicate connect event ignored");
            return;
        }

        info!("Central connected");

        if let Err(e) = stack.stop_advertising() {
            warn!("Failed to stop advertising: {}", e);
        }
    }

    /// The central disconnected.
    pub fn disconnected(&self, stack: &dyn PeripheralStack) {
        {
            let mut shared = self.shared.lock();
            if !shared.machine.on_disconnect(Instant::now()) {
                debug!("Duplicate disconnect event ignored");
                return;
            }
            shared.rx.clear();
        }

        info!("Central disconnected, restarting advertising");

        if let Err(e) = stack.start_advertising() {
            warn!("Failed to restart advertising: {}", e);
        }
    }

    /// The central wrote `data` to the RX characteristic.
    pub fn written(&self, data: &[u8]) {
        if data.is_empty() {
            return;
        }

        let mut guard = self.shared.lock();
        let shared = &mut *guard;
        shared.rx.extend(data);
        shared.inbox.extend(shared.rx.drain_frames());

        trace!(
            "Received {} bytes, {} frames queued, {} bytes pending",
            data.len(),
            shared.inbox.len(),
            shared.rx.len()
        );
    }
}

impl std::fmt::Debug for PeripheralEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeripheralEvents").finish_non_exhaustive()
    }
}
