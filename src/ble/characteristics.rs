//! Scoped TX/RX characteristic resolution.
//!
//! The TX and RX characteristics are looked up inside one discovered
//! service instance, never across every service of the device. A device
//! may carry the same characteristic identifier in an unrelated service,
//! and a global lookup would pick whichever one comes first.

use tracing::debug;
use uuid::Uuid;

use crate::ble::device::{GattCharacteristic, GattService};
use crate::ble::uuids::{UART_RX_UUID, UART_SERVICE_UUID, UART_TX_UUID};
use crate::error::{Error, Result};

/// The characteristic pair of one UART service instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UartCharacteristics {
    /// Notify characteristic (device → host).
    pub tx: GattCharacteristic,
    /// Write characteristic (host → device).
    pub rx: GattCharacteristic,
}

impl UartCharacteristics {
    /// Resolve the Nordic UART pair.
    pub fn resolve(services: &[GattService]) -> Result<Self> {
        Self::resolve_scoped(services, &UART_SERVICE_UUID, &UART_TX_UUID, &UART_RX_UUID)
    }

    /// Resolve `tx` and `rx` inside the first instance of `service` that
    /// carries both.
    ///
    /// # Errors
    ///
    /// [`Error::ServiceNotFound`] if no instance of `service` was discovered,
    /// [`Error::CharacteristicNotFound`] if no instance carries both.
    pub fn resolve_scoped(services: &[GattService], service: &Uuid, tx: &Uuid, rx: &Uuid) -> Result<Self> {
        let mut candidates = services.iter().filter(|s| s.uuid == *service).peekable();

        if candidates.peek().is_none() {
            return Err(Error::ServiceNotFound {
                uuid: service.to_string(),
            });
        }

        let mut missing = *tx;
        for candidate in candidates {
            match (candidate.characteristic(tx), candidate.characteristic(rx)) {
                (Some(tx), Some(rx)) => {
                    debug!("Resolved UART pair in service instance {}", candidate.index);
                    return Ok(Self {
                        tx: tx.clone(),
                        rx: rx.clone(),
                    });
                }
                (None, _) => missing = *tx,
                (Some(_), None) => missing = *rx,
            }
        }

        Err(Error::CharacteristicNotFound {
            uuid: missing.to_string(),
        })
    }
}
