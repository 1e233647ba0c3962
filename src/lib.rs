// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # ble-line-link
//!
//! A line-delimited message link over Bluetooth Low Energy, carried on the
//! Nordic UART Service.
//!
//! Each message is one frame: UTF-8 text terminated by a single `\n`.
//! A frame that parses as JSON is delivered as a structured document,
//! anything else as a line of text. The crate implements both ends:
//!
//! - **Peripheral** ([`PeripheralLink`]): drives a local GATT server through
//!   the [`PeripheralStack`] trait, chunks outgoing frames into 20-byte
//!   notifications, debounces connection events and rebuilds the stack when
//!   a link dies.
//! - **Central** ([`CentralLink`]): scans for the peripheral by name with
//!   btleplug, connects with bounded retries, resolves TX/RX inside the one
//!   UART service instance, and reassembles notifications into frames.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ble_line_link::{CentralLink, ConnectOptions, Result};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let link = CentralLink::new("BLE-LINK-TEST")
//!         .await?
//!         .with_options(ConnectOptions::new().with_attempts(5));
//!
//!     link.on_receive_json(|doc| println!("device says {doc}"));
//!     link.on_receive_raw(|line| println!("device says {line}"));
//!
//!     link.connect().await?;
//!     link.send_command("led", Some(json!({"on": true}))).await?;
//!     link.disconnect().await
//! }
//! ```
//!
//! ## Delivery
//!
//! There is no acknowledgement, retry or checksum at this layer. A lost
//! notification corrupts the frame it belonged to; applications that need
//! reliability add ids and timeouts on top.
//!
//! ## Platform Notes
//!
//! ### macOS
//! Requires Bluetooth permission. Add `NSBluetoothAlwaysUsageDescription`
//! to your Info.plist for bundled apps.
//!
//! ### Linux
//! Requires BlueZ. User may need to be in the `bluetooth` group.
//!
//! ### Windows
//! Requires Windows 10 or later with Bluetooth LE support.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for configuration types

// Public modules
pub mod ble;
pub mod central;
pub mod config;
pub mod error;
pub mod peripheral;
pub mod protocol;
pub mod receive;

// Re-exports for convenience
pub use central::CentralLink;
pub use config::{ConnectOptions, PeripheralConfig, WriteMode};
pub use error::{Error, Result};
pub use peripheral::{PeripheralEvents, PeripheralLink, PeripheralSender, PeripheralStack, PeripheralState};
pub use receive::ReceivePipeline;

// Re-export commonly used types from submodules
pub use ble::connection::{ConnectionEvent, ConnectionState};
pub use ble::uuids::{UART_RX_UUID, UART_SERVICE_UUID, UART_TX_UUID};
pub use protocol::{Classified, Dispatcher, OutboundMessage, FRAME_DELIMITER};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_exports() {
        // Verify that key types are exported
        let _ = std::any::TypeId::of::<CentralLink>();
        let _ = std::any::TypeId::of::<Error>();
        let _ = std::any::TypeId::of::<ConnectOptions>();
        let _ = std::any::TypeId::of::<PeripheralConfig>();
        let _ = std::any::TypeId::of::<PeripheralState>();
        let _ = std::any::TypeId::of::<ConnectionState>();
        let _ = std::any::TypeId::of::<OutboundMessage>();
    }

    #[test]
    fn test_delimiter_is_newline() {
        assert_eq!(FRAME_DELIMITER, b'\n');
    }
}
