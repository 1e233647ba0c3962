//! BLE communication module.
//!
//! Central-side plumbing: the stack capability traits, btleplug-backed
//! scanning, scoped characteristic resolution and the connection manager.

pub mod characteristics;
pub mod connection;
pub mod device;
pub mod scanner;
pub mod uuids;

#[cfg(test)]
pub(crate) mod testing;

pub use characteristics::UartCharacteristics;
pub use connection::{ConnectionEvent, ConnectionManager, ConnectionState};
pub use device::{CentralAdapter, GattCharacteristic, GattNotification, GattService, RemoteDevice};
pub use scanner::BleScanner;
pub use uuids::*;
