//! BLE Service and Characteristic UUIDs.
//!
//! The link rides on the Nordic UART Service (NUS): one service with a
//! write characteristic for host→device traffic and a notify characteristic
//! for device→host traffic.

use uuid::Uuid;

/// Nordic UART Service UUID.
pub const UART_SERVICE_UUID: Uuid = Uuid::from_u128(0x6e40_0001_b5a3_f393_e0a9_e50e24dcca9e);
/// UART RX characteristic UUID (central writes, peripheral receives).
pub const UART_RX_UUID: Uuid = Uuid::from_u128(0x6e40_0002_b5a3_f393_e0a9_e50e24dcca9e);
/// UART TX characteristic UUID (peripheral notifies, central receives).
pub const UART_TX_UUID: Uuid = Uuid::from_u128(0x6e40_0003_b5a3_f393_e0a9_e50e24dcca9e);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_format() {
        assert_eq!(
            UART_SERVICE_UUID.to_string(),
            "6e400001-b5a3-f393-e0a9-e50e24dcca9e"
        );
        assert_eq!(UART_RX_UUID.to_string(), "6e400002-b5a3-f393-e0a9-e50e24dcca9e");
        assert_eq!(UART_TX_UUID.to_string(), "6e400003-b5a3-f393-e0a9-e50e24dcca9e");
    }
}
