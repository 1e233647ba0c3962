//! Link configuration.

use std::time::Duration;

use crate::error::{Error, Result};

/// Longest advertised name the peripheral accepts, in bytes.
pub const MAX_DEVICE_NAME_LEN: usize = 31;

// ----------------------------------------------------------------------------
// Peripheral
// ----------------------------------------------------------------------------

/// Configuration for the peripheral (advertising) side.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PeripheralConfig {
    /// Name the peripheral advertises under.
    pub device_name: String,
    /// Maximum bytes per notification.
    pub chunk_size: usize,
    /// Pause after each notification.
    pub inter_chunk_delay: Duration,
    /// Window in which repeated connect (or disconnect) events are ignored.
    pub debounce_window: Duration,
    /// Pause before tearing the stack down during reinit.
    pub teardown_delay: Duration,
    /// Pause between teardown and rebuild during reinit.
    pub reinit_settle_delay: Duration,
    /// MTU the stack is asked to negotiate. Chunking does not depend on it.
    pub preferred_mtu: u16,
}

impl Default for PeripheralConfig {
    fn default() -> Self {
        Self {
            device_name: "BleLink-Device".to_string(),
            chunk_size: 20, // fits the 23-byte default ATT MTU
            inter_chunk_delay: Duration::from_millis(2),
            debounce_window: Duration::from_millis(300),
            teardown_delay: Duration::from_millis(150),
            reinit_settle_delay: Duration::from_millis(250),
            preferred_mtu: 247,
        }
    }
}

impl PeripheralConfig {
    /// Create a configuration with default settings and the given name.
    pub fn new(device_name: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
            ..Self::default()
        }
    }

    /// Set the notification chunk size.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    /// Set the pause after each notification.
    pub fn with_inter_chunk_delay(mut self, delay: Duration) -> Self {
        self.inter_chunk_delay = delay;
        self
    }

    /// Set the connect/disconnect debounce window.
    pub fn with_debounce_window(mut self, window: Duration) -> Self {
        self.debounce_window = window;
        self
    }

    /// Set both reinit pauses.
    pub fn with_reinit_delays(mut self, teardown: Duration, settle: Duration) -> Self {
        self.teardown_delay = teardown;
        self.reinit_settle_delay = settle;
        self
    }

    /// Set the preferred MTU.
    pub fn with_preferred_mtu(mut self, mtu: u16) -> Self {
        self.preferred_mtu = mtu;
        self
    }

    /// Check the settings.
    pub fn validate(&self) -> Result<()> {
        if self.device_name.is_empty() || self.device_name.len() > MAX_DEVICE_NAME_LEN {
            return Err(Error::InvalidParameter {
                name: "device_name".to_string(),
                value: self.device_name.clone(),
            });
        }

        if self.chunk_size == 0 {
            return Err(Error::InvalidParameter {
                name: "chunk_size".to_string(),
                value: self.chunk_size.to_string(),
            });
        }

        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Central
// ----------------------------------------------------------------------------

/// How the central writes frames to the RX characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum WriteMode {
    /// Acknowledged write.
    #[default]
    WithResponse,
    /// Unacknowledged write command.
    WithoutResponse,
}

/// Options for a central connect call.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConnectOptions {
    /// Number of full scan/connect/discover attempts.
    pub attempts: u32,
    /// Pause between failed attempts.
    pub retry_delay: Duration,
    /// Bound on establishing the link and discovering its services.
    pub connect_timeout: Duration,
    /// Bound on finding the advertiser.
    pub scan_timeout: Duration,
    /// Write mode used by the send calls.
    pub write_mode: WriteMode,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            attempts: 3,
            retry_delay: Duration::from_millis(1500),
            connect_timeout: Duration::from_secs(20),
            scan_timeout: Duration::from_secs(12),
            write_mode: WriteMode::WithResponse,
        }
    }
}

impl ConnectOptions {
    /// Create options with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of attempts. Zero is treated as one.
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Set the pause between failed attempts.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set the link timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the scan timeout.
    pub fn with_scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    /// Set the write mode.
    pub fn with_write_mode(mut self, mode: WriteMode) -> Self {
        self.write_mode = mode;
        self
    }

    /// Attempts actually made.
    pub fn effective_attempts(&self) -> u32 {
        self.attempts.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peripheral_defaults() {
        let config = PeripheralConfig::default();
        assert_eq!(config.chunk_size, 20);
        assert_eq!(config.inter_chunk_delay, Duration::from_millis(2));
        assert_eq!(config.debounce_window, Duration::from_millis(300));
        assert_eq!(config.preferred_mtu, 247);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_peripheral_validation() {
        assert!(PeripheralConfig::new("").validate().is_err());
        assert!(PeripheralConfig::new("x".repeat(32)).validate().is_err());
        assert!(PeripheralConfig::new("x".repeat(31)).validate().is_ok());

        let err = PeripheralConfig::new("BLE-LINK-TEST")
            .with_chunk_size(0)
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { ref name, .. } if name == "chunk_size"));
    }

    #[test]
    fn test_connect_defaults() {
        let options = ConnectOptions::default();
        assert_eq!(options.attempts, 3);
        assert_eq!(options.retry_delay, Duration::from_millis(1500));
        assert_eq!(options.connect_timeout, Duration::from_secs(20));
        assert_eq!(options.scan_timeout, Duration::from_secs(12));
        assert_eq!(options.write_mode, WriteMode::WithResponse);
    }

    #[test]
    fn test_zero_attempts_means_one() {
        assert_eq!(ConnectOptions::new().with_attempts(0).effective_attempts(), 1);
        assert_eq!(ConnectOptions::new().with_attempts(5).effective_attempts(), 5);
    }
}
