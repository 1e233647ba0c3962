//! Error types for the ble-line-link crate.

use thiserror::Error;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Bluetooth is not available or is disabled on this system.
    #[error("Bluetooth not available or disabled")]
    BluetoothUnavailable,

    /// No advertiser with the configured name showed up before the scan timed out.
    #[error("Device '{name}' not found (scan timeout)")]
    ScanTimeout {
        /// The advertised name that was searched for.
        name: String,
    },

    /// The link to the device could not be established.
    #[error("Link failed: {reason}")]
    LinkFailed {
        /// Description of why the link failed.
        reason: String,
    },

    /// Service not found on the device.
    #[error("Service not found: {uuid}")]
    ServiceNotFound {
        /// The UUID of the service that was not found.
        uuid: String,
    },

    /// Characteristic not found inside the discovered service.
    #[error("Characteristic not found: {uuid}")]
    CharacteristicNotFound {
        /// The UUID of the characteristic that was not found.
        uuid: String,
    },

    /// Enabling notifications on the TX characteristic failed.
    #[error("Subscribe failed: {reason}")]
    SubscribeFailed {
        /// Description of why the subscription failed.
        reason: String,
    },

    /// Every connection attempt failed. Carries the cause of the last one.
    #[error("Could not connect after {attempts} attempts: {source}")]
    ConnectionFailed {
        /// Number of attempts that were made.
        attempts: u32,
        /// The failure of the final attempt.
        #[source]
        source: Box<Error>,
    },

    /// A connect call is already running for this session.
    #[error("Connection already in progress")]
    ConnectionInProgress,

    /// Operation requires a connection but the link is down.
    #[error("Not connected")]
    NotConnected,

    /// Writing a frame to the RX characteristic failed.
    #[error("Write failed: {reason}")]
    WriteFailed {
        /// Description of why the write failed.
        reason: String,
    },

    /// A structured document could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The local peripheral stack rejected an operation.
    #[error("Peripheral stack error during {operation}: {reason}")]
    Stack {
        /// The stack operation that failed.
        operation: &'static str,
        /// Description reported by the stack.
        reason: String,
    },

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter {
        /// The name of the parameter.
        name: String,
        /// The invalid value that was provided.
        value: String,
    },
}

impl Error {
    /// Build a [`Error::Stack`] from any displayable stack error.
    pub fn stack(operation: &'static str, reason: impl std::fmt::Display) -> Self {
        Self::Stack {
            operation,
            reason: reason.to_string(),
        }
    }

    /// The innermost cause, looking through [`Error::ConnectionFailed`].
    pub fn root_cause(&self) -> &Error {
        match self {
            Self::ConnectionFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_failed_carries_last_cause() {
        let err = Error::ConnectionFailed {
            attempts: 3,
            source: Box::new(Error::ServiceNotFound {
                uuid: "6e400001".to_string(),
            }),
        };

        assert!(matches!(err.root_cause(), Error::ServiceNotFound { .. }));
        assert_eq!(
            err.to_string(),
            "Could not connect after 3 attempts: Service not found: 6e400001"
        );
    }

    #[test]
    fn test_stack_error_display() {
        let err = Error::stack("notify", "queue full");
        assert_eq!(
            err.to_string(),
            "Peripheral stack error during notify: queue full"
        );
    }
}
