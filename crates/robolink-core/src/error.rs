//! Error handling for RoboLink
//!
//! Provides error types for the layers below the connection coordinator:
//! - Connection errors (serial port and network session failures)
//! - State errors (illegal connection state transitions)
//!
//! All error types use `thiserror` for ergonomic error handling. None of them
//! cross the coordinator boundary: the coordinator logs them and reports
//! failure by not invoking the success callback.

use thiserror::Error;

/// Connection error type
///
/// Represents errors related to communication with a device over a
/// serial port or a network session.
#[derive(Error, Debug, Clone)]
pub enum ConnectionError {
    /// Port not found
    #[error("Port not found: {port}")]
    PortNotFound {
        /// The name of the port that was not found.
        port: String,
    },

    /// Failed to open port
    #[error("Failed to open port {port}: {reason}")]
    FailedToOpen {
        /// The name of the port that failed to open.
        port: String,
        /// The reason the port failed to open.
        reason: String,
    },

    /// Connection timeout
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// The timeout duration in milliseconds.
        timeout_ms: u64,
    },

    /// The link went away before it was established
    #[error("Connection lost: {reason}")]
    ConnectionLost {
        /// The reason the connection was lost.
        reason: String,
    },

    /// Session negotiation with a network device was refused or garbled
    #[error("Handshake with {address} failed: {reason}")]
    HandshakeFailed {
        /// The device address.
        address: String,
        /// What the device answered, or why no answer was usable.
        reason: String,
    },

    /// Serial port error
    #[error("Serial port error: {reason}")]
    SerialError {
        /// The reason for the serial port error.
        reason: String,
    },

    /// Invalid connection parameters
    #[error("Invalid connection parameters: {reason}")]
    InvalidParameters {
        /// The reason the parameters are invalid.
        reason: String,
    },
}

/// Connection state machine error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// A connection is already active
    #[error("Already connected to {path}")]
    AlreadyConnected {
        /// Path of the active connection.
        path: String,
    },

    /// No connection is active
    #[error("Not connected")]
    NotConnected,

    /// Invalid state transition
    #[error("Invalid state transition from {current} to {requested}")]
    InvalidTransition {
        /// The current state name.
        current: String,
        /// The requested state name.
        requested: String,
    },
}

/// Main error type for RoboLink
///
/// A unified error type that can represent any error from all layers.
#[derive(Error, Debug)]
pub enum Error {
    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// State machine error
    #[error(transparent)]
    State(#[from] StateError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::Connection(ConnectionError::ConnectionTimeout { .. })
        )
    }

    /// Check if this is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    /// Check if this is a state machine error
    pub fn is_state_error(&self) -> bool {
        matches!(self, Error::State(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error_display() {
        let err = ConnectionError::FailedToOpen {
            port: "/dev/ttyUSB0".to_string(),
            reason: "busy".to_string(),
        };
        assert_eq!(err.to_string(), "Failed to open port /dev/ttyUSB0: busy");

        let err = ConnectionError::HandshakeFailed {
            address: "192.168.1.5".to_string(),
            reason: "no reply".to_string(),
        };
        assert_eq!(err.to_string(), "Handshake with 192.168.1.5 failed: no reply");
    }

    #[test]
    fn test_error_classification() {
        let err: Error = ConnectionError::ConnectionTimeout { timeout_ms: 3000 }.into();
        assert!(err.is_timeout());
        assert!(err.is_connection_error());
        assert!(!err.is_state_error());

        let err: Error = StateError::NotConnected.into();
        assert!(err.is_state_error());
        assert_eq!(err.to_string(), "Not connected");
    }
}
