//! Event type definitions for the event bus.
//!
//! Events are cloneable and serializable so they can be logged or replayed.

use serde::{Deserialize, Serialize};

use crate::port::PortKind;

/// Root event enum for all application events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AppEvent {
    /// Connection lifecycle events
    Connection(ConnectionEvent),
    /// Traffic and discovery events
    Communication(CommunicationEvent),
    /// Settings and configuration
    Settings(SettingsEvent),
}

impl AppEvent {
    /// Get the category of this event
    pub fn category(&self) -> EventCategory {
        match self {
            AppEvent::Connection(_) => EventCategory::Connection,
            AppEvent::Communication(_) => EventCategory::Communication,
            AppEvent::Settings(_) => EventCategory::Settings,
        }
    }

    /// Port path the event concerns, for connection events
    pub fn port(&self) -> Option<&str> {
        match self {
            AppEvent::Connection(
                ConnectionEvent::Connecting { port, .. }
                | ConnectionEvent::Connected { port, .. }
                | ConnectionEvent::Disconnected { port, .. }
                | ConnectionEvent::ConnectionFailed { port, .. },
            ) => Some(port.as_str()),
            _ => None,
        }
    }

    /// Get a short description of this event for logging
    pub fn description(&self) -> String {
        match self {
            AppEvent::Connection(e) => e.description(),
            AppEvent::Communication(e) => e.description(),
            AppEvent::Settings(e) => e.description(),
        }
    }
}

/// Event category for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventCategory {
    /// Connection lifecycle events.
    Connection,
    /// Traffic and discovery events.
    Communication,
    /// Settings and configuration events.
    Settings,
}

impl std::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventCategory::Connection => write!(f, "Connection"),
            EventCategory::Communication => write!(f, "Communication"),
            EventCategory::Settings => write!(f, "Settings"),
        }
    }
}

/// Reason for disconnection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisconnectReason {
    /// Caller requested disconnect
    UserRequested,
    /// The transport reported the link closed on its own
    ConnectionLost,
    /// Serial port released ahead of a firmware upload
    Upload,
}

/// Connection-related events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ConnectionEvent {
    /// Starting connection attempt.
    Connecting {
        /// Port path being connected to.
        port: String,
        /// Transport used for the attempt.
        kind: PortKind,
    },
    /// Successfully connected.
    Connected {
        /// Path reported by the transport.
        port: String,
        /// Transport that owns the connection.
        kind: PortKind,
    },
    /// Disconnected from device.
    Disconnected {
        /// Path of the connection that ended.
        port: String,
        /// Reason for the disconnection.
        reason: DisconnectReason,
    },
    /// Connection attempt failed.
    ConnectionFailed {
        /// Port path that failed to connect.
        port: String,
        /// Error message describing the failure.
        error: String,
    },
}

impl ConnectionEvent {
    fn description(&self) -> String {
        match self {
            ConnectionEvent::Connecting { port, kind } => {
                format!("Connecting to {} over {}", port, kind)
            }
            ConnectionEvent::Connected { port, kind } => {
                format!("Connected to {} ({})", port, kind)
            }
            ConnectionEvent::Disconnected { port, reason } => {
                format!("Disconnected from {}: {:?}", port, reason)
            }
            ConnectionEvent::ConnectionFailed { port, error } => {
                format!("Connection failed to {}: {}", port, error)
            }
        }
    }
}

/// Communication layer events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CommunicationEvent {
    /// Payload handed to the active transport.
    DataSent {
        /// Number of bytes sent, framing included.
        bytes: usize,
        /// Transport that carried it.
        kind: PortKind,
    },
    /// Line received from the device.
    LineReceived {
        /// The received line without its terminator.
        line: String,
    },
    /// A network probe sweep finished and the roster was rebuilt.
    ProbeSweepCompleted {
        /// Number of devices that answered.
        devices: usize,
    },
}

impl CommunicationEvent {
    fn description(&self) -> String {
        match self {
            CommunicationEvent::DataSent { bytes, kind } => {
                format!("TX: {} bytes over {}", bytes, kind)
            }
            CommunicationEvent::LineReceived { line } => {
                let truncated = if line.len() > 50 {
                    format!("{}...", line.chars().take(50).collect::<String>())
                } else {
                    line.clone()
                };
                format!("RX: {}", truncated.trim())
            }
            CommunicationEvent::ProbeSweepCompleted { devices } => {
                format!("Probe sweep found {} device(s)", devices)
            }
        }
    }
}

/// Settings-related events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SettingsEvent {
    /// Settings saved.
    Saved,
    /// Board type changed.
    BoardSelected {
        /// The new board type.
        board: String,
    },
    /// Enabled plugin changed.
    PluginSelected {
        /// The plugin now enabled, if any.
        plugin: Option<String>,
    },
}

impl SettingsEvent {
    fn description(&self) -> String {
        match self {
            SettingsEvent::Saved => "Settings saved".to_string(),
            SettingsEvent::BoardSelected { board } => format!("Board: {}", board),
            SettingsEvent::PluginSelected { plugin } => {
                format!("Plugin: {}", plugin.as_deref().unwrap_or("none"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_category() {
        let event = AppEvent::Connection(ConnectionEvent::Connected {
            port: "/dev/ttyUSB0".to_string(),
            kind: PortKind::Serial,
        });
        assert_eq!(event.category(), EventCategory::Connection);
        assert_eq!(event.port(), Some("/dev/ttyUSB0"));

        let event = AppEvent::Settings(SettingsEvent::Saved);
        assert_eq!(event.category(), EventCategory::Settings);
        assert_eq!(event.port(), None);
    }

    #[test]
    fn test_event_description() {
        let event = AppEvent::Connection(ConnectionEvent::Connected {
            port: "bot1:192.168.1.5".to_string(),
            kind: PortKind::Network,
        });
        assert!(event.description().contains("Connected"));
        assert!(event.description().contains("net"));

        let long = "x".repeat(80);
        let event = AppEvent::Communication(CommunicationEvent::LineReceived { line: long });
        assert!(event.description().ends_with("..."));
    }

    #[test]
    fn test_event_serialization() {
        let event = AppEvent::Settings(SettingsEvent::BoardSelected {
            board: "nano".to_string(),
        });
        let json = serde_json::to_string(&event).expect("Should serialize");
        let parsed: AppEvent = serde_json::from_str(&json).expect("Should deserialize");

        if let AppEvent::Settings(SettingsEvent::BoardSelected { board }) = parsed {
            assert_eq!(board, "nano");
        } else {
            panic!("Wrong event type after deserialization");
        }
    }
}
