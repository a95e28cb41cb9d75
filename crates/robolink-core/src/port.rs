//! Port and connection data model
//!
//! Describes connectable endpoints discovered by enumeration, the payloads
//! exchanged with a connected device, and the single active-connection state.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;

/// Transport kind of a connectable endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortKind {
    /// Serial/USB cable
    #[serde(rename = "serial")]
    Serial,
    /// Local network device
    #[serde(rename = "net")]
    Network,
}

impl fmt::Display for PortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serial => write!(f, "serial"),
            Self::Network => write!(f, "net"),
        }
    }
}

/// One connectable endpoint, as produced by a single enumeration.
///
/// Descriptors are immutable snapshots; enumeration rebuilds them from
/// scratch every time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortDescriptor {
    /// Serial device path, or `"<deviceId>:<ip>"` for network devices
    pub path: String,
    /// Transport kind
    pub kind: PortKind,
    /// Device address; present only for network endpoints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<IpAddr>,
}

impl PortDescriptor {
    /// Describe a serial device
    pub fn serial(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: PortKind::Serial,
            ip: None,
        }
    }

    /// Describe a network device from its roster entry
    pub fn network(device_id: &str, ip: IpAddr) -> Self {
        Self {
            path: format!("{}:{}", device_id, ip),
            kind: PortKind::Network,
            ip: Some(ip),
        }
    }
}

impl fmt::Display for PortDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.path, self.kind)
    }
}

/// Command payload sent to a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Text command; line framing is added by the path that sends it
    Text(String),
    /// Raw bytes, always sent unmodified
    Binary(Vec<u8>),
}

impl Payload {
    /// Bytes of this payload as they would go on the wire without framing
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Text(text) => text.as_bytes(),
            Payload::Binary(bytes) => bytes,
        }
    }

    /// Check if this is a text payload
    pub fn is_text(&self) -> bool {
        matches!(self, Payload::Text(_))
    }

    /// Byte length without framing
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Check if the payload carries no bytes
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Binary(bytes)
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Payload::Binary(bytes.to_vec())
    }
}

/// The single active connection, if any
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No active connection
    #[default]
    Disconnected,
    /// Connected through one transport
    Connected {
        /// Path reported by the transport on success
        path: String,
        /// Transport that owns the connection
        kind: PortKind,
    },
}

impl ConnectionState {
    /// Check if a connection is active
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected { .. })
    }

    /// Transport kind of the active connection
    pub fn kind(&self) -> Option<PortKind> {
        match self {
            ConnectionState::Connected { kind, .. } => Some(*kind),
            ConnectionState::Disconnected => None,
        }
    }

    /// Path of the active connection
    pub fn path(&self) -> Option<&str> {
        match self {
            ConnectionState::Connected { path, .. } => Some(path),
            ConnectionState::Disconnected => None,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connected { path, kind } => {
                write!(f, "Connected({}, {})", path, kind)
            }
        }
    }
}

/// Reachable network devices: device id to last-known address.
///
/// Ordered by device id so enumeration output is stable.
pub type DeviceRoster = BTreeMap<String, IpAddr>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_network_descriptor_path() {
        let ip = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 5));
        let port = PortDescriptor::network("bot1", ip);
        assert_eq!(port.path, "bot1:192.168.1.5");
        assert_eq!(port.kind, PortKind::Network);
        assert_eq!(port.ip, Some(ip));
    }

    #[test]
    fn test_serial_descriptor_has_no_ip() {
        let port = PortDescriptor::serial("/dev/ttyUSB0");
        assert_eq!(port.kind, PortKind::Serial);
        assert!(port.ip.is_none());
    }

    #[test]
    fn test_descriptor_serialization() {
        let json = serde_json::to_string(&PortDescriptor::serial("COM3")).unwrap();
        assert_eq!(json, r#"{"path":"COM3","kind":"serial"}"#);

        let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7));
        let json = serde_json::to_string(&PortDescriptor::network("kb", ip)).unwrap();
        assert_eq!(json, r#"{"path":"kb:10.0.0.7","kind":"net","ip":"10.0.0.7"}"#);
    }

    #[test]
    fn test_payload_conversions() {
        assert_eq!(Payload::from("M1"), Payload::Text("M1".to_string()));
        assert_eq!(Payload::from(vec![1u8, 2]), Payload::Binary(vec![1, 2]));
        assert_eq!(Payload::from(&[0xffu8][..]).as_bytes(), &[0xff]);
        assert!(Payload::from("").is_empty());
    }

    #[test]
    fn test_connection_state_accessors() {
        let state = ConnectionState::default();
        assert!(!state.is_connected());
        assert_eq!(state.kind(), None);

        let state = ConnectionState::Connected {
            path: "/dev/ttyACM0".to_string(),
            kind: PortKind::Serial,
        };
        assert!(state.is_connected());
        assert_eq!(state.kind(), Some(PortKind::Serial));
        assert_eq!(state.path(), Some("/dev/ttyACM0"));
    }
}
