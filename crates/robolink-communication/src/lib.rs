//! # RoboLink Communication
//!
//! Transports and the connection coordinator for RoboLink.
//! Supports Serial/USB boards and network devices discovered by UDP probe,
//! both driven through one transport-agnostic coordinator.

pub mod communication;
pub mod coordinator;

pub use communication::{
    framing::LineFramer,
    network::NetConnection,
    serial::{list_ports, SerialConnection, SerialPortInfo},
    DeviceListCallback, NetworkTransport, OpenOptions, SerialTransport, Transport,
    TransportEvents,
};

pub use coordinator::{
    state::{ConnectionStateMachine, SessionId, StateEvent},
    ConnectHandlers, ConnectionCoordinator,
};
