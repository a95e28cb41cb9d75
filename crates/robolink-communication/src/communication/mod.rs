//! Transport layer
//!
//! One capability set, [`Transport`], covers everything the coordinator does
//! with an open link: open it, send on it, close it. The two concrete
//! transports extend it with their discovery side:
//! - [`SerialTransport`] enumerates local serial devices
//! - [`NetworkTransport`] keeps a roster of devices answering probe sweeps
//!
//! Every operation completes through callbacks and returns immediately.
//! Implementations must invoke each callback at most once, fire the open
//! callback before delivering any line, and fire the close callback after
//! the last line of a session.

pub mod framing;
pub mod network;
pub mod serial;

use robolink_core::{
    CloseCallback, DeviceRoster, DoneCallback, LineCallback, OpenCallback, Payload,
    PortDescriptor, PortKind, RawCallback,
};
use serial::SerialPortInfo;

/// Receives the result of a serial device scan
pub type DeviceListCallback = Box<dyn FnOnce(Vec<SerialPortInfo>) + Send>;

/// Parameters for opening a link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenOptions {
    /// Serial bit rate; ignored by network transports
    pub baud_rate: u32,
}

impl OpenOptions {
    /// Options with the given bit rate
    pub fn with_baud_rate(baud_rate: u32) -> Self {
        Self { baud_rate }
    }
}

/// Event sinks handed to a transport when a link is opened
pub struct TransportEvents {
    /// Each received line, terminator stripped
    pub on_line: LineCallback,
    /// Fired once when the session ends, whoever ended it
    pub on_close: CloseCallback,
    /// Raw received chunks, for transports that expose them
    pub on_raw: Option<RawCallback>,
}

impl TransportEvents {
    /// Events with line and close sinks only
    pub fn new(on_line: LineCallback, on_close: CloseCallback) -> Self {
        Self {
            on_line,
            on_close,
            on_raw: None,
        }
    }

    /// Also forward raw received chunks
    pub fn with_raw(mut self, on_raw: RawCallback) -> Self {
        self.on_raw = Some(on_raw);
        self
    }
}

impl std::fmt::Debug for TransportEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportEvents")
            .field("on_raw", &self.on_raw.is_some())
            .finish_non_exhaustive()
    }
}

/// Capability set shared by every transport
pub trait Transport: Send + Sync {
    /// Kind of port this transport serves
    fn kind(&self) -> PortKind;

    /// Open a link to `port`.
    ///
    /// `on_open` receives the path the link is known by, or the reason it
    /// could not be opened. On failure `events` is dropped unused.
    fn open(
        &self,
        port: &PortDescriptor,
        options: OpenOptions,
        events: TransportEvents,
        on_open: OpenCallback,
    );

    /// Close the open link, then invoke `callback`
    fn disconnect(&self, callback: Option<DoneCallback>);

    /// Best-effort send on the open link; dropped when nothing is open
    fn send(&self, payload: Payload);
}

/// Serial cable transport
pub trait SerialTransport: Transport {
    /// Scan for serial devices; a failed scan reports an empty list
    fn enumerate_devices(&self, callback: DeviceListCallback);
}

/// Local network transport
pub trait NetworkTransport: Transport {
    /// Start a probe sweep; the roster is rebuilt when it finishes
    fn ping_robots(&self);

    /// Snapshot of the devices that answered the last completed sweep
    fn robot_roster(&self) -> DeviceRoster;
}
