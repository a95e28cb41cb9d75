//! Serial port transport
//!
//! Provides serial port operations for boards attached by USB or RS-232.
//!
//! Supports:
//! - Port enumeration filtered to microcontroller-style device names
//! - Baud rate configuration (8N1, no flow control)
//! - Line-based and raw receive on a dedicated reader thread
//! - Raw-buffer and text send

use super::framing::LineFramer;
use super::{DeviceListCallback, OpenOptions, SerialTransport, Transport, TransportEvents};
use robolink_core::{
    thread_safe, ConnectionError, DoneCallback, Error, LineCallback, OpenCallback, Payload,
    PortDescriptor, PortKind, RawCallback, Result, ThreadSafe,
};
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

/// Read timeout; bounds how long a disconnect waits for the reader to notice
const READ_TIMEOUT: Duration = Duration::from_millis(10);

const READ_CHUNK: usize = 1024;

/// Information about an available serial port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialPortInfo {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    pub port_name: String,

    /// Port description (e.g., "USB Serial Port")
    pub description: String,

    /// Manufacturer name if available
    pub manufacturer: Option<String>,

    /// Serial number if available
    pub serial_number: Option<String>,

    /// USB vendor ID if applicable
    pub vid: Option<u16>,

    /// USB product ID if applicable
    pub pid: Option<u16>,
}

impl SerialPortInfo {
    /// Create a new port info
    pub fn new(port_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            description: description.into(),
            manufacturer: None,
            serial_number: None,
            vid: None,
            pid: None,
        }
    }

    /// Set manufacturer
    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    /// Set serial number
    pub fn with_serial_number(mut self, serial_number: impl Into<String>) -> Self {
        self.serial_number = Some(serial_number.into());
        self
    }

    /// Set USB IDs
    pub fn with_usb_ids(mut self, vid: u16, pid: u16) -> Self {
        self.vid = Some(vid);
        self.pid = Some(pid);
        self
    }
}

/// List serial ports that look like attached boards
///
/// Keeps only names matching USB-serial bridges and native USB CDC devices:
/// - Windows: COM* (e.g., COM1, COM3)
/// - Linux: /dev/ttyUSB*, /dev/ttyACM*
/// - macOS: /dev/cu.usbserial*, /dev/cu.usbmodem*, /dev/cu.wchusbserial*,
///   /dev/cu.SLAB_USBtoUART*
pub fn list_ports() -> Result<Vec<SerialPortInfo>> {
    let ports = serialport::available_ports().map_err(|e| {
        tracing::error!("Failed to enumerate serial ports: {}", e);
        ConnectionError::SerialError {
            reason: format!("Failed to enumerate ports: {}", e),
        }
    })?;

    Ok(ports
        .iter()
        .filter(|port| is_board_port(&port.port_name))
        .map(|port| {
            let info = SerialPortInfo::new(&port.port_name, get_port_description(port));

            match &port.port_type {
                serialport::SerialPortType::UsbPort(usb_info) => {
                    let mut info = info.with_usb_ids(usb_info.vid, usb_info.pid);
                    if let Some(ref mfg) = usb_info.manufacturer {
                        info = info.with_manufacturer(mfg);
                    }
                    if let Some(ref serial) = usb_info.serial_number {
                        info = info.with_serial_number(serial);
                    }
                    info
                }
                _ => info,
            }
        })
        .collect())
}

fn is_board_port(port_name: &str) -> bool {
    if let Some(number) = port_name.strip_prefix("COM") {
        return !number.is_empty() && number.chars().all(|c| c.is_ascii_digit());
    }

    const PREFIXES: [&str; 6] = [
        "/dev/ttyUSB",
        "/dev/ttyACM",
        "/dev/cu.usbserial",
        "/dev/cu.usbmodem",
        "/dev/cu.wchusbserial",
        "/dev/cu.SLAB_USBtoUART",
    ];
    PREFIXES.iter().any(|prefix| port_name.starts_with(prefix))
}

fn get_port_description(port: &serialport::SerialPortInfo) -> String {
    match &port.port_type {
        serialport::SerialPortType::UsbPort(usb_info) => {
            format!(
                "USB {} {}",
                usb_info.manufacturer.as_deref().unwrap_or("Device"),
                usb_info.product.as_deref().unwrap_or("Serial Port")
            )
        }
        serialport::SerialPortType::BluetoothPort => "Bluetooth Serial".to_string(),
        serialport::SerialPortType::PciPort => "PCI Serial".to_string(),
        _ => "Serial Port".to_string(),
    }
}

fn open_port(path: &str, baud_rate: u32) -> Result<Box<dyn serialport::SerialPort>> {
    if baud_rate == 0 {
        return Err(ConnectionError::InvalidParameters {
            reason: "baud rate must be > 0".to_string(),
        }
        .into());
    }

    serialport::new(path, baud_rate)
        .timeout(READ_TIMEOUT)
        .data_bits(serialport::DataBits::Eight)
        .stop_bits(serialport::StopBits::One)
        .parity(serialport::Parity::None)
        .flow_control(serialport::FlowControl::None)
        .open()
        .map_err(|e| {
            let err = match e.kind() {
                serialport::ErrorKind::NoDevice => ConnectionError::PortNotFound {
                    port: path.to_string(),
                },
                _ => ConnectionError::FailedToOpen {
                    port: path.to_string(),
                    reason: e.to_string(),
                },
            };
            Error::from(err)
        })
}

struct SerialSession {
    id: u64,
    path: String,
    /// `None` until the port has finished opening
    writer: Option<Box<dyn serialport::SerialPort>>,
    stop: Arc<AtomicBool>,
    on_disconnected: ThreadSafe<Option<DoneCallback>>,
}

/// Serial transport backed by the `serialport` crate.
///
/// Holds at most one port, claimed from the moment `open` is called until
/// it closes; a second `open` in that window fails at once. Received bytes are read on a dedicated
/// thread; opening and enumeration run on the tokio blocking pool.
pub struct SerialConnection {
    runtime: Handle,
    session: ThreadSafe<Option<SerialSession>>,
    next_id: AtomicU64,
}

impl SerialConnection {
    /// Create a transport that schedules blocking work on `runtime`
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            session: thread_safe(None),
            next_id: AtomicU64::new(0),
        }
    }

    /// Check if a port is currently open
    pub fn is_open(&self) -> bool {
        self.session
            .lock()
            .as_ref()
            .is_some_and(|s| s.writer.is_some())
    }

    /// Name of the open port
    pub fn port_name(&self) -> Option<String> {
        self.session
            .lock()
            .as_ref()
            .filter(|s| s.writer.is_some())
            .map(|s| s.path.clone())
    }

    /// Send text exactly as given; no terminator is added
    pub fn send_text(&self, text: &str) {
        self.send_buffer(text.as_bytes());
    }

    /// Send raw bytes
    pub fn send_buffer(&self, bytes: &[u8]) {
        let mut guard = self.session.lock();
        let Some(session) = guard.as_mut() else {
            tracing::debug!("Dropping {} bytes: no serial port open", bytes.len());
            return;
        };
        let Some(writer) = session.writer.as_mut() else {
            tracing::debug!("Dropping {} bytes: {} is still opening", bytes.len(), session.path);
            return;
        };

        match writer.write_all(bytes).and_then(|_| writer.flush()) {
            Ok(()) => tracing::debug!("Sent {} bytes to {}", bytes.len(), session.path),
            Err(e) => tracing::warn!("Write to {} failed: {}", session.path, e),
        }
    }
}

/// Give up the slot claimed by open `id`, reporting `error` to the opener
fn abandon_open(
    session: &ThreadSafe<Option<SerialSession>>,
    id: u64,
    error: Error,
    on_open: OpenCallback,
) {
    let mut guard = session.lock();
    let released = if guard.as_ref().is_some_and(|s| s.id == id) {
        guard.take()
    } else {
        None
    };
    drop(guard);

    let done = released
        .as_ref()
        .and_then(|s| s.on_disconnected.lock().take());
    drop(released);

    on_open(Err(error));
    if let Some(done) = done {
        done();
    }
}

impl Transport for SerialConnection {
    fn kind(&self) -> PortKind {
        PortKind::Serial
    }

    fn open(
        &self,
        port: &PortDescriptor,
        options: OpenOptions,
        events: TransportEvents,
        on_open: OpenCallback,
    ) {
        let path = port.path.clone();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let stop = Arc::new(AtomicBool::new(false));
        let on_disconnected: ThreadSafe<Option<DoneCallback>> = thread_safe(None);

        let mut guard = self.session.lock();
        if let Some(busy) = guard.as_ref() {
            let reason = match busy.writer {
                Some(_) => format!("{} is already open", busy.path),
                None => format!("{} is being opened", busy.path),
            };
            drop(guard);
            on_open(Err(ConnectionError::FailedToOpen { port: path, reason }.into()));
            return;
        }
        *guard = Some(SerialSession {
            id,
            path: path.clone(),
            writer: None,
            stop: stop.clone(),
            on_disconnected: on_disconnected.clone(),
        });
        drop(guard);

        let session = self.session.clone();
        self.runtime.spawn_blocking(move || {
            let reader = match open_port(&path, options.baud_rate) {
                Ok(port) => port,
                Err(e) => {
                    tracing::warn!("Failed to open serial port {}: {}", path, e);
                    abandon_open(&session, id, e, on_open);
                    return;
                }
            };
            let writer = match reader.try_clone() {
                Ok(writer) => writer,
                Err(e) => {
                    tracing::warn!("Failed to clone serial handle for {}: {}", path, e);
                    drop(reader);
                    let e = ConnectionError::SerialError {
                        reason: e.to_string(),
                    };
                    abandon_open(&session, id, e.into(), on_open);
                    return;
                }
            };

            // The reader waits for the go-ahead so no line precedes `on_open`.
            let (start, started) = std::sync::mpsc::channel::<bool>();
            let reader_thread = {
                let session = session.clone();
                let stop = stop.clone();
                let on_disconnected = on_disconnected.clone();
                let path = path.clone();
                std::thread::Builder::new()
                    .name("serial-reader".to_string())
                    .spawn(move || {
                        if started.recv() != Ok(true) {
                            return;
                        }
                        let TransportEvents {
                            on_line,
                            on_close,
                            on_raw,
                        } = events;
                        read_loop(reader, &stop, &on_line, on_raw.as_ref(), &path);

                        tracing::info!("Serial port {} closed", path);
                        on_close();

                        let mut guard = session.lock();
                        if guard.as_ref().is_some_and(|s| s.id == id) {
                            guard.take();
                        }
                        drop(guard);

                        let done = on_disconnected.lock().take();
                        if let Some(done) = done {
                            done();
                        }
                    })
            };
            let reader_thread = match reader_thread {
                Ok(handle) => handle,
                Err(e) => {
                    tracing::error!("Failed to start serial reader for {}: {}", path, e);
                    drop(writer);
                    abandon_open(&session, id, Error::Io(e), on_open);
                    return;
                }
            };

            let mut writer = Some(writer);
            let mut guard = session.lock();
            let claimed = match guard.as_mut() {
                Some(s) if s.id == id && !stop.load(Ordering::SeqCst) => {
                    s.writer = writer.take();
                    true
                }
                _ => false,
            };
            drop(guard);

            if !claimed {
                tracing::debug!("Serial port {} closed while opening", path);
                // Both handles are gone before anyone hears about it.
                drop(writer);
                let _ = start.send(false);
                let _ = reader_thread.join();
                let e = ConnectionError::ConnectionLost {
                    reason: format!("{} was closed while opening", path),
                };
                abandon_open(&session, id, e.into(), on_open);
                return;
            }

            tracing::info!("Opened serial port {} at {} baud", path, options.baud_rate);
            on_open(Ok(path));
            let _ = start.send(true);
        });
    }

    fn disconnect(&self, callback: Option<DoneCallback>) {
        let mut guard = self.session.lock();
        let Some(session) = guard.as_ref() else {
            drop(guard);
            if let Some(callback) = callback {
                callback();
            }
            return;
        };

        tracing::debug!("Closing serial port {}", session.path);
        *session.on_disconnected.lock() = callback;
        session.stop.store(true, Ordering::SeqCst);
        let opened = session.writer.is_some();

        // An opening port keeps its slot; the opener releases it.
        if opened {
            guard.take();
        }
    }

    fn send(&self, payload: Payload) {
        match payload {
            Payload::Text(text) => self.send_text(&text),
            Payload::Binary(bytes) => self.send_buffer(&bytes),
        }
    }
}

impl SerialTransport for SerialConnection {
    fn enumerate_devices(&self, callback: DeviceListCallback) {
        self.runtime.spawn_blocking(move || {
            let devices = list_ports().unwrap_or_else(|e| {
                tracing::warn!("Serial scan failed, reporting no devices: {}", e);
                Vec::new()
            });
            callback(devices);
        });
    }
}

fn read_loop(
    mut port: Box<dyn serialport::SerialPort>,
    stop: &AtomicBool,
    on_line: &LineCallback,
    on_raw: Option<&RawCallback>,
    path: &str,
) {
    let mut framer = LineFramer::new();
    let mut buf = [0u8; READ_CHUNK];

    while !stop.load(Ordering::SeqCst) {
        match port.read(&mut buf) {
            Ok(0) => {}
            Ok(n) => {
                if let Some(on_raw) = on_raw {
                    on_raw(&buf[..n]);
                }
                for line in framer.push(&buf[..n]) {
                    tracing::trace!("{} <- {}", path, line);
                    on_line(line);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                tracing::warn!("Serial port {} lost: {}", path, e);
                break;
            }
        }
    }
}

impl std::fmt::Debug for SerialConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialConnection")
            .field("port", &self.port_name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_board_port_patterns() {
        assert!(is_board_port("COM3"));
        assert!(is_board_port("COM12"));
        assert!(is_board_port("/dev/ttyUSB0"));
        assert!(is_board_port("/dev/ttyACM1"));
        assert!(is_board_port("/dev/cu.usbserial-1420"));
        assert!(is_board_port("/dev/cu.usbmodem14101"));
        assert!(is_board_port("/dev/cu.wchusbserial1410"));
        assert!(is_board_port("/dev/cu.SLAB_USBtoUART"));

        assert!(!is_board_port("COM"));
        assert!(!is_board_port("COMx"));
        assert!(!is_board_port("/dev/ttyS0"));
        assert!(!is_board_port("/dev/cu.Bluetooth-Incoming-Port"));
    }

    #[test]
    fn test_port_info_builder() {
        let info = SerialPortInfo::new("/dev/ttyUSB0", "USB CH340")
            .with_manufacturer("QinHeng")
            .with_usb_ids(0x1a86, 0x7523);
        assert_eq!(info.vid, Some(0x1a86));
        assert_eq!(info.manufacturer.as_deref(), Some("QinHeng"));
        assert!(info.serial_number.is_none());
    }

    #[test]
    fn test_zero_baud_rate_rejected() {
        let err = open_port("/dev/ttyUSB0", 0).err().expect("should fail");
        assert!(matches!(
            err,
            Error::Connection(ConnectionError::InvalidParameters { .. })
        ));
    }

    #[tokio::test]
    async fn test_open_missing_port_reports_failure() {
        let serial = SerialConnection::new(Handle::current());
        let (tx, rx) = tokio::sync::oneshot::channel();

        let events = TransportEvents::new(Arc::new(|_| {}), Box::new(|| {}));
        serial.open(
            &PortDescriptor::serial("/dev/robolink-does-not-exist"),
            OpenOptions::with_baud_rate(115200),
            events,
            Box::new(move |result| {
                let _ = tx.send(result.is_err());
            }),
        );

        assert!(rx.await.unwrap());
        assert!(!serial.is_open());
    }

    #[test]
    fn test_send_without_port_is_dropped() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let serial = SerialConnection::new(runtime.handle().clone());
        serial.send(Payload::from("M1\r\n"));
        assert!(!serial.is_open());
    }

    #[test]
    fn test_disconnect_without_port_still_completes() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let serial = SerialConnection::new(runtime.handle().clone());
        let done = Arc::new(AtomicBool::new(false));
        let flag = done.clone();
        serial.disconnect(Some(Box::new(move || flag.store(true, Ordering::SeqCst))));
        assert!(done.load(Ordering::SeqCst));
    }
}
