//! Connection coordinator
//!
//! One transport-agnostic entry point for discovery, connection lifecycle,
//! and command exchange. The coordinator owns the single authoritative
//! [`ConnectionState`], dispatches to the serial or network transport by
//! [`PortKind`], and keeps the persisted configuration (last port, board)
//! in step with what actually happened.
//!
//! All operations return immediately. Outcomes are reported through the
//! caller's callbacks; transport errors are logged and never propagated.

pub mod state;

use crate::communication::{
    NetworkTransport, OpenOptions, SerialTransport, Transport, TransportEvents,
};
use parking_lot::Mutex;
use robolink_core::event_bus::{
    CommunicationEvent, ConnectionEvent, DisconnectReason, SettingsEvent,
};
use robolink_core::{
    emit, thread_safe, AppEvent, CloseCallback, ConnectionState, DoneCallback, LineCallback,
    OpenCallback, Payload, PortDescriptor, PortKind, PortListCallback, RawCallback,
    SuccessCallback, ThreadSafe,
};
use robolink_settings::{Config, ConfigStore, SettingsResult, CONFIG_VERSION};
use state::{ConnectionStateMachine, SessionId, StateEvent};
use std::path::PathBuf;
use std::sync::Arc;

/// Line terminator appended to text commands sent over serial
const SERIAL_LINE_ENDING: &str = "\r\n";

/// Caller-supplied sinks for one connection
pub struct ConnectHandlers {
    /// Each line received from the device
    pub on_line: LineCallback,
    /// Fired at most once, when the connection ends
    pub on_close: CloseCallback,
    /// Raw received chunks; only serial connections produce them
    pub on_raw: Option<RawCallback>,
}

impl ConnectHandlers {
    /// Handlers for lines and close
    pub fn new(on_line: LineCallback, on_close: CloseCallback) -> Self {
        Self {
            on_line,
            on_close,
            on_raw: None,
        }
    }

    /// Also receive raw chunks
    pub fn with_raw(mut self, on_raw: RawCallback) -> Self {
        self.on_raw = Some(on_raw);
        self
    }
}

impl std::fmt::Debug for ConnectHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectHandlers")
            .field("on_raw", &self.on_raw.is_some())
            .finish_non_exhaustive()
    }
}

/// State shared between the coordinator and the callbacks it hands out
struct Shared {
    machine: Mutex<ConnectionStateMachine>,
    config: Mutex<Config>,
    store: ConfigStore,
    disconnect_reason: Mutex<Option<DisconnectReason>>,
}

impl Shared {
    fn state(&self) -> ConnectionState {
        self.machine.lock().state().clone()
    }

    /// Record a link the transport reported open
    fn open_session(&self, path: &str, kind: PortKind) -> Option<SessionId> {
        let mut machine = self.machine.lock();
        match machine.transition(StateEvent::Opened {
            path: path.to_string(),
            kind,
        }) {
            Ok(_) => {
                let session = machine.session();
                drop(machine);
                *self.disconnect_reason.lock() = None;
                tracing::info!("Connected to {} over {}", path, kind);
                emit!(AppEvent::Connection(ConnectionEvent::Connected {
                    port: path.to_string(),
                    kind,
                }));
                Some(session)
            }
            Err(e) => {
                tracing::warn!("Discarding link to {}: {}", path, e);
                None
            }
        }
    }

    /// Handle the transport's close event for `session`
    fn close_session(&self, session: SessionId) {
        let mut machine = self.machine.lock();
        let path = machine.state().path().map(str::to_string);
        match machine.transition(StateEvent::Closed { session }) {
            Ok(_) => {
                drop(machine);
                let reason = self
                    .disconnect_reason
                    .lock()
                    .take()
                    .unwrap_or(DisconnectReason::ConnectionLost);
                let port = path.unwrap_or_default();
                tracing::info!("Disconnected from {} ({:?})", port, reason);
                emit!(AppEvent::Connection(ConnectionEvent::Disconnected {
                    port,
                    reason,
                }));
            }
            Err(e) => tracing::debug!("Ignoring close of session {}: {}", session, e),
        }
    }

    /// Clear the connection without waiting for the transport
    fn reset(&self, reason: DisconnectReason) {
        let mut machine = self.machine.lock();
        let previous = machine.state().clone();
        let _ = machine.transition(StateEvent::Reset);
        drop(machine);

        if let ConnectionState::Connected { path, .. } = previous {
            *self.disconnect_reason.lock() = None;
            tracing::info!("Disconnected from {} ({:?})", path, reason);
            emit!(AppEvent::Connection(ConnectionEvent::Disconnected {
                port: path,
                reason,
            }));
        }
    }

    fn save_config(&self) -> SettingsResult<()> {
        let config = self.config.lock().clone();
        self.store.save(&config)?;
        tracing::debug!("Configuration saved to {}", self.store.path().display());
        emit!(AppEvent::Settings(SettingsEvent::Saved));
        Ok(())
    }

    fn remember_serial_port(&self, path: &str) {
        self.config.lock().arduino.last_serial_port = Some(path.to_string());
        if let Err(e) = self.save_config() {
            tracing::warn!("Failed to persist last serial port: {}", e);
        }
    }
}

/// Transport-agnostic front door to the connected device
pub struct ConnectionCoordinator<S, N>
where
    S: SerialTransport + 'static,
    N: NetworkTransport + 'static,
{
    serial: Arc<S>,
    network: Arc<N>,
    shared: Arc<Shared>,
}

impl<S, N> ConnectionCoordinator<S, N>
where
    S: SerialTransport + 'static,
    N: NetworkTransport + 'static,
{
    /// Create a coordinator, loading configuration from `store`.
    ///
    /// A missing or unreadable file yields the default configuration.
    pub fn new(serial: Arc<S>, network: Arc<N>, store: ConfigStore) -> Self {
        let config = store.load().unwrap_or_else(|e| {
            tracing::warn!("Using default configuration: {}", e);
            Config::default()
        });
        Self::with_config(serial, network, store, config)
    }

    /// Create a coordinator around an already loaded configuration
    pub fn with_config(
        serial: Arc<S>,
        network: Arc<N>,
        store: ConfigStore,
        mut config: Config,
    ) -> Self {
        config.version = CONFIG_VERSION.to_string();
        config.arduino.path = std::env::current_dir()
            .map(|dir| dir.join("arduino"))
            .unwrap_or_else(|_| PathBuf::from("arduino"));

        Self {
            serial,
            network,
            shared: Arc::new(Shared {
                machine: Mutex::new(ConnectionStateMachine::new()),
                config: Mutex::new(config),
                store,
                disconnect_reason: Mutex::new(None),
            }),
        }
    }

    /// Point the arduino section at a different toolchain directory
    pub fn with_toolchain_path(self, path: impl Into<PathBuf>) -> Self {
        self.shared.config.lock().arduino.path = path.into();
        self
    }

    fn transport(&self, kind: PortKind) -> Arc<dyn Transport> {
        match kind {
            PortKind::Serial => self.serial.clone() as Arc<dyn Transport>,
            PortKind::Network => self.network.clone() as Arc<dyn Transport>,
        }
    }

    /// List connectable ports: network roster entries first, then serial devices.
    ///
    /// Also starts a probe sweep so the next call sees a fresher roster.
    pub fn enumerate_ports(&self, callback: PortListCallback) {
        let mut ports: Vec<PortDescriptor> = self
            .network
            .robot_roster()
            .iter()
            .map(|(id, ip)| PortDescriptor::network(id, *ip))
            .collect();

        self.serial.enumerate_devices(Box::new(move |devices| {
            for device in devices {
                if ports.iter().any(|p| p.path == device.port_name) {
                    continue;
                }
                ports.push(PortDescriptor::serial(device.port_name));
            }
            tracing::debug!("Enumerated {} port(s)", ports.len());
            callback(ports);
        }));

        self.network.ping_robots();
    }

    /// Connect to `port`.
    ///
    /// `on_success` receives the path the connection is known by. A failed
    /// attempt invokes nothing. Rejected while a connection is active.
    pub fn connect(
        &self,
        port: PortDescriptor,
        handlers: ConnectHandlers,
        on_success: SuccessCallback,
    ) {
        if let ConnectionState::Connected { path, .. } = self.connection_state() {
            tracing::warn!(
                "Refusing to connect to {}: already connected to {}",
                port.path,
                path
            );
            return;
        }

        let kind = port.kind;
        tracing::info!("Connecting to {}", port);
        emit!(AppEvent::Connection(ConnectionEvent::Connecting {
            port: port.path.clone(),
            kind,
        }));

        let session: ThreadSafe<Option<SessionId>> = thread_safe(None);
        let ConnectHandlers {
            on_line,
            on_close,
            on_raw,
        } = handlers;

        let line_sink: LineCallback = Arc::new(move |line: String| {
            tracing::trace!("<- {}", line);
            emit!(AppEvent::Communication(CommunicationEvent::LineReceived {
                line: line.clone(),
            }));
            on_line(line);
        });

        let close_sink: CloseCallback = {
            let shared = self.shared.clone();
            let session = session.clone();
            Box::new(move || {
                let Some(id) = *session.lock() else {
                    return;
                };
                shared.close_session(id);
                on_close();
            })
        };

        let mut events = TransportEvents::new(line_sink, close_sink);
        if let (PortKind::Serial, Some(on_raw)) = (kind, on_raw) {
            events = events.with_raw(on_raw);
        }

        let transport = self.transport(kind);
        let on_open: OpenCallback = {
            let shared = self.shared.clone();
            let transport = transport.clone();
            let requested = port.path.clone();
            Box::new(move |result| match result {
                Ok(path) => match shared.open_session(&path, kind) {
                    Some(id) => {
                        *session.lock() = Some(id);
                        if kind == PortKind::Serial {
                            shared.remember_serial_port(&path);
                        }
                        on_success(path);
                    }
                    None => transport.disconnect(None),
                },
                Err(e) => {
                    tracing::warn!("Failed to connect to {}: {}", requested, e);
                    emit!(AppEvent::Connection(ConnectionEvent::ConnectionFailed {
                        port: requested,
                        error: e.to_string(),
                    }));
                }
            })
        };

        let baud_rate = self.shared.config.lock().arduino.baudrate;
        transport.open(&port, OpenOptions::with_baud_rate(baud_rate), events, on_open);
    }

    /// Close the active connection.
    ///
    /// Does nothing, not even `callback`, when disconnected. A network
    /// connection is cleared immediately; a serial one when its close
    /// event arrives.
    pub fn disconnect(&self, callback: Option<DoneCallback>) {
        let state = self.connection_state();
        let Some(kind) = state.kind() else {
            tracing::debug!("Disconnect requested while disconnected");
            return;
        };

        *self.shared.disconnect_reason.lock() = Some(DisconnectReason::UserRequested);
        match kind {
            PortKind::Serial => self.serial.disconnect(callback),
            PortKind::Network => {
                self.network.disconnect(callback);
                self.shared.reset(DisconnectReason::UserRequested);
            }
        }
    }

    /// Send a command on the active connection; dropped when disconnected.
    ///
    /// Serial text commands are terminated with CRLF. Network payloads are
    /// framed by the network transport.
    pub fn send_command(&self, payload: impl Into<Payload>) {
        let Some(kind) = self.active_transport() else {
            tracing::debug!("Dropping command: not connected");
            return;
        };

        let payload = match (kind, payload.into()) {
            (PortKind::Serial, Payload::Text(mut text)) => {
                text.push_str(SERIAL_LINE_ENDING);
                Payload::Text(text)
            }
            (_, payload) => payload,
        };

        tracing::debug!("-> {} bytes over {}", payload.len(), kind);
        emit!(AppEvent::Communication(CommunicationEvent::DataSent {
            bytes: payload.len(),
            kind,
        }));
        self.transport(kind).send(payload);
    }

    /// Select the board type and persist it
    pub fn select_board(&self, board: impl Into<String>) -> SettingsResult<()> {
        let board = board.into();
        self.shared.config.lock().arduino.board = board.clone();
        tracing::info!("Board set to {}", board);
        emit!(AppEvent::Settings(SettingsEvent::BoardSelected { board }));
        self.save_config()
    }

    /// Enable a plugin, or none. Not persisted until the next save.
    pub fn select_plugin(&self, plugin: Option<String>) -> Option<String> {
        self.shared.config.lock().enabled_plugin = plugin.clone();
        emit!(AppEvent::Settings(SettingsEvent::PluginSelected {
            plugin: plugin.clone(),
        }));
        plugin
    }

    /// Serial bit rate for the next connection.
    ///
    /// Written to the configuration file by the next save, which a
    /// successful serial connect performs.
    pub fn set_baud_rate(&self, baud_rate: u32) {
        self.shared.config.lock().arduino.baudrate = baud_rate;
    }

    /// Persist the in-memory configuration
    pub fn save_config(&self) -> SettingsResult<()> {
        self.shared.save_config()
    }

    /// Snapshot of the in-memory configuration
    pub fn config(&self) -> Config {
        self.shared.config.lock().clone()
    }

    /// Current connection state
    pub fn connection_state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Path of the active connection
    pub fn connected_port(&self) -> Option<String> {
        self.connection_state().path().map(str::to_string)
    }

    /// Transport kind of the active connection
    pub fn active_transport(&self) -> Option<PortKind> {
        self.connection_state().kind()
    }

    /// Release the serial port ahead of a firmware upload.
    ///
    /// `callback` runs once the port is free, or immediately when no serial
    /// connection is open.
    pub fn prepare_for_upload(&self, callback: DoneCallback) {
        if self.active_transport() == Some(PortKind::Serial) {
            tracing::info!("Releasing serial port for upload");
            *self.shared.disconnect_reason.lock() = Some(DisconnectReason::Upload);
            self.serial.disconnect(Some(callback));
        } else {
            callback();
        }
    }

    /// Serial transport in use
    pub fn serial(&self) -> &Arc<S> {
        &self.serial
    }

    /// Network transport in use
    pub fn network(&self) -> &Arc<N> {
        &self.network
    }
}

impl<S, N> std::fmt::Debug for ConnectionCoordinator<S, N>
where
    S: SerialTransport + 'static,
    N: NetworkTransport + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionCoordinator")
            .field("state", &self.connection_state())
            .field("store", &self.shared.store.path())
            .finish_non_exhaustive()
    }
}
