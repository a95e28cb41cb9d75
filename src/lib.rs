//! # RoboLink
//!
//! Connects a control application to a robotics board over a serial cable
//! or the local network, behind one connection contract.
//!
//! ## Architecture
//!
//! RoboLink is organized as a workspace with multiple crates:
//!
//! 1. **robolink-core** - Port descriptors, payloads, connection state, errors, events
//! 2. **robolink-settings** - Persisted configuration and its file store
//! 3. **robolink-communication** - Serial and network transports, connection coordinator
//! 4. **robolink** - Library facade and the `robolink` command-line tool
//!
//! ## Features
//!
//! - **Port Discovery**: USB serial boards plus devices answering UDP probes
//! - **Single Connection**: One guarded connection state shared by both transports
//! - **Text and Binary Commands**: CRLF-framed text over serial, raw buffers as-is
//! - **Persistence**: Last serial port and board type survive restarts

pub use robolink_communication::{
    list_ports, ConnectHandlers, ConnectionCoordinator, ConnectionStateMachine, LineFramer,
    NetConnection, NetworkTransport, OpenOptions, SerialConnection, SerialPortInfo,
    SerialTransport, SessionId, StateEvent, Transport, TransportEvents,
};

pub use robolink_core::{
    event_bus, AppEvent, ConnectionError, ConnectionState, DeviceRoster, Error, EventBus,
    EventFilter, Payload, PortDescriptor, PortKind, Result, StateError,
};

pub use robolink_settings::{
    ArduinoSettings, Config, ConfigStore, NetworkSettings, SettingsError, SettingsResult,
    CONFIG_VERSION,
};

use std::sync::Arc;
use tokio::runtime::Handle;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Coordinator over the real serial and network drivers
pub type DefaultCoordinator = ConnectionCoordinator<SerialConnection, NetConnection>;

/// Build a coordinator over the real drivers.
///
/// Configuration comes from `store`; its network section sets up the
/// network driver. Blocking and async work is scheduled on `runtime`.
pub fn build_coordinator(runtime: Handle, store: ConfigStore) -> DefaultCoordinator {
    let config = store.load().unwrap_or_else(|e| {
        tracing::warn!("Using default configuration: {}", e);
        Config::default()
    });

    let serial = Arc::new(SerialConnection::new(runtime.clone()));
    let network = Arc::new(NetConnection::new(runtime, config.network.clone()));
    ConnectionCoordinator::with_config(serial, network, store, config)
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable, multi-line records
    #[default]
    Pretty,
    /// One JSON object per record
    Json,
}

/// Initialize logging with the default configuration
///
/// Sets up structured logging with:
/// - Console output with pretty formatting
/// - RUST_LOG environment variable support (default level `info`)
pub fn init_logging() -> anyhow::Result<()> {
    init_logging_with(LogFormat::Pretty)
}

/// Initialize logging with the given output format
pub fn init_logging_with(format: LogFormat) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        LogFormat::Pretty => {
            let fmt_layer = fmt::layer()
                .with_writer(std::io::stdout)
                .with_target(true)
                .with_level(true)
                .with_thread_names(true)
                .with_line_number(true)
                .pretty();

            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .try_init()?;
        }
        LogFormat::Json => {
            let fmt_layer = fmt::layer()
                .with_writer(std::io::stdout)
                .with_target(true)
                .with_thread_names(true)
                .json();

            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .try_init()?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
        assert!(!BUILD_DATE.is_empty());
    }

    #[tokio::test]
    async fn test_build_coordinator_starts_disconnected() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator =
            build_coordinator(Handle::current(), ConfigStore::new(dir.path().join("config.json")));

        assert_eq!(coordinator.connection_state(), ConnectionState::Disconnected);
        assert_eq!(coordinator.config().version, CONFIG_VERSION);
        assert!(coordinator.network().robot_roster().is_empty());
    }
}
