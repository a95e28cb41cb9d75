//! Configuration record for RoboLink
//!
//! Provides the persisted configuration, its validation, and file I/O.
//! Supports JSON and TOML file formats; keys are camelCase so existing
//! JSON configuration files keep loading.
//!
//! Configuration is organized into logical sections:
//! - Arduino settings (toolchain path, baud rate, board, last serial port)
//! - Network settings (discovery and session parameters)
//! - Enabled plugin and config version

use crate::error::{ConfigError, SettingsResult};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

/// Version stamped into every configuration the application writes
pub const CONFIG_VERSION: &str = "1.11";

/// Default serial bit rate
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Default board type
pub const DEFAULT_BOARD: &str = "uno";

/// Board toolchain and serial settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ArduinoSettings {
    /// Bundled toolchain directory
    pub path: PathBuf,
    /// Serial bit rate
    pub baudrate: u32,
    /// Selected board type
    pub board: String,
    /// Last serial port connected successfully
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_serial_port: Option<String>,
}

impl Default for ArduinoSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("arduino"),
            baudrate: DEFAULT_BAUD_RATE,
            board: DEFAULT_BOARD.to_string(),
            last_serial_port: None,
        }
    }
}

/// Network discovery and session settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NetworkSettings {
    /// Address probe datagrams are sent to
    pub probe_address: IpAddr,
    /// UDP port devices listen on for probes
    pub discovery_port: u16,
    /// TCP port devices accept sessions on
    pub session_port: u16,
    /// How long a probe sweep collects replies
    pub probe_window_ms: u64,
    /// How long session negotiation may take
    pub handshake_timeout_ms: u64,
    /// Datagram body of a probe
    pub probe_message: String,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            probe_address: IpAddr::V4(Ipv4Addr::BROADCAST),
            discovery_port: 8266,
            session_port: 8267,
            probe_window_ms: 800,
            handshake_timeout_ms: 3000,
            probe_message: "kittenbot?".to_string(),
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Config format version
    pub version: String,
    /// Plugin enabled at startup
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled_plugin: Option<String>,
    /// Board toolchain and serial settings
    pub arduino: ArduinoSettings,
    /// Network discovery settings
    pub network: NetworkSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION.to_string(),
            enabled_plugin: None,
            arduino: ArduinoSettings::default(),
            network: NetworkSettings::default(),
        }
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let content = std::fs::read_to_string(path)?;

        let config: Self = match Format::of(path)? {
            Format::Json => serde_json::from_str(&content)?,
            Format::Toml => toml::from_str(&content)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Save config to file (JSON or TOML)
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;

        let content = match Format::of(path)? {
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Toml => toml::to_string_pretty(self)?,
        };

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.arduino.baudrate == 0 {
            return Err(out_of_range("arduino.baudrate", 0));
        }

        if self.network.discovery_port == 0 {
            return Err(out_of_range("network.discoveryPort", 0));
        }

        if self.network.session_port == 0 {
            return Err(out_of_range("network.sessionPort", 0));
        }

        if self.network.probe_window_ms == 0 {
            return Err(out_of_range("network.probeWindowMs", 0));
        }

        if self.network.handshake_timeout_ms == 0 {
            return Err(out_of_range("network.handshakeTimeoutMs", 0));
        }

        Ok(())
    }
}

fn out_of_range(key: &str, value: impl ToString) -> ConfigError {
    ConfigError::ValueOutOfRange {
        key: key.to_string(),
        value: value.to_string(),
    }
}

enum Format {
    Json,
    Toml,
}

impl Format {
    fn of(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(Format::Json),
            Some("toml") => Ok(Format::Toml),
            other => Err(ConfigError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SettingsError;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.arduino.baudrate, DEFAULT_BAUD_RATE);
        assert_eq!(config.version, CONFIG_VERSION);
    }

    #[test]
    fn test_zero_baud_rate_rejected() {
        let mut config = Config::default();
        config.arduino.baudrate = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValueOutOfRange { .. })
        ));
    }

    #[test]
    fn test_camel_case_keys() {
        let mut config = Config::default();
        config.arduino.last_serial_port = Some("COM4".to_string());
        config.enabled_plugin = Some("microbit".to_string());

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["arduino"]["lastSerialPort"], "COM4");
        assert_eq!(json["enabledPlugin"], "microbit");
        assert_eq!(json["network"]["probeAddress"], "255.255.255.255");
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"arduino":{"baudrate":9600,"board":"nano"}}"#).unwrap();
        assert_eq!(config.arduino.baudrate, 9600);
        assert_eq!(config.arduino.board, "nano");
        assert_eq!(config.network, NetworkSettings::default());
        assert!(config.arduino.last_serial_port.is_none());
    }

    #[test]
    fn test_toml_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.arduino.board = "mega2560".to_string();
        config.save_to_file(&path).unwrap();

        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");

        let err = Config::default().save_to_file(&path).unwrap_err();
        assert!(matches!(
            err,
            SettingsError::Config(ConfigError::UnsupportedFormat(_))
        ));
    }
}
