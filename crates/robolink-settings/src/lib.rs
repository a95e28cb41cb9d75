//! RoboLink Settings Crate
//!
//! Handles the application configuration record and its persistence.

pub mod config;
pub mod error;
pub mod store;

pub use config::{
    ArduinoSettings, Config, NetworkSettings, CONFIG_VERSION, DEFAULT_BAUD_RATE, DEFAULT_BOARD,
};
pub use error::{ConfigError, SettingsError, SettingsResult};
pub use store::ConfigStore;
