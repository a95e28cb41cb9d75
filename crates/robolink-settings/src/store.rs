//! Configuration store
//!
//! Loads and saves the [`Config`] record at a fixed location. A missing
//! file is not an error: the store hands back defaults and the first save
//! creates the file.

use crate::config::Config;
use crate::error::{SettingsError, SettingsResult};
use std::path::{Path, PathBuf};

const APP_DIR: &str = "robolink";
const CONFIG_FILE: &str = "config.json";

/// File-backed configuration store
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// Store backed by the given file (`.json` or `.toml`)
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the platform config directory, e.g. `~/.config/robolink/config.json`
    pub fn default_location() -> SettingsResult<Self> {
        let dir = dirs::config_dir().ok_or_else(|| {
            SettingsError::ConfigDirectory("no platform config directory".to_string())
        })?;
        Ok(Self::new(dir.join(APP_DIR).join(CONFIG_FILE)))
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the configuration, or defaults when the file does not exist yet
    pub fn load(&self) -> SettingsResult<Config> {
        if !self.path.exists() {
            tracing::debug!("No config at {}, using defaults", self.path.display());
            return Ok(Config::default());
        }

        Config::load_from_file(&self.path).map_err(|e| {
            tracing::warn!("Failed to load config {}: {}", self.path.display(), e);
            SettingsError::LoadError(format!("{}: {}", self.path.display(), e))
        })
    }

    /// Persist the configuration, creating the parent directory if needed
    pub fn save(&self, config: &Config) -> SettingsResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    SettingsError::ConfigDirectory(format!("{}: {}", parent.display(), e))
                })?;
            }
        }

        config.save_to_file(&self.path).map_err(|e| {
            SettingsError::SaveError(format!("{}: {}", self.path.display(), e))
        })?;
        tracing::debug!("Saved config to {}", self.path.display());
        Ok(())
    }
}
