//! Tests for the file-backed configuration store

use robolink_settings::{Config, ConfigStore, SettingsError, DEFAULT_BAUD_RATE};

#[test]
fn test_missing_file_loads_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let store = ConfigStore::new(dir.path().join("config.json"));

    let config = store.load().unwrap();
    assert_eq!(config, Config::default());
    assert!(!store.path().exists());
}

#[test]
fn test_save_creates_parent_directory() {
    let dir = tempfile::tempdir().unwrap();
    let store = ConfigStore::new(dir.path().join("nested").join("robolink").join("config.json"));

    let mut config = Config::default();
    config.arduino.last_serial_port = Some("/dev/ttyUSB0".to_string());
    store.save(&config).unwrap();

    let reloaded = store.load().unwrap();
    assert_eq!(
        reloaded.arduino.last_serial_port.as_deref(),
        Some("/dev/ttyUSB0")
    );
}

#[test]
fn test_reads_legacy_json_layout() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        r#"{
            "arduino": {"path": "/opt/arduino", "baudrate": 57600, "board": "nano", "lastSerialPort": "COM3"},
            "enabledPlugin": "kittenbot",
            "version": "1.10"
        }"#,
    )
    .unwrap();

    let config = ConfigStore::new(&path).load().unwrap();
    assert_eq!(config.arduino.baudrate, 57600);
    assert_eq!(config.arduino.board, "nano");
    assert_eq!(config.arduino.last_serial_port.as_deref(), Some("COM3"));
    assert_eq!(config.enabled_plugin.as_deref(), Some("kittenbot"));
    assert_eq!(config.version, "1.10");
}

#[test]
fn test_corrupt_file_is_a_load_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, "{ not json").unwrap();

    let err = ConfigStore::new(&path).load().unwrap_err();
    assert!(matches!(err, SettingsError::LoadError(_)));
}

#[test]
fn test_invalid_config_is_not_saved() {
    let dir = tempfile::tempdir().unwrap();
    let store = ConfigStore::new(dir.path().join("config.json"));

    let mut config = Config::default();
    config.arduino.baudrate = 0;
    assert!(matches!(store.save(&config), Err(SettingsError::SaveError(_))));
    assert!(!store.path().exists());

    config.arduino.baudrate = DEFAULT_BAUD_RATE;
    store.save(&config).unwrap();
    assert!(store.path().exists());
}
