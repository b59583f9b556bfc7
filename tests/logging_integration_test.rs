//! Integration tests for logging functionality

use conduit::config::LoggingConfig;
use conduit::domain::{BatchId, RecordType};
use conduit::logging::init_logging;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_logging_config_default() {
    let config = LoggingConfig::default();
    assert!(!config.local_enabled);
    assert_eq!(config.local_path, "./logs");
    assert_eq!(config.local_rotation, "daily");
}

#[test]
fn test_invalid_level_is_rejected_before_install() {
    let result = init_logging("verbose", &LoggingConfig::default());
    assert!(result.is_err());
}

// A global subscriber can only be installed once per process, so the file
// layer and the double-init error are checked in one test.
#[test]
fn test_file_logging_creates_directory() {
    let temp_dir = TempDir::new().unwrap();
    let log_path = temp_dir.path().join("logs");

    let config = LoggingConfig {
        local_enabled: true,
        local_path: log_path.to_string_lossy().to_string(),
        local_rotation: "never".to_string(),
    };
    assert!(!log_path.exists());

    let guard = init_logging("debug", &config).unwrap();
    assert!(log_path.is_dir());

    let batch_id = BatchId::random();
    conduit::log_phase_start!(&batch_id, RecordType::Patient, 1);
    conduit::log_phase_complete!(&batch_id, RecordType::Patient, 1, 1, "transformed");
    conduit::log_batch_complete!(&batch_id, 1, 1, 0, Duration::from_millis(3));
    drop(guard);

    assert!(log_path.join("conduit.log").exists());

    let second = init_logging("info", &LoggingConfig::default());
    assert!(second.is_err());
}
