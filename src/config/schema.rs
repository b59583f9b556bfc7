//! Configuration schema types
//!
//! This module defines the configuration structure for Conduit. Every section
//! has defaults, so an empty file is a valid configuration.

use crate::domain::RecordType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Main Conduit configuration
///
/// This is the root configuration structure that maps to the TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConduitConfig {
    /// Application-level settings
    #[serde(default)]
    pub application: ApplicationConfig,

    /// Batch transformation settings
    #[serde(default)]
    pub transform: TransformConfig,

    /// Patient visibility settings
    #[serde(default)]
    pub patient: PatientConfig,

    /// Output settings for the local sink
    #[serde(default)]
    pub output: OutputConfig,

    /// Local state file settings
    #[serde(default)]
    pub state: StateConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ConduitConfig {
    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid
    pub fn validate(&self) -> Result<(), String> {
        self.application.validate()?;
        self.transform.validate()?;
        self.patient.validate()?;
        self.output.validate()?;
        self.state.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Dry run mode (transform batches but don't write output)
    #[serde(default)]
    pub dry_run: bool,
}

impl ApplicationConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            ));
        }
        Ok(())
    }
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            dry_run: false,
        }
    }
}

/// What happens to patient-scoped work when the batch's patient is not yet
/// known downstream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatientNotReadyPolicy {
    /// Mark patient-scoped records after the barrier as skipped
    #[default]
    SkipPatientScoped,
    /// Run later phases with no patient context
    RunWithoutPatient,
}

impl fmt::Display for PatientNotReadyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatientNotReadyPolicy::SkipPatientScoped => f.write_str("skip_patient_scoped"),
            PatientNotReadyPolicy::RunWithoutPatient => f.write_str("run_without_patient"),
        }
    }
}

/// Batch transformation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformConfig {
    /// Records per worker task
    #[serde(default = "default_sub_batch_size")]
    pub sub_batch_size: usize,

    /// Upper bound on concurrent worker tasks
    ///
    /// The pool for a batch is `max(1, min(max_workers, records / 10))`.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Record types whose records are skipped instead of transformed
    #[serde(default)]
    pub disabled_types: Vec<RecordType>,

    /// Policy when the batch's patient is not yet known downstream
    #[serde(default)]
    pub patient_not_ready: PatientNotReadyPolicy,
}

impl TransformConfig {
    fn validate(&self) -> Result<(), String> {
        if self.sub_batch_size == 0 || self.sub_batch_size > 10000 {
            return Err(format!(
                "transform.sub_batch_size must be between 1 and 10000, got {}",
                self.sub_batch_size
            ));
        }

        if self.max_workers == 0 || self.max_workers > 64 {
            return Err(format!(
                "transform.max_workers must be between 1 and 64, got {}",
                self.max_workers
            ));
        }

        if self.disabled_types.contains(&RecordType::Patient) {
            return Err(
                "transform.disabled_types cannot include Patient; it anchors the patient barrier"
                    .to_string(),
            );
        }

        Ok(())
    }

    /// Whether records of a type are skipped by configuration
    pub fn is_disabled(&self, record_type: RecordType) -> bool {
        self.disabled_types.contains(&record_type)
    }
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            sub_batch_size: default_sub_batch_size(),
            max_workers: default_max_workers(),
            disabled_types: Vec::new(),
            patient_not_ready: PatientNotReadyPolicy::default(),
        }
    }
}

/// Patient visibility configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientConfig {
    /// Hide patients whose record lacks a national identifier
    #[serde(default)]
    pub require_national_identifier: bool,

    /// Identifier system URI that counts as a national identifier
    #[serde(default = "default_national_identifier_system")]
    pub national_identifier_system: String,
}

impl PatientConfig {
    fn validate(&self) -> Result<(), String> {
        if self.require_national_identifier && self.national_identifier_system.trim().is_empty() {
            return Err(
                "patient.national_identifier_system is required when require_national_identifier = true"
                    .to_string(),
            );
        }
        Ok(())
    }
}

impl Default for PatientConfig {
    fn default() -> Self {
        Self {
            require_national_identifier: false,
            national_identifier_system: default_national_identifier_system(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Root directory for per-batch output tables
    #[serde(default = "default_output_directory")]
    pub directory: String,
}

impl OutputConfig {
    fn validate(&self) -> Result<(), String> {
        if self.directory.trim().is_empty() {
            return Err("output.directory cannot be empty".to_string());
        }
        Ok(())
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_directory(),
        }
    }
}

/// Local state configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    /// Path of the JSON state file
    #[serde(default = "default_state_path")]
    pub path: String,
}

impl StateConfig {
    fn validate(&self) -> Result<(), String> {
        if self.path.trim().is_empty() {
            return Err("state.path cannot be empty".to_string());
        }
        Ok(())
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: default_state_path(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Enable local file logging
    #[serde(default)]
    pub local_enabled: bool,

    /// Local log directory
    #[serde(default = "default_local_path")]
    pub local_path: String,

    /// Log rotation strategy
    #[serde(default = "default_local_rotation")]
    pub local_rotation: String,
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&self.local_rotation.as_str()) {
            return Err(format!(
                "Invalid logging.local_rotation '{}'. Must be one of: {}",
                self.local_rotation,
                valid_rotations.join(", ")
            ));
        }

        if self.local_enabled && self.local_path.trim().is_empty() {
            return Err("logging.local_path cannot be empty when local_enabled = true".to_string());
        }

        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            local_enabled: false,
            local_path: default_local_path(),
            local_rotation: default_local_rotation(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_sub_batch_size() -> usize {
    50
}

fn default_max_workers() -> usize {
    10
}

fn default_national_identifier_system() -> String {
    "https://fhir.nhs.uk/Id/nhs-number".to_string()
}

fn default_output_directory() -> String {
    "./output".to_string()
}

fn default_state_path() -> String {
    "./state/conduit-state.json".to_string()
}

fn default_local_path() -> String {
    "./logs".to_string()
}

fn default_local_rotation() -> String {
    "daily".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_application_config_validation() {
        let mut config = ApplicationConfig {
            log_level: "info".to_string(),
            dry_run: false,
        };

        assert!(config.validate().is_ok());

        config.log_level = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_transform_config_bounds() {
        let mut config = TransformConfig::default();
        assert!(config.validate().is_ok());

        config.sub_batch_size = 0;
        assert!(config.validate().is_err());

        config.sub_batch_size = 10;
        config.max_workers = 65;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_patient_cannot_be_disabled() {
        let config = TransformConfig {
            disabled_types: vec![RecordType::Patient],
            ..TransformConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.contains("Patient"));
    }

    #[test]
    fn test_disabled_types_parse_from_toml() {
        let config: ConduitConfig = toml::from_str(
            r#"
            [transform]
            disabled_types = ["Flag", "Specimen"]
            patient_not_ready = "run_without_patient"
            "#,
        )
        .unwrap();

        assert!(config.transform.is_disabled(RecordType::Flag));
        assert!(!config.transform.is_disabled(RecordType::Condition));
        assert_eq!(
            config.transform.patient_not_ready,
            PatientNotReadyPolicy::RunWithoutPatient
        );
    }

    #[test]
    fn test_unknown_disabled_type_rejected() {
        let result: Result<ConduitConfig, _> = toml::from_str(
            r#"
            [transform]
            disabled_types = ["Medication"]
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_patient_config_validation() {
        let mut config = PatientConfig::default();
        assert!(config.validate().is_ok());

        config.require_national_identifier = true;
        config.national_identifier_system = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_logging_config_default() {
        let config = LoggingConfig::default();
        assert!(!config.local_enabled);
        assert_eq!(config.local_path, "./logs");
        assert_eq!(config.local_rotation, "daily");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_logging_rotation_validation() {
        let config = LoggingConfig {
            local_rotation: "size".to_string(),
            ..LoggingConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_file_is_valid() {
        let config: ConduitConfig = toml::from_str("").unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.transform.sub_batch_size, 50);
        assert_eq!(config.state.path, "./state/conduit-state.json");
    }

    #[test]
    fn test_default_values() {
        assert_eq!(default_log_level(), "info");
        assert_eq!(default_sub_batch_size(), 50);
        assert_eq!(default_max_workers(), 10);
        assert_eq!(default_output_directory(), "./output");
        assert_eq!(
            PatientNotReadyPolicy::default().to_string(),
            "skip_patient_scoped"
        );
    }
}
