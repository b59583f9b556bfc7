//! Configuration management for Conduit.
//!
//! This module provides TOML-based configuration loading, parsing, and validation.
//!
//! # Overview
//!
//! Conduit uses TOML configuration files with support for:
//! - Environment variable substitution (`${VAR_NAME}`)
//! - `CONDUIT_<SECTION>_<KEY>` environment overrides
//! - Default values for every setting
//! - Validation with descriptive messages
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use conduit::config::load_config;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("conduit.toml")?;
//!
//! println!("Sub-batch size: {}", config.transform.sub_batch_size);
//! println!("Output: {}", config.output.directory);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration Structure
//!
//! - [`ApplicationConfig`] - Log level and dry-run
//! - [`TransformConfig`] - Sub-batch size, worker cap, disabled types, patient-not-ready policy
//! - [`PatientConfig`] - Patient visibility rules
//! - [`OutputConfig`] - Output directory for the local sink
//! - [`StateConfig`] - Local state file
//! - [`LoggingConfig`] - Logging configuration
//!
//! # Example Configuration
//!
//! ```toml
//! [application]
//! log_level = "info"
//!
//! [transform]
//! sub_batch_size = 50
//! max_workers = 10
//! disabled_types = ["QuestionnaireResponse"]
//! patient_not_ready = "skip_patient_scoped"
//!
//! [patient]
//! require_national_identifier = true
//!
//! [output]
//! directory = "${CONDUIT_OUTPUT_ROOT}/batches"
//! ```

pub mod loader;
pub mod schema;

// Re-export commonly used types
pub use loader::{load_config, parse_config};
pub use schema::{
    ApplicationConfig, ConduitConfig, LoggingConfig, OutputConfig, PatientConfig,
    PatientNotReadyPolicy, StateConfig, TransformConfig,
};
