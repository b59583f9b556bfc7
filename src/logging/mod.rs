//! Logging and observability
//!
//! This module provides structured logging with support for:
//! - Console output with an `EnvFilter`
//! - JSON-formatted local log files with rotation
//! - Helper macros for phase and batch lifecycle events
//!
//! # Example
//!
//! ```no_run
//! use conduit::logging::init_logging;
//! use conduit::config::LoggingConfig;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//!
//! tracing::info!("Application started");
//! ```

pub mod structured;

// Re-export commonly used items
pub use structured::{init_logging, LoggingGuard};

/// Log the start of a phase
///
/// # Example
///
/// ```no_run
/// use conduit::log_phase_start;
/// use conduit::domain::{BatchId, RecordType};
///
/// let batch_id = BatchId::random();
/// log_phase_start!(&batch_id, RecordType::Observation, 120);
/// ```
#[macro_export]
macro_rules! log_phase_start {
    ($batch_id:expr, $record_type:expr, $records:expr) => {
        tracing::debug!(
            batch_id = %$batch_id,
            record_type = %$record_type,
            records = $records,
            "Starting phase"
        );
    };
}

/// Log the completion of a phase
///
/// # Example
///
/// ```no_run
/// use conduit::log_phase_complete;
/// use conduit::domain::{BatchId, RecordType};
///
/// let batch_id = BatchId::random();
/// log_phase_complete!(&batch_id, RecordType::Observation, 120, 3, "transformed");
/// ```
#[macro_export]
macro_rules! log_phase_complete {
    ($batch_id:expr, $record_type:expr, $records:expr, $tasks:expr, $outcome:expr) => {
        tracing::info!(
            batch_id = %$batch_id,
            record_type = %$record_type,
            records = $records,
            tasks = $tasks,
            outcome = $outcome,
            "Phase completed"
        );
    };
}

/// Log the completion of a batch
///
/// # Example
///
/// ```no_run
/// use conduit::log_batch_complete;
/// use conduit::domain::BatchId;
/// use std::time::Duration;
///
/// let batch_id = BatchId::random();
/// log_batch_complete!(&batch_id, 42, 40, 2, Duration::from_millis(350));
/// ```
#[macro_export]
macro_rules! log_batch_complete {
    ($batch_id:expr, $records:expr, $transformed:expr, $skipped:expr, $duration:expr) => {
        tracing::info!(
            batch_id = %$batch_id,
            records = $records,
            transformed = $transformed,
            skipped = $skipped,
            duration_ms = $duration.as_millis(),
            "Batch completed"
        );
    };
}
