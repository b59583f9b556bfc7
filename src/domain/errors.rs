//! Domain error types
//!
//! This module defines the error hierarchy for Conduit. Store implementations
//! and transformers never leak third-party error types; they convert into
//! [`StoreError`] and [`TransformError`] at the boundary.

use super::ids::BatchId;
use super::record::Reference;
use super::record_type::RecordType;
use std::fmt;
use thiserror::Error;

/// Main Conduit error type
///
/// This is the primary error type used throughout the application.
#[derive(Debug, Error)]
pub enum ConduitError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// External store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A batch failed to transform
    #[error(transparent)]
    Batch(#[from] BatchTransformError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

/// Errors raised by the durable stores behind the resolvers
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Failed to reach the store
    #[error("Failed to connect to store: {0}")]
    ConnectionFailed(String),

    /// A read failed
    #[error("Store read failed: {0}")]
    ReadFailed(String),

    /// A write failed
    #[error("Store write failed: {0}")]
    WriteFailed(String),

    /// A write conflicted with existing state
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Stored data could not be interpreted
    #[error("Invalid stored data: {0}")]
    InvalidData(String),
}

/// Errors raised while transforming a batch
#[derive(Debug, Error)]
pub enum TransformError {
    /// The batch carries a type the registry knows nothing about
    #[error("No transformer registered for record type {0}")]
    UnknownRecordType(RecordType),

    /// A per-record transform failed inside a worker task
    #[error("Transform of {reference} failed: {source}")]
    WorkerTask {
        reference: Reference,
        #[source]
        source: Box<TransformError>,
    },

    /// A worker task panicked or was cancelled
    #[error("Worker task aborted: {0}")]
    WorkerPanicked(String),

    /// Records were neither transformed nor skipped after the final drain
    #[error(
        "{pending} record(s) were neither transformed nor skipped: {}",
        format_sample(.sample)
    )]
    CompletenessViolation {
        pending: usize,
        sample: Vec<Reference>,
    },

    /// A patient-scoped record did not yield a patient reference
    #[error("Cannot derive patient from {reference}: {message}")]
    PatientDerivation { reference: Reference, message: String },

    /// A record payload could not be read
    #[error("Invalid payload for {reference}: {message}")]
    InvalidPayload { reference: Reference, message: String },

    /// A per-type mapping rule rejected the record
    #[error("Mapping error: {0}")]
    Mapping(String),

    /// An external store failed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The output writer rejected the finalized batch
    #[error("Failed to write output: {0}")]
    Output(String),
}

impl TransformError {
    /// Attaches batch and stage context
    pub fn in_stage(self, batch_id: BatchId, stage: BatchStage) -> BatchTransformError {
        BatchTransformError {
            batch_id,
            stage,
            source: self,
        }
    }
}

fn format_sample(sample: &[Reference]) -> String {
    sample
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Where in the batch lifecycle a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStage {
    Indexing,
    Organization,
    Phase(RecordType),
    PatientResolution,
    Completeness,
    Output,
}

impl fmt::Display for BatchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchStage::Indexing => f.write_str("indexing"),
            BatchStage::Organization => f.write_str("organization resolution"),
            BatchStage::Phase(record_type) => write!(f, "{record_type} phase"),
            BatchStage::PatientResolution => f.write_str("patient resolution"),
            BatchStage::Completeness => f.write_str("completeness check"),
            BatchStage::Output => f.write_str("output"),
        }
    }
}

/// A batch-level failure with its context
///
/// The caller owns redelivery: the whole batch is reprocessed later.
#[derive(Debug, Error)]
#[error("Batch {batch_id} failed during {stage}: {source}")]
pub struct BatchTransformError {
    pub batch_id: BatchId,
    pub stage: BatchStage,
    #[source]
    pub source: TransformError,
}

// Conversion from std::io::Error
impl From<std::io::Error> for ConduitError {
    fn from(err: std::io::Error) -> Self {
        ConduitError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for ConduitError {
    fn from(err: serde_json::Error) -> Self {
        ConduitError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for ConduitError {
    fn from(err: toml::de::Error) -> Self {
        ConduitError::Configuration(format!("TOML parse error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::LocalId;

    fn reference(record_type: RecordType, id: &str) -> Reference {
        Reference::new(record_type, LocalId::new(id).unwrap())
    }

    #[test]
    fn test_conduit_error_display() {
        let err = ConduitError::Configuration("Invalid config".to_string());
        assert_eq!(err.to_string(), "Configuration error: Invalid config");
    }

    #[test]
    fn test_store_error_conversion() {
        let store_err = StoreError::ReadFailed("timeout".to_string());
        let err: ConduitError = store_err.into();
        assert!(matches!(err, ConduitError::Store(_)));
    }

    #[test]
    fn test_unknown_record_type_display() {
        let err = TransformError::UnknownRecordType(RecordType::Composition);
        assert_eq!(
            err.to_string(),
            "No transformer registered for record type Composition"
        );
    }

    #[test]
    fn test_completeness_violation_lists_sample() {
        let err = TransformError::CompletenessViolation {
            pending: 12,
            sample: vec![
                reference(RecordType::Patient, "P1"),
                reference(RecordType::Observation, "O1"),
            ],
        };
        let message = err.to_string();
        assert!(message.starts_with("12 record(s)"));
        assert!(message.contains("Patient/P1, Observation/O1"));
    }

    #[test]
    fn test_worker_task_keeps_source() {
        let err = TransformError::WorkerTask {
            reference: reference(RecordType::Condition, "C1"),
            source: Box::new(TransformError::Mapping("no code".to_string())),
        };
        assert!(err.to_string().contains("Condition/C1"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_batch_error_context() {
        let batch_id = BatchId::random();
        let err = TransformError::UnknownRecordType(RecordType::Composition)
            .in_stage(batch_id, BatchStage::Phase(RecordType::Composition));
        let message = err.to_string();
        assert!(message.contains(&batch_id.to_string()));
        assert!(message.contains("Composition phase"));

        let conduit: ConduitError = err.into();
        assert!(matches!(conduit, ConduitError::Batch(_)));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let err: ConduitError = io_err.into();
        assert!(matches!(err, ConduitError::Io(_)));
    }

    #[test]
    fn test_toml_error_conversion() {
        let toml_err = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
        let err: ConduitError = toml_err.into();
        assert!(err.to_string().contains("TOML parse error"));
    }
}
