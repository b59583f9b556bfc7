//! Domain models and types for Conduit.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Strongly-typed identifiers** ([`ServiceId`], [`BatchId`], [`LocalId`], [`DestinationId`])
//! - **Record model** ([`RecordType`], [`Reference`], [`Record`], [`Batch`])
//! - **Tri-state lookups** ([`Lookup`]) separating "unknown" from "deleted"
//! - **Error types** ([`ConduitError`], [`TransformError`], [`BatchTransformError`])
//! - **Result type alias** ([`Result`])
//!
//! # Example
//!
//! ```rust
//! use conduit::domain::{LocalId, Record, RecordType};
//! use conduit::domain::ids::ServiceId;
//!
//! let record = Record::new(
//!     RecordType::Observation,
//!     LocalId::new("O1").unwrap(),
//!     r#"{"subject": {"reference": "Patient/P1"}}"#,
//!     ServiceId::random(),
//! );
//! assert_eq!(record.reference().to_string(), "Observation/O1");
//! ```

pub mod errors;
pub mod ids;
pub mod lookup;
pub mod record;
pub mod record_type;
pub mod result;

// Re-export commonly used types for convenience
pub use errors::{BatchStage, BatchTransformError, ConduitError, StoreError, TransformError};
pub use ids::{BatchId, DestinationId, ExchangeId, LocalId, ServiceId, SystemId};
pub use lookup::Lookup;
pub use record::{Batch, BatchBuilder, Record, Reference};
pub use record_type::{IdScope, RecordType};
pub use result::Result;
