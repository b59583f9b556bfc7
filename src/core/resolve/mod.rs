//! Identifier and patient resolution
//!
//! - [`identifier`] - destination ids, instance-mapping merges and the
//!   per-service organization cache
//! - [`patient`] - the per-batch patient/person context

pub mod identifier;
pub mod patient;

pub use identifier::IdentifierResolver;
pub use patient::{
    derive_patient_reference, is_patient_visible, PatientContext, PatientResolution,
    PatientResolver, VisibilityPolicy,
};
