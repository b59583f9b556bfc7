//! Fixed phase order
//!
//! Every record type is transformed in its own phase. A type may only depend
//! on destination ids of types in earlier phases, and patient-scoped types
//! run after the patient barrier.

use crate::domain::RecordType;

/// Type whose phase is followed by patient resolution
pub const PATIENT_BARRIER: RecordType = RecordType::Patient;

/// Total order in which record types are transformed
///
/// Composition is scheduled like any other type but has no registry entry in
/// the standard registry, so batches carrying it fail.
pub const PHASE_ORDER: [RecordType; 25] = [
    RecordType::Organization,
    RecordType::Location,
    RecordType::Practitioner,
    RecordType::Schedule,
    RecordType::Patient,
    RecordType::EpisodeOfCare,
    RecordType::Appointment,
    RecordType::Encounter,
    RecordType::Condition,
    RecordType::Procedure,
    RecordType::ReferralRequest,
    RecordType::ProcedureRequest,
    RecordType::Observation,
    RecordType::MedicationStatement,
    RecordType::MedicationOrder,
    RecordType::Immunization,
    RecordType::FamilyMemberHistory,
    RecordType::AllergyIntolerance,
    RecordType::DiagnosticOrder,
    RecordType::DiagnosticReport,
    RecordType::Specimen,
    RecordType::Flag,
    RecordType::Composition,
    RecordType::Slot,
    RecordType::QuestionnaireResponse,
];

/// Position of a type in [`PHASE_ORDER`]
pub fn phase_position(record_type: RecordType) -> Option<usize> {
    PHASE_ORDER.iter().position(|t| *t == record_type)
}

/// Whether a type's phase runs after patient resolution
pub fn is_after_barrier(record_type: RecordType) -> bool {
    match (phase_position(record_type), phase_position(PATIENT_BARRIER)) {
        (Some(position), Some(barrier)) => position > barrier,
        _ => false,
    }
}
