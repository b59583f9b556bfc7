//! Record type enumeration
//!
//! The closed set of canonical record categories a batch can carry.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed category of a canonical record
///
/// Names match the canonical (FHIR-style) resource names exactly, both for
/// parsing and serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RecordType {
    Organization,
    Location,
    Practitioner,
    Schedule,
    Patient,
    EpisodeOfCare,
    Appointment,
    Encounter,
    Condition,
    Procedure,
    ReferralRequest,
    ProcedureRequest,
    Observation,
    MedicationStatement,
    MedicationOrder,
    Immunization,
    FamilyMemberHistory,
    AllergyIntolerance,
    DiagnosticOrder,
    DiagnosticReport,
    Specimen,
    Flag,
    Composition,
    Slot,
    QuestionnaireResponse,
}

impl RecordType {
    /// Every record type, in declaration order
    pub const ALL: [RecordType; 25] = [
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

    /// Canonical name of the type
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Organization => "Organization",
            RecordType::Location => "Location",
            RecordType::Practitioner => "Practitioner",
            RecordType::Schedule => "Schedule",
            RecordType::Patient => "Patient",
            RecordType::EpisodeOfCare => "EpisodeOfCare",
            RecordType::Appointment => "Appointment",
            RecordType::Encounter => "Encounter",
            RecordType::Condition => "Condition",
            RecordType::Procedure => "Procedure",
            RecordType::ReferralRequest => "ReferralRequest",
            RecordType::ProcedureRequest => "ProcedureRequest",
            RecordType::Observation => "Observation",
            RecordType::MedicationStatement => "MedicationStatement",
            RecordType::MedicationOrder => "MedicationOrder",
            RecordType::Immunization => "Immunization",
            RecordType::FamilyMemberHistory => "FamilyMemberHistory",
            RecordType::AllergyIntolerance => "AllergyIntolerance",
            RecordType::DiagnosticOrder => "DiagnosticOrder",
            RecordType::DiagnosticReport => "DiagnosticReport",
            RecordType::Specimen => "Specimen",
            RecordType::Flag => "Flag",
            RecordType::Composition => "Composition",
            RecordType::Slot => "Slot",
            RecordType::QuestionnaireResponse => "QuestionnaireResponse",
        }
    }

    /// Whether records of this type belong to a single patient
    ///
    /// Organization, Location, Practitioner and Schedule are shared
    /// reference data; everything else hangs off a patient. Slot counts as
    /// patient-scoped because it is linked through its appointment.
    pub fn is_patient_scoped(&self) -> bool {
        !matches!(
            self,
            RecordType::Organization
                | RecordType::Location
                | RecordType::Practitioner
                | RecordType::Schedule
        )
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        RecordType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == trimmed)
            .ok_or_else(|| format!("Unknown record type: {s}"))
    }
}

/// Key space of the identifier-mapping store
///
/// Destination ids are allocated per record type, plus one extra space for
/// persons, which are derived from patient links rather than delivered as
/// records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IdScope {
    Record(RecordType),
    Person,
}

impl fmt::Display for IdScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdScope::Record(record_type) => write!(f, "{record_type}"),
            IdScope::Person => f.write_str("Person"),
        }
    }
}

impl From<RecordType> for IdScope {
    fn from(record_type: RecordType) -> Self {
        IdScope::Record(record_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_all_names() {
        for record_type in RecordType::ALL {
            let parsed = RecordType::from_str(record_type.as_str()).unwrap();
            assert_eq!(parsed, record_type);
        }
    }

    #[test]
    fn test_unknown_name() {
        assert!(RecordType::from_str("Medication").is_err());
        assert!(RecordType::from_str("patient").is_err());
    }

    #[test]
    fn test_patient_scoped() {
        assert!(!RecordType::Organization.is_patient_scoped());
        assert!(!RecordType::Schedule.is_patient_scoped());
        assert!(RecordType::Patient.is_patient_scoped());
        assert!(RecordType::Observation.is_patient_scoped());
        assert!(RecordType::Slot.is_patient_scoped());
    }

    #[test]
    fn test_serde_uses_canonical_names() {
        let json = serde_json::to_string(&RecordType::MedicationStatement).unwrap();
        assert_eq!(json, "\"MedicationStatement\"");
        let parsed: RecordType = serde_json::from_str("\"EpisodeOfCare\"").unwrap();
        assert_eq!(parsed, RecordType::EpisodeOfCare);
    }

    #[test]
    fn test_id_scope_display() {
        assert_eq!(IdScope::from(RecordType::Patient).to_string(), "Patient");
        assert_eq!(IdScope::Person.to_string(), "Person");
    }
}
