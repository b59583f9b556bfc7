//! Patient/person resolver
//!
//! Derives, once per batch, the destination patient and person ids and
//! whether the patient's data may exist downstream at all.

use super::identifier::IdentifierResolver;
use crate::adapters::PatientLinkStore;
use crate::config::PatientConfig;
use crate::core::index::ReferenceIndex;
use crate::core::schedule::PHASE_ORDER;
use crate::domain::{
    DestinationId, IdScope, LocalId, Lookup, Record, RecordType, Reference, TransformError,
};
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;

/// Rules deciding whether a patient is visible downstream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibilityPolicy {
    pub require_national_identifier: bool,
    pub national_identifier_system: String,
}

impl From<&PatientConfig> for VisibilityPolicy {
    fn from(config: &PatientConfig) -> Self {
        Self {
            require_national_identifier: config.require_national_identifier,
            national_identifier_system: config.national_identifier_system.clone(),
        }
    }
}

impl Default for VisibilityPolicy {
    fn default() -> Self {
        Self::from(&PatientConfig::default())
    }
}

/// Resolved patient identity for a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatientContext {
    pub source_patient: LocalId,
    pub patient_id: DestinationId,
    pub person_id: DestinationId,
    pub visible: bool,
}

/// Outcome of patient resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatientResolution {
    /// The batch carries no patient-scoped data to link
    NoPatient,
    /// The patient has no destination id yet; retried on a later delivery
    NotReady { source_patient: LocalId },
    Resolved(PatientContext),
}

impl PatientResolution {
    pub fn context(&self) -> Option<&PatientContext> {
        match self {
            PatientResolution::Resolved(context) => Some(context),
            _ => None,
        }
    }

    /// Short label for logs and summaries
    pub fn label(&self) -> &'static str {
        match self {
            PatientResolution::NoPatient => "no_patient",
            PatientResolution::NotReady { .. } => "not_ready",
            PatientResolution::Resolved(context) if context.visible => "resolved",
            PatientResolution::Resolved(_) => "resolved_hidden",
        }
    }
}

/// Where a patient-scoped type keeps its patient reference
enum PatientField {
    Field(&'static str),
    AppointmentParticipant,
    Untracked,
}

fn patient_field(record_type: RecordType) -> PatientField {
    use RecordType::*;
    match record_type {
        Observation | DiagnosticReport | DiagnosticOrder | ProcedureRequest | Specimen
        | Composition | Procedure | Flag => PatientField::Field("subject"),
        EpisodeOfCare | Encounter | Condition | ReferralRequest | MedicationStatement
        | MedicationOrder | Immunization | FamilyMemberHistory | AllergyIntolerance => {
            PatientField::Field("patient")
        }
        Appointment => PatientField::AppointmentParticipant,
        // Slots reach their patient through an appointment that may live in
        // another batch
        Slot => PatientField::Untracked,
        // Folded into other output and never transformed on its own
        QuestionnaireResponse => PatientField::Untracked,
        Organization | Location | Practitioner | Schedule | Patient => PatientField::Untracked,
    }
}

fn patient_from_reference_value(
    record: &Record,
    value: &Value,
) -> Result<Option<LocalId>, TransformError> {
    let Some(raw) = value.get("reference").and_then(Value::as_str) else {
        return Ok(None);
    };
    let reference =
        Reference::from_str(raw).map_err(|message| TransformError::PatientDerivation {
            reference: record.reference(),
            message,
        })?;
    if reference.record_type != RecordType::Patient {
        return Err(TransformError::PatientDerivation {
            reference: record.reference(),
            message: format!("'{raw}' does not reference a Patient"),
        });
    }
    Ok(Some(reference.local_id))
}

/// Extracts the patient a record belongs to from its payload
///
/// # Returns
///
/// `None` for types that legitimately carry no patient reference.
///
/// # Errors
///
/// Returns an error if the payload is not JSON, or if a type that must name
/// its patient does not.
pub fn derive_patient_reference(record: &Record) -> Result<Option<LocalId>, TransformError> {
    let field = patient_field(record.record_type);
    if matches!(field, PatientField::Untracked) {
        return Ok(None);
    }

    let payload = record
        .payload_json()
        .map_err(|e| TransformError::InvalidPayload {
            reference: record.reference(),
            message: e.to_string(),
        })?;

    let found = match field {
        PatientField::Field(name) => match payload.get(name) {
            Some(value) => patient_from_reference_value(record, value)?,
            None => None,
        },
        PatientField::AppointmentParticipant => {
            let mut found = None;
            for participant in payload
                .get("participant")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
            {
                let Some(actor) = participant.get("actor") else {
                    continue;
                };
                // Participants are a mix of practitioners, locations and the patient
                let is_patient = actor
                    .get("reference")
                    .and_then(Value::as_str)
                    .is_some_and(|r| r.starts_with("Patient/"));
                if is_patient {
                    found = patient_from_reference_value(record, actor)?;
                    break;
                }
            }
            found
        }
        PatientField::Untracked => None,
    };

    match found {
        Some(patient) => Ok(Some(patient)),
        None => Err(TransformError::PatientDerivation {
            reference: record.reference(),
            message: "payload carries no patient reference".to_string(),
        }),
    }
}

/// Whether a patient's data may exist downstream
///
/// Hidden when the record is deleted, flagged confidential, or lacks a
/// required national identifier.
///
/// # Errors
///
/// Returns an error if a current record's payload is not JSON.
pub fn is_patient_visible(record: &Record, policy: &VisibilityPolicy) -> Result<bool, TransformError> {
    if record.deleted {
        return Ok(false);
    }

    let payload = record
        .payload_json()
        .map_err(|e| TransformError::InvalidPayload {
            reference: record.reference(),
            message: e.to_string(),
        })?;

    if payload.get("confidential").and_then(Value::as_bool) == Some(true) {
        return Ok(false);
    }

    if policy.require_national_identifier {
        let has_identifier = payload
            .get("identifier")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .any(|identifier| {
                identifier.get("system").and_then(Value::as_str)
                    == Some(policy.national_identifier_system.as_str())
                    && identifier
                        .get("value")
                        .and_then(Value::as_str)
                        .is_some_and(|v| !v.trim().is_empty())
            });
        if !has_identifier {
            return Ok(false);
        }
    }

    Ok(true)
}

/// Resolves the patient context of a batch
pub struct PatientResolver {
    ids: Arc<IdentifierResolver>,
    links: Arc<dyn PatientLinkStore>,
    policy: VisibilityPolicy,
}

impl PatientResolver {
    pub fn new(
        ids: Arc<IdentifierResolver>,
        links: Arc<dyn PatientLinkStore>,
        policy: VisibilityPolicy,
    ) -> Self {
        Self {
            ids,
            links,
            policy,
        }
    }

    pub fn policy(&self) -> &VisibilityPolicy {
        &self.policy
    }

    /// Resolves the batch's patient
    ///
    /// # Errors
    ///
    /// Returns an error if a patient-scoped record cannot name its patient
    /// or a store fails.
    pub async fn resolve(
        &self,
        index: &ReferenceIndex,
        patient_scope: Option<&LocalId>,
    ) -> Result<PatientResolution, TransformError> {
        let Some(source_patient) = self.find_source_patient(index, patient_scope)? else {
            tracing::debug!(batch_id = %index.batch_id(), "No patient to resolve for batch");
            return Ok(PatientResolution::NoPatient);
        };

        let Some(patient_id) = self
            .ids
            .find_destination_id(RecordType::Patient, &source_patient)
            .await?
        else {
            tracing::warn!(
                batch_id = %index.batch_id(),
                patient = %source_patient,
                "Patient not yet known downstream, patient-scoped work deferred"
            );
            return Ok(PatientResolution::NotReady { source_patient });
        };

        let person_local_id = self
            .links
            .get_person_id(&source_patient)
            .await?
            .unwrap_or_else(|| source_patient.clone());
        let person_id = self
            .ids
            .find_or_create_destination_id(IdScope::Person, &person_local_id)
            .await?;

        let patient_reference = Reference::new(RecordType::Patient, source_patient.clone());
        let visible = match index.resolve_or_fetch(&patient_reference).await? {
            Lookup::Found(record) => is_patient_visible(&record, &self.policy)?,
            Lookup::NotFound | Lookup::Deleted => false,
        };

        tracing::info!(
            batch_id = %index.batch_id(),
            patient = %source_patient,
            patient_id = %patient_id,
            person_id = %person_id,
            visible,
            "Resolved patient context"
        );

        Ok(PatientResolution::Resolved(PatientContext {
            source_patient,
            patient_id,
            person_id,
            visible,
        }))
    }

    fn find_source_patient(
        &self,
        index: &ReferenceIndex,
        patient_scope: Option<&LocalId>,
    ) -> Result<Option<LocalId>, TransformError> {
        if let Some(patient) = index.records_of_type(RecordType::Patient).first() {
            return Ok(Some(patient.local_id.clone()));
        }
        if let Some(patient) = patient_scope {
            return Ok(Some(patient.clone()));
        }

        for record_type in PHASE_ORDER
            .iter()
            .copied()
            .filter(|t| t.is_patient_scoped() && *t != RecordType::Patient)
        {
            for record in index.records_of_type(record_type) {
                if record.deleted {
                    continue;
                }
                if let Some(patient) = derive_patient_reference(&record)? {
                    return Ok(Some(patient));
                }
            }
        }

        Ok(None)
    }
}

impl std::fmt::Debug for PatientResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatientResolver")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
