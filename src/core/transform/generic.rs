//! Generic per-type transformer
//!
//! Emits one row per record into the type's table:
//!
//! - deleted records, and patient-scoped records of a hidden patient, become
//!   deletes
//! - every upsert carries `local_id`, `organization_id` and, for
//!   patient-scoped types, `patient_id` and `person_id`
//! - top-level scalar payload fields are copied as-is
//! - top-level `{"reference": "Type/id"}` fields become `<field>_id` when the
//!   referenced type is transformed in an earlier phase

use super::context::TransformContext;
use super::output::TableWriter;
use super::registry::TypeTransformer;
use crate::core::resolve::is_patient_visible;
use crate::core::schedule::phase_position;
use crate::domain::{Record, RecordType, Reference, TransformError};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::str::FromStr;

const IGNORED_FIELDS: [&str; 2] = ["resourceType", "id"];

/// Transformer shared by every type of the standard registry
#[derive(Debug, Clone, Default)]
pub struct GenericTransformer;

impl GenericTransformer {
    pub fn new() -> Self {
        Self
    }
}

fn invalid_payload(record: &Record, message: impl Into<String>) -> TransformError {
    TransformError::InvalidPayload {
        reference: record.reference(),
        message: message.into(),
    }
}

/// Whether `target` is transformed strictly before `source`
fn precedes(target: RecordType, source: RecordType) -> bool {
    match (phase_position(target), phase_position(source)) {
        (Some(target), Some(source)) => target < source,
        _ => false,
    }
}

async fn resolve_reference_field(
    record: &Record,
    value: &Map<String, Value>,
    ctx: &TransformContext,
) -> Result<Option<Value>, TransformError> {
    let Some(raw) = value.get("reference").and_then(Value::as_str) else {
        return Ok(None);
    };
    let Ok(reference) = Reference::from_str(raw) else {
        tracing::debug!(
            reference = %record.reference(),
            target = raw,
            "Ignoring unparseable reference"
        );
        return Ok(None);
    };
    if !precedes(reference.record_type, record.record_type) {
        return Ok(None);
    }
    let id = ctx.destination_id(&reference).await?;
    Ok(Some(Value::from(id.value())))
}

#[async_trait]
impl TypeTransformer for GenericTransformer {
    async fn transform(
        &self,
        record: &Record,
        writer: &dyn TableWriter,
        ctx: &TransformContext,
    ) -> Result<(), TransformError> {
        let id = ctx.destination_id(&record.reference()).await?;

        if record.deleted {
            writer.delete(id);
            return Ok(());
        }

        let mut fields = Map::new();

        if record.record_type == RecordType::Patient {
            if !is_patient_visible(record, ctx.visibility_policy())? {
                writer.delete(id);
                return Ok(());
            }
        } else if record.record_type.is_patient_scoped() {
            let Some(patient) = ctx.patient() else {
                tracing::debug!(
                    reference = %record.reference(),
                    "No patient context, emitting nothing"
                );
                return Ok(());
            };
            if !patient.visible {
                writer.delete(id);
                return Ok(());
            }
            fields.insert("patient_id".to_string(), Value::from(patient.patient_id.value()));
            fields.insert("person_id".to_string(), Value::from(patient.person_id.value()));
        }

        fields.insert(
            "local_id".to_string(),
            Value::from(record.local_id.as_str()),
        );
        if let Some(organization_id) = ctx.organization_id() {
            fields.insert(
                "organization_id".to_string(),
                Value::from(organization_id.value()),
            );
        }

        let payload = record
            .payload_json()
            .map_err(|e| invalid_payload(record, e.to_string()))?;
        let Value::Object(payload) = payload else {
            return Err(invalid_payload(record, "payload is not a JSON object"));
        };

        for (key, value) in &payload {
            if IGNORED_FIELDS.contains(&key.as_str()) || fields.contains_key(key) {
                continue;
            }
            match value {
                Value::String(_) | Value::Number(_) | Value::Bool(_) => {
                    fields.insert(key.clone(), value.clone());
                }
                Value::Object(object) => {
                    if let Some(resolved) = resolve_reference_field(record, object, ctx).await? {
                        fields.insert(format!("{key}_id"), resolved);
                    }
                }
                Value::Null | Value::Array(_) => {}
            }
        }

        writer.upsert(id, fields);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedes_follows_phase_order() {
        assert!(precedes(RecordType::Practitioner, RecordType::Observation));
        assert!(precedes(RecordType::Patient, RecordType::Encounter));
        assert!(!precedes(RecordType::Observation, RecordType::Observation));
        assert!(!precedes(RecordType::Flag, RecordType::Encounter));
        assert!(!precedes(RecordType::Composition, RecordType::Flag));
    }
}
