//! Canonical record and batch models
//!
//! A [`Record`] is one immutable snapshot of a clinical entity. A [`Batch`] is
//! the unit of work handed to the orchestrator: records that share delivery
//! metadata.

use super::errors::ConduitError;
use super::ids::{BatchId, ExchangeId, LocalId, ServiceId, SystemId};
use super::record_type::RecordType;
use super::result::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A (record-type, local-id) lookup key
///
/// Displayed and parsed as `Type/local-id`, the same shape records use to
/// point at each other inside their payloads.
///
/// # Examples
///
/// ```
/// use conduit::domain::{RecordType, Reference};
/// use std::str::FromStr;
///
/// let reference = Reference::from_str("Patient/P1").unwrap();
/// assert_eq!(reference.record_type, RecordType::Patient);
/// assert_eq!(reference.to_string(), "Patient/P1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Reference {
    /// Type of the referenced record
    pub record_type: RecordType,

    /// Local id of the referenced record
    pub local_id: LocalId,
}

impl Reference {
    pub fn new(record_type: RecordType, local_id: LocalId) -> Self {
        Self {
            record_type,
            local_id,
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.record_type, self.local_id)
    }
}

impl FromStr for Reference {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (type_part, id_part) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| format!("Invalid reference '{s}'. Expected format: Type/id"))?;
        let record_type = RecordType::from_str(type_part)?;
        let local_id = LocalId::new(id_part)?;
        Ok(Self::new(record_type, local_id))
    }
}

/// One canonical clinical entity snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Record category
    pub record_type: RecordType,

    /// Id unique within type and source service
    pub local_id: LocalId,

    /// Serialized JSON payload
    pub payload: String,

    /// Whether this snapshot is a tombstone
    #[serde(default)]
    pub deleted: bool,

    /// Publishing service
    pub service_id: ServiceId,
}

impl Record {
    /// Creates a current (non-deleted) record
    pub fn new(
        record_type: RecordType,
        local_id: LocalId,
        payload: impl Into<String>,
        service_id: ServiceId,
    ) -> Self {
        Self {
            record_type,
            local_id,
            payload: payload.into(),
            deleted: false,
            service_id,
        }
    }

    /// Creates a record from a JSON payload value
    pub fn from_json(
        record_type: RecordType,
        local_id: LocalId,
        payload: &serde_json::Value,
        service_id: ServiceId,
    ) -> Self {
        Self::new(record_type, local_id, payload.to_string(), service_id)
    }

    /// Creates a deleted snapshot with an empty payload
    pub fn tombstone(record_type: RecordType, local_id: LocalId, service_id: ServiceId) -> Self {
        Self {
            record_type,
            local_id,
            payload: "{}".to_string(),
            deleted: true,
            service_id,
        }
    }

    /// The lookup key for this record
    pub fn reference(&self) -> Reference {
        Reference::new(self.record_type, self.local_id.clone())
    }

    /// Deserializes the payload
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the payload is not valid JSON.
    pub fn payload_json(&self) -> Result<serde_json::Value> {
        serde_json::from_str(&self.payload).map_err(|e| {
            ConduitError::Serialization(format!("Invalid payload for {}: {e}", self.reference()))
        })
    }
}

/// The unit of work submitted to the orchestrator
///
/// Records are kept in delivery order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub service_id: ServiceId,
    pub system_id: SystemId,
    pub exchange_id: ExchangeId,
    pub batch_id: BatchId,

    /// Set when the upstream delivery scoped this batch to a single patient
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_scope: Option<LocalId>,

    pub records: Vec<Record>,
}

impl Batch {
    pub fn builder() -> BatchBuilder {
        BatchBuilder::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Builder for [`Batch`]
///
/// # Examples
///
/// ```
/// use conduit::domain::{Batch, LocalId, Record, RecordType};
/// use conduit::domain::ids::{BatchId, ExchangeId, ServiceId, SystemId};
///
/// let service_id = ServiceId::random();
/// let batch = Batch::builder()
///     .service_id(service_id)
///     .system_id(SystemId::random())
///     .exchange_id(ExchangeId::random())
///     .batch_id(BatchId::random())
///     .record(Record::new(
///         RecordType::Patient,
///         LocalId::new("P1").unwrap(),
///         "{}",
///         service_id,
///     ))
///     .build()
///     .unwrap();
/// assert_eq!(batch.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct BatchBuilder {
    service_id: Option<ServiceId>,
    system_id: Option<SystemId>,
    exchange_id: Option<ExchangeId>,
    batch_id: Option<BatchId>,
    patient_scope: Option<LocalId>,
    records: Vec<Record>,
}

impl BatchBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn service_id(mut self, service_id: ServiceId) -> Self {
        self.service_id = Some(service_id);
        self
    }

    pub fn system_id(mut self, system_id: SystemId) -> Self {
        self.system_id = Some(system_id);
        self
    }

    pub fn exchange_id(mut self, exchange_id: ExchangeId) -> Self {
        self.exchange_id = Some(exchange_id);
        self
    }

    pub fn batch_id(mut self, batch_id: BatchId) -> Self {
        self.batch_id = Some(batch_id);
        self
    }

    pub fn patient_scope(mut self, patient: LocalId) -> Self {
        self.patient_scope = Some(patient);
        self
    }

    pub fn record(mut self, record: Record) -> Self {
        self.records.push(record);
        self
    }

    pub fn records(mut self, records: impl IntoIterator<Item = Record>) -> Self {
        self.records.extend(records);
        self
    }

    /// Builds the batch
    ///
    /// # Errors
    ///
    /// Returns a validation error if delivery metadata is missing or a record
    /// was published by a different service than the batch.
    pub fn build(self) -> Result<Batch> {
        let service_id = self
            .service_id
            .ok_or_else(|| ConduitError::Validation("service_id is required".to_string()))?;
        let system_id = self
            .system_id
            .ok_or_else(|| ConduitError::Validation("system_id is required".to_string()))?;
        let exchange_id = self
            .exchange_id
            .ok_or_else(|| ConduitError::Validation("exchange_id is required".to_string()))?;
        let batch_id = self
            .batch_id
            .ok_or_else(|| ConduitError::Validation("batch_id is required".to_string()))?;

        if let Some(stray) = self.records.iter().find(|r| r.service_id != service_id) {
            return Err(ConduitError::Validation(format!(
                "Record {} belongs to service {}, not batch service {}",
                stray.reference(),
                stray.service_id,
                service_id
            )));
        }

        Ok(Batch {
            service_id,
            system_id,
            exchange_id,
            batch_id,
            patient_scope: self.patient_scope,
            records: self.records,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(id: &str) -> LocalId {
        LocalId::new(id).unwrap()
    }

    #[test]
    fn test_reference_parse() {
        let reference = Reference::from_str("Observation/O-1").unwrap();
        assert_eq!(reference.record_type, RecordType::Observation);
        assert_eq!(reference.local_id.as_str(), "O-1");
    }

    #[test]
    fn test_reference_parse_invalid() {
        assert!(Reference::from_str("Observation").is_err());
        assert!(Reference::from_str("Unknown/1").is_err());
        assert!(Reference::from_str("Patient/").is_err());
    }

    #[test]
    fn test_record_payload_json() {
        let service_id = ServiceId::random();
        let record = Record::new(
            RecordType::Patient,
            local("P1"),
            r#"{"confidential": true}"#,
            service_id,
        );
        let payload = record.payload_json().unwrap();
        assert_eq!(payload["confidential"], serde_json::Value::Bool(true));
        assert_eq!(record.reference().to_string(), "Patient/P1");
    }

    #[test]
    fn test_record_invalid_payload() {
        let record = Record::new(RecordType::Flag, local("F1"), "{not json", ServiceId::random());
        let err = record.payload_json().unwrap_err();
        assert!(matches!(err, ConduitError::Serialization(_)));
    }

    #[test]
    fn test_tombstone() {
        let record = Record::tombstone(RecordType::Condition, local("C1"), ServiceId::random());
        assert!(record.deleted);
    }

    #[test]
    fn test_batch_builder_requires_metadata() {
        let result = Batch::builder().service_id(ServiceId::random()).build();
        assert!(matches!(result, Err(ConduitError::Validation(_))));
    }

    #[test]
    fn test_batch_builder_rejects_foreign_records() {
        let service_id = ServiceId::random();
        let result = Batch::builder()
            .service_id(service_id)
            .system_id(SystemId::random())
            .exchange_id(ExchangeId::random())
            .batch_id(BatchId::random())
            .record(Record::new(
                RecordType::Patient,
                local("P1"),
                "{}",
                ServiceId::random(),
            ))
            .build();
        assert!(matches!(result, Err(ConduitError::Validation(_))));
    }
}
