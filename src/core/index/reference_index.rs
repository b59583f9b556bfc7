//! Reference index
//!
//! Maps every `Type/local-id` key of a batch to its record and tracks which
//! keys have been transformed or deliberately skipped. Shared by all worker
//! tasks of a batch, so every mutation is an atomic operation behind a lock.

use crate::adapters::RecordStore;
use crate::core::verification::{self, CompletenessReport};
use crate::domain::{
    Batch, BatchId, Lookup, Record, RecordType, Reference, ServiceId, StoreError, TransformError,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

/// Audit entry for a record the orchestrator added to the batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddedRecord {
    pub reference: Reference,
    pub reason: String,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Entries {
    by_reference: HashMap<Reference, Arc<Record>>,
    order: Vec<Reference>,
}

#[derive(Debug, Default)]
struct TransformState {
    transformed: HashSet<Reference>,
    skipped: HashSet<Reference>,
}

/// Per-batch index of records and their transform state
pub struct ReferenceIndex {
    service_id: ServiceId,
    batch_id: BatchId,
    entries: RwLock<Entries>,
    state: Mutex<TransformState>,
    added: Mutex<Vec<AddedRecord>>,
    record_store: Arc<dyn RecordStore>,
}

impl ReferenceIndex {
    /// Indexes every record of a batch
    ///
    /// Duplicate references overwrite the earlier record with a warning; they
    /// come from upstream redelivery rather than corruption.
    pub fn build(batch: &Batch, record_store: Arc<dyn RecordStore>) -> Self {
        let mut entries = Entries::default();
        let mut duplicates = 0usize;

        for record in &batch.records {
            let reference = record.reference();
            if entries
                .by_reference
                .insert(reference.clone(), Arc::new(record.clone()))
                .is_some()
            {
                duplicates += 1;
                tracing::warn!(
                    batch_id = %batch.batch_id,
                    reference = %reference,
                    "Duplicate record in batch, keeping the last one"
                );
            } else {
                entries.order.push(reference);
            }
        }

        tracing::debug!(
            batch_id = %batch.batch_id,
            records = entries.order.len(),
            duplicates,
            "Reference index built"
        );

        Self {
            service_id: batch.service_id,
            batch_id: batch.batch_id,
            entries: RwLock::new(entries),
            state: Mutex::new(TransformState::default()),
            added: Mutex::new(Vec::new()),
            record_store,
        }
    }

    pub fn service_id(&self) -> ServiceId {
        self.service_id
    }

    pub fn batch_id(&self) -> BatchId {
        self.batch_id
    }

    /// Inserts a record that was not delivered with the batch
    ///
    /// No-op when the reference is already indexed. Every insertion is kept in
    /// an audit trail so the caller can persist it for reprocessing.
    ///
    /// # Returns
    ///
    /// `true` if the record was added.
    pub fn add_record(&self, record: Record, reason: &str) -> bool {
        let reference = record.reference();
        {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            if entries.by_reference.contains_key(&reference) {
                return false;
            }
            entries
                .by_reference
                .insert(reference.clone(), Arc::new(record));
            entries.order.push(reference.clone());
        }

        tracing::info!(
            batch_id = %self.batch_id,
            reference = %reference,
            reason,
            "Added record to batch"
        );
        self.lock_added().push(AddedRecord {
            reference,
            reason: reason.to_string(),
            added_at: Utc::now(),
        });
        true
    }

    /// Marks a reference as transformed
    ///
    /// # Returns
    ///
    /// `true` if it had already been marked, in which case the caller must not
    /// emit output for it again. Exactly one of any number of concurrent
    /// callers for the same reference observes `false`.
    pub fn mark_transformed(&self, reference: &Reference) -> bool {
        !self.lock_state().transformed.insert(reference.clone())
    }

    /// Marks a reference as deliberately not transformed
    pub fn mark_skipped(&self, reference: &Reference) {
        self.lock_state().skipped.insert(reference.clone());
    }

    /// Looks a reference up in this batch only
    pub fn find_by_reference(&self, reference: &Reference) -> Lookup<Arc<Record>> {
        match self.read_entries().by_reference.get(reference) {
            None => Lookup::NotFound,
            Some(record) if record.deleted => Lookup::Deleted,
            Some(record) => Lookup::Found(record.clone()),
        }
    }

    /// Looks a reference up in this batch, then in the durable record store
    ///
    /// # Errors
    ///
    /// Returns an error if the record store fails.
    pub async fn resolve_or_fetch(
        &self,
        reference: &Reference,
    ) -> Result<Lookup<Arc<Record>>, StoreError> {
        match self.find_by_reference(reference) {
            Lookup::NotFound => {}
            known => return Ok(known),
        }

        let fetched = self
            .record_store
            .get_current_version(self.service_id, reference)
            .await?;
        tracing::debug!(
            batch_id = %self.batch_id,
            reference = %reference,
            state = fetched.state(),
            "Fetched record from store"
        );
        Ok(fetched.map(Arc::new))
    }

    /// Snapshot of every record of one type, in batch order
    pub fn records_of_type(&self, record_type: RecordType) -> Vec<Arc<Record>> {
        let entries = self.read_entries();
        entries
            .order
            .iter()
            .filter(|reference| reference.record_type == record_type)
            .filter_map(|reference| entries.by_reference.get(reference).cloned())
            .collect()
    }

    /// Distinct record types present, in phase enumeration order
    pub fn record_types(&self) -> Vec<RecordType> {
        let mut types: Vec<RecordType> = self
            .read_entries()
            .order
            .iter()
            .map(|reference| reference.record_type)
            .collect();
        types.sort();
        types.dedup();
        types
    }

    /// Whether any indexed record belongs to a patient
    pub fn has_patient_scoped_records(&self) -> bool {
        self.read_entries()
            .order
            .iter()
            .any(|reference| reference.record_type.is_patient_scoped())
    }

    /// References neither transformed nor skipped, in batch order
    pub fn pending(&self) -> Vec<Reference> {
        let entries = self.read_entries();
        let state = self.lock_state();
        entries
            .order
            .iter()
            .filter(|r| !state.transformed.contains(r) && !state.skipped.contains(r))
            .cloned()
            .collect()
    }

    /// Record counts per type
    pub fn type_breakdown(&self) -> BTreeMap<RecordType, usize> {
        let mut breakdown = BTreeMap::new();
        for reference in &self.read_entries().order {
            *breakdown.entry(reference.record_type).or_insert(0) += 1;
        }
        breakdown
    }

    pub fn len(&self) -> usize {
        self.read_entries().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records added to the batch by the orchestrator
    pub fn added_records(&self) -> Vec<AddedRecord> {
        self.lock_added().clone()
    }

    /// Certifies that every indexed reference was transformed or skipped
    ///
    /// # Errors
    ///
    /// Returns [`TransformError::CompletenessViolation`] naming the pending
    /// count and the first pending references.
    pub fn check_completeness(&self) -> Result<CompletenessReport, TransformError> {
        let entries = self.read_entries();
        let state = self.lock_state();
        verification::check_completeness(&entries.order, &state.transformed, &state.skipped)
    }

    fn read_entries(&self) -> std::sync::RwLockReadGuard<'_, Entries> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_state(&self) -> MutexGuard<'_, TransformState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_added(&self) -> MutexGuard<'_, Vec<AddedRecord>> {
        self.added.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ReferenceIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceIndex")
            .field("service_id", &self.service_id)
            .field("batch_id", &self.batch_id)
            .field("records", &self.len())
            .finish()
    }
}
