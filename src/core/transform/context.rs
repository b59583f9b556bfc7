//! Per-batch context handed to every transformer

use crate::adapters::StoreResult;
use crate::core::index::ReferenceIndex;
use crate::core::resolve::{
    IdentifierResolver, PatientContext, PatientResolution, PatientResolver, VisibilityPolicy,
};
use crate::domain::{Batch, BatchId, DestinationId, LocalId, Reference, ServiceId, TransformError};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Read-mostly state shared by every worker of a batch
///
/// The patient context is filled in exactly once, at the patient barrier,
/// and is read-only afterwards.
pub struct TransformContext {
    batch_id: BatchId,
    service_id: ServiceId,
    organization_id: Option<DestinationId>,
    patient_scope: Option<LocalId>,
    index: Arc<ReferenceIndex>,
    identifiers: Arc<IdentifierResolver>,
    patients: Arc<PatientResolver>,
    patient: OnceCell<PatientResolution>,
}

impl TransformContext {
    pub fn new(
        batch: &Batch,
        organization_id: Option<DestinationId>,
        index: Arc<ReferenceIndex>,
        identifiers: Arc<IdentifierResolver>,
        patients: Arc<PatientResolver>,
    ) -> Self {
        Self {
            batch_id: batch.batch_id,
            service_id: batch.service_id,
            organization_id,
            patient_scope: batch.patient_scope.clone(),
            index,
            identifiers,
            patients,
            patient: OnceCell::new(),
        }
    }

    pub fn batch_id(&self) -> BatchId {
        self.batch_id
    }

    pub fn service_id(&self) -> ServiceId {
        self.service_id
    }

    /// Destination organization owning the batch, once resolved
    pub fn organization_id(&self) -> Option<DestinationId> {
        self.organization_id
    }

    pub fn index(&self) -> &ReferenceIndex {
        &self.index
    }

    pub fn identifiers(&self) -> &IdentifierResolver {
        &self.identifiers
    }

    pub fn visibility_policy(&self) -> &VisibilityPolicy {
        self.patients.policy()
    }

    /// Runs patient resolution, at most once per batch
    ///
    /// Later calls return the first outcome without resolving again.
    ///
    /// # Errors
    ///
    /// Returns the resolver's error; a failed attempt leaves the context
    /// unresolved.
    pub async fn resolve_patient(&self) -> Result<&PatientResolution, TransformError> {
        self.patient
            .get_or_try_init(|| async {
                self.patients
                    .resolve(&self.index, self.patient_scope.as_ref())
                    .await
            })
            .await
    }

    /// Outcome of patient resolution, `None` before the barrier
    pub fn patient_resolution(&self) -> Option<&PatientResolution> {
        self.patient.get()
    }

    /// Resolved patient context, if the patient is known downstream
    pub fn patient(&self) -> Option<&PatientContext> {
        self.patient.get().and_then(PatientResolution::context)
    }

    /// Destination id for a referenced record, allocating on first sight
    pub async fn destination_id(&self, reference: &Reference) -> StoreResult<DestinationId> {
        self.identifiers.destination_id_for(reference).await
    }

    /// Destination id for a referenced record if one was ever allocated
    pub async fn existing_destination_id(
        &self,
        reference: &Reference,
    ) -> StoreResult<Option<DestinationId>> {
        self.identifiers.existing_destination_id_for(reference).await
    }
}

impl std::fmt::Debug for TransformContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformContext")
            .field("batch_id", &self.batch_id)
            .field("service_id", &self.service_id)
            .field("organization_id", &self.organization_id)
            .field("patient", &self.patient.get())
            .finish_non_exhaustive()
    }
}
