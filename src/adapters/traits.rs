//! Collaborator traits
//!
//! The orchestrator only talks to its durable stores and output destination
//! through these traits. Production deployments plug in database-backed
//! implementations; [`memory`](super::memory) ships thread-safe in-memory ones.

use crate::core::transform::output::OutputBatch;
use crate::domain::{
    DestinationId, IdScope, LocalId, Lookup, Record, RecordType, Reference, Result, ServiceId,
    StoreError,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Durable mapping from local identities to destination ids
///
/// Every method must be safe to call concurrently from many worker tasks.
#[async_trait]
pub trait IdMappingStore: Send + Sync {
    /// Returns the destination id for a key, allocating one on first sight
    ///
    /// Repeated calls with the same key return the same id, across batches
    /// and process restarts.
    async fn find_or_create_destination_id(
        &self,
        scope: IdScope,
        local_id: &LocalId,
    ) -> StoreResult<DestinationId>;

    /// Returns the destination id for a key without allocating one
    async fn find_destination_id(
        &self,
        scope: IdScope,
        local_id: &LocalId,
    ) -> StoreResult<Option<DestinationId>>;

    /// Returns the local id currently representing `mapping_value`
    ///
    /// When no instance has claimed the value yet, `local_id` claims it and
    /// is returned. Either way `local_id` becomes associated with the winner.
    async fn find_or_create_instance_mapping(
        &self,
        record_type: RecordType,
        local_id: &LocalId,
        mapping_value: &str,
    ) -> StoreResult<LocalId>;

    /// Returns the winning local id a local id is mapped to, if any
    async fn find_instance_mapped_id(
        &self,
        record_type: RecordType,
        local_id: &LocalId,
    ) -> StoreResult<Option<LocalId>>;

    /// Re-points every association held by `old_id` to `new_id`
    ///
    /// Afterwards `find_instance_mapped_id(old_id)` returns `new_id`. When
    /// `old_id` holds a destination id, `new_id` takes it over, replacing its
    /// own, and service organization mappings follow.
    async fn take_over_instance_mapping(
        &self,
        record_type: RecordType,
        old_id: &LocalId,
        new_id: &LocalId,
    ) -> StoreResult<()>;

    /// Persisted destination organization id for a publishing service
    async fn get_org_mapping_for_service(
        &self,
        service_id: ServiceId,
    ) -> StoreResult<Option<DestinationId>>;

    /// Persists the destination organization id for a publishing service
    async fn save_org_mapping_for_service(
        &self,
        service_id: ServiceId,
        organization_id: DestinationId,
    ) -> StoreResult<()>;
}

/// Durable record history
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Latest known version of a record published by a service
    async fn get_current_version(
        &self,
        service_id: ServiceId,
        reference: &Reference,
    ) -> StoreResult<Lookup<Record>>;
}

/// Patient to person links
#[async_trait]
pub trait PatientLinkStore: Send + Sync {
    async fn get_person_id(&self, patient_local_id: &LocalId) -> StoreResult<Option<LocalId>>;
}

/// The organization that owns a publishing service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceOrganization {
    /// Local id of the Organization record representing the service
    pub local_id: LocalId,

    /// Value identifying the real-world organization across source
    /// instances, typically its national organization code
    pub mapping_value: String,
}

/// Lookup of the organization owning a service
#[async_trait]
pub trait ServiceDirectory: Send + Sync {
    async fn find_service_organization(
        &self,
        service_id: ServiceId,
    ) -> StoreResult<Option<ServiceOrganization>>;
}

/// Destination for finalized batch output
#[async_trait]
pub trait OutputSink: Send + Sync {
    /// Writes every table of a finalized batch
    ///
    /// # Returns
    ///
    /// Number of rows written.
    async fn write_batch(&self, output: &OutputBatch) -> Result<usize>;
}
