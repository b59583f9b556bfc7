//! Identifier resolver
//!
//! Maps local identities to stable destination ids through the durable
//! [`IdMappingStore`], and resolves the destination organization of a
//! publishing service once per service per process.

use crate::adapters::{IdMappingStore, ServiceDirectory, StoreResult};
use crate::core::index::ReferenceIndex;
use crate::domain::{
    DestinationId, IdScope, LocalId, Lookup, RecordType, Reference, ServiceId, TransformError,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

const OWNING_ORGANIZATION_REASON: &str = "owning organization of the publishing service";

/// Resolves destination ids for a process
///
/// Constructed once and shared by every batch, so the per-service
/// organization cache lives as long as the process.
pub struct IdentifierResolver {
    store: Arc<dyn IdMappingStore>,
    directory: Arc<dyn ServiceDirectory>,
    organization_cache: Mutex<HashMap<ServiceId, DestinationId>>,
}

impl IdentifierResolver {
    pub fn new(store: Arc<dyn IdMappingStore>, directory: Arc<dyn ServiceDirectory>) -> Self {
        Self {
            store,
            directory,
            organization_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the destination id for a key, allocating one on first sight
    pub async fn find_or_create_destination_id(
        &self,
        scope: impl Into<IdScope>,
        local_id: &LocalId,
    ) -> StoreResult<DestinationId> {
        self.store
            .find_or_create_destination_id(scope.into(), local_id)
            .await
    }

    /// Returns the destination id for a key without allocating one
    pub async fn find_destination_id(
        &self,
        scope: impl Into<IdScope>,
        local_id: &LocalId,
    ) -> StoreResult<Option<DestinationId>> {
        self.store.find_destination_id(scope.into(), local_id).await
    }

    pub async fn find_instance_mapped_id(
        &self,
        record_type: RecordType,
        local_id: &LocalId,
    ) -> StoreResult<Option<LocalId>> {
        self.store.find_instance_mapped_id(record_type, local_id).await
    }

    /// Re-points every association of `old_id` to `new_id`
    pub async fn take_over_instance_mapping(
        &self,
        record_type: RecordType,
        old_id: &LocalId,
        new_id: &LocalId,
    ) -> StoreResult<()> {
        tracing::info!(
            record_type = %record_type,
            old_id = %old_id,
            new_id = %new_id,
            "Taking over instance mapping"
        );
        self.store
            .take_over_instance_mapping(record_type, old_id, new_id)
            .await
    }

    /// Destination id for a referenced record
    ///
    /// Organizations follow their instance mapping first, so every local id
    /// of a merged organization lands on the same destination id.
    pub async fn destination_id_for(&self, reference: &Reference) -> StoreResult<DestinationId> {
        let local_id = self.canonical_local_id(reference).await?;
        self.find_or_create_destination_id(reference.record_type, &local_id)
            .await
    }

    /// Like [`destination_id_for`](Self::destination_id_for) but never allocates
    pub async fn existing_destination_id_for(
        &self,
        reference: &Reference,
    ) -> StoreResult<Option<DestinationId>> {
        let local_id = self.canonical_local_id(reference).await?;
        self.find_destination_id(reference.record_type, &local_id)
            .await
    }

    async fn canonical_local_id(&self, reference: &Reference) -> StoreResult<LocalId> {
        if reference.record_type != RecordType::Organization {
            return Ok(reference.local_id.clone());
        }
        Ok(self
            .find_instance_mapped_id(RecordType::Organization, &reference.local_id)
            .await?
            .unwrap_or_else(|| reference.local_id.clone()))
    }

    /// Resolves the destination organization id for the batch's service
    ///
    /// Memoized per service. The first resolution for a service discovers
    /// the owning organization, merges it with any other instance already
    /// representing the same organization, forces its record into the batch
    /// and persists the association. Later calls, in this process or after a
    /// restart, short-circuit to the persisted association.
    ///
    /// # Returns
    ///
    /// `None` when the service directory does not know the service yet. That
    /// is not an error; a later delivery will resolve it.
    ///
    /// # Errors
    ///
    /// Returns an error if any store fails.
    pub async fn resolve_organization_for_service(
        &self,
        index: &ReferenceIndex,
    ) -> Result<Option<DestinationId>, TransformError> {
        let service_id = index.service_id();
        let mut cache = self.organization_cache.lock().await;

        if let Some(organization_id) = cache.get(&service_id) {
            tracing::debug!(
                service_id = %service_id,
                organization_id = %organization_id,
                "Organization resolved from cache"
            );
            return Ok(Some(*organization_id));
        }

        if let Some(organization_id) = self.store.get_org_mapping_for_service(service_id).await? {
            tracing::debug!(
                service_id = %service_id,
                organization_id = %organization_id,
                "Organization resolved from persisted mapping"
            );
            cache.insert(service_id, organization_id);
            return Ok(Some(organization_id));
        }

        let Some(owner) = self.directory.find_service_organization(service_id).await? else {
            tracing::warn!(
                service_id = %service_id,
                batch_id = %index.batch_id(),
                "No organization registered for service yet, skipping organization resolution"
            );
            return Ok(None);
        };

        let winner = self
            .store
            .find_or_create_instance_mapping(
                RecordType::Organization,
                &owner.local_id,
                &owner.mapping_value,
            )
            .await?;
        if winner != owner.local_id {
            self.take_over_instance_mapping(RecordType::Organization, &winner, &owner.local_id)
                .await?;
            // Persisted service mappings may have moved with the takeover
            cache.clear();
        }

        let organization_id = self
            .find_or_create_destination_id(RecordType::Organization, &owner.local_id)
            .await?;

        let reference = Reference::new(RecordType::Organization, owner.local_id.clone());
        match index.resolve_or_fetch(&reference).await? {
            Lookup::Found(record) => {
                index.add_record((*record).clone(), OWNING_ORGANIZATION_REASON);
            }
            missing => {
                tracing::warn!(
                    service_id = %service_id,
                    reference = %reference,
                    state = missing.state(),
                    "Owning organization record unavailable, it will not be transformed in this batch"
                );
            }
        }

        self.store
            .save_org_mapping_for_service(service_id, organization_id)
            .await?;
        cache.insert(service_id, organization_id);

        tracing::info!(
            service_id = %service_id,
            organization = %reference,
            organization_id = %organization_id,
            "Resolved organization for service"
        );
        Ok(Some(organization_id))
    }
}

impl std::fmt::Debug for IdentifierResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentifierResolver").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{
        InMemoryIdMappingStore, InMemoryRecordStore, InMemoryServiceDirectory,
    };
    use crate::adapters::ServiceOrganization;
    use crate::domain::{Batch, BatchId, ExchangeId, Record, SystemId};

    fn local(id: &str) -> LocalId {
        LocalId::new(id).unwrap()
    }

    fn empty_index(service_id: ServiceId, store: Arc<InMemoryRecordStore>) -> ReferenceIndex {
        let batch = Batch::builder()
            .service_id(service_id)
            .system_id(SystemId::random())
            .exchange_id(ExchangeId::random())
            .batch_id(BatchId::random())
            .build()
            .unwrap();
        ReferenceIndex::build(&batch, store)
    }

    #[tokio::test]
    async fn test_unknown_service_is_not_ready() {
        let resolver = IdentifierResolver::new(
            Arc::new(InMemoryIdMappingStore::new()),
            Arc::new(InMemoryServiceDirectory::new()),
        );
        let index = empty_index(ServiceId::random(), Arc::new(InMemoryRecordStore::new()));

        let resolved = resolver.resolve_organization_for_service(&index).await.unwrap();
        assert!(resolved.is_none());
    }

    #[tokio::test]
    async fn test_organization_is_forced_into_batch() {
        let service_id = ServiceId::random();
        let directory = Arc::new(InMemoryServiceDirectory::new());
        directory.register(
            service_id,
            ServiceOrganization {
                local_id: local("ORG1"),
                mapping_value: "ODS1".to_string(),
            },
        );
        let records = Arc::new(InMemoryRecordStore::with_records(vec![Record::new(
            RecordType::Organization,
            local("ORG1"),
            "{}",
            service_id,
        )]));
        let resolver =
            IdentifierResolver::new(Arc::new(InMemoryIdMappingStore::new()), directory.clone());
        let index = empty_index(service_id, records);

        let first = resolver.resolve_organization_for_service(&index).await.unwrap();
        let second = resolver.resolve_organization_for_service(&index).await.unwrap();

        assert!(first.is_some());
        assert_eq!(first, second);
        assert_eq!(directory.lookup_count(), 1);
        assert_eq!(index.added_records().len(), 1);
        assert_eq!(index.records_of_type(RecordType::Organization).len(), 1);
    }

    #[tokio::test]
    async fn test_new_instance_takes_over_existing_organization() {
        let store = Arc::new(InMemoryIdMappingStore::new());
        let old_service = ServiceId::random();
        let new_service = ServiceId::random();
        let directory = Arc::new(InMemoryServiceDirectory::new());
        directory.register(
            old_service,
            ServiceOrganization {
                local_id: local("OLD"),
                mapping_value: "ODS1".to_string(),
            },
        );
        directory.register(
            new_service,
            ServiceOrganization {
                local_id: local("NEW"),
                mapping_value: "ODS1".to_string(),
            },
        );
        let records = Arc::new(InMemoryRecordStore::new());
        let resolver = IdentifierResolver::new(store.clone(), directory);

        let old_org = resolver
            .resolve_organization_for_service(&empty_index(old_service, records.clone()))
            .await
            .unwrap();
        let new_org = resolver
            .resolve_organization_for_service(&empty_index(new_service, records))
            .await
            .unwrap();

        // Same real-world organization keeps one destination id
        assert_eq!(old_org, new_org);
        assert_eq!(
            resolver
                .find_instance_mapped_id(RecordType::Organization, &local("OLD"))
                .await
                .unwrap(),
            Some(local("NEW"))
        );
        let via_old = resolver
            .destination_id_for(&Reference::new(RecordType::Organization, local("OLD")))
            .await
            .unwrap();
        assert_eq!(Some(via_old), new_org);
    }

    #[tokio::test]
    async fn test_persisted_mapping_skips_discovery() {
        let service_id = ServiceId::random();
        let store = Arc::new(InMemoryIdMappingStore::new());
        store
            .save_org_mapping_for_service(service_id, DestinationId::new(42))
            .await
            .unwrap();
        let directory = Arc::new(InMemoryServiceDirectory::new());
        let resolver = IdentifierResolver::new(store, directory.clone());
        let index = empty_index(service_id, Arc::new(InMemoryRecordStore::new()));

        let resolved = resolver.resolve_organization_for_service(&index).await.unwrap();
        assert_eq!(resolved, Some(DestinationId::new(42)));
        assert_eq!(directory.lookup_count(), 0);
    }
}
