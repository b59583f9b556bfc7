//! Thread-safe in-memory collaborators
//!
//! Used by tests and by the local CLI, which snapshots them to a JSON state
//! file between runs (see [`local`](super::local)).

use super::traits::{
    IdMappingStore, PatientLinkStore, RecordStore, ServiceDirectory, ServiceOrganization,
    StoreResult,
};
use crate::domain::{
    DestinationId, IdScope, LocalId, Lookup, Record, RecordType, Reference, ServiceId,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct IdMappingState {
    next_id: i64,
    destination_ids: HashMap<(IdScope, LocalId), DestinationId>,
    instance_values: HashMap<(RecordType, String), LocalId>,
    instance_mappings: HashMap<(RecordType, LocalId), LocalId>,
    service_organizations: HashMap<ServiceId, DestinationId>,
}

impl IdMappingState {
    fn allocate(&mut self) -> DestinationId {
        self.next_id += 1;
        DestinationId::new(self.next_id)
    }
}

/// In-memory identifier-mapping store
///
/// Destination ids come from a single monotonically increasing counter, so
/// they are unique across scopes as well as within one.
#[derive(Debug, Default)]
pub struct InMemoryIdMappingStore {
    state: Mutex<IdMappingState>,
}

impl InMemoryIdMappingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a store from a persisted snapshot
    pub fn from_snapshot(snapshot: IdMappingSnapshot) -> Self {
        let state = IdMappingState {
            next_id: snapshot.next_id,
            destination_ids: snapshot
                .destination_ids
                .into_iter()
                .map(|e| ((e.scope, e.local_id), e.destination_id))
                .collect(),
            instance_values: snapshot
                .instance_values
                .into_iter()
                .map(|e| ((e.record_type, e.mapping_value), e.local_id))
                .collect(),
            instance_mappings: snapshot
                .instance_mappings
                .into_iter()
                .map(|e| ((e.record_type, e.local_id), e.mapped_id))
                .collect(),
            service_organizations: snapshot
                .service_organizations
                .into_iter()
                .map(|e| (e.service_id, e.organization_id))
                .collect(),
        };
        Self {
            state: Mutex::new(state),
        }
    }

    /// Captures the current contents in a serializable, stably ordered form
    pub fn snapshot(&self) -> IdMappingSnapshot {
        let state = self.lock();

        let mut destination_ids: Vec<_> = state
            .destination_ids
            .iter()
            .map(|((scope, local_id), destination_id)| DestinationIdEntry {
                scope: *scope,
                local_id: local_id.clone(),
                destination_id: *destination_id,
            })
            .collect();
        destination_ids.sort_by_key(|e| e.destination_id);

        let mut instance_values: Vec<_> = state
            .instance_values
            .iter()
            .map(|((record_type, value), local_id)| InstanceValueEntry {
                record_type: *record_type,
                mapping_value: value.clone(),
                local_id: local_id.clone(),
            })
            .collect();
        instance_values.sort_by(|a, b| {
            (a.record_type, &a.mapping_value).cmp(&(b.record_type, &b.mapping_value))
        });

        let mut instance_mappings: Vec<_> = state
            .instance_mappings
            .iter()
            .map(|((record_type, local_id), mapped_id)| InstanceMappingEntry {
                record_type: *record_type,
                local_id: local_id.clone(),
                mapped_id: mapped_id.clone(),
            })
            .collect();
        instance_mappings
            .sort_by(|a, b| (a.record_type, &a.local_id).cmp(&(b.record_type, &b.local_id)));

        let mut service_organizations: Vec<_> = state
            .service_organizations
            .iter()
            .map(|(service_id, organization_id)| ServiceOrganizationEntry {
                service_id: *service_id,
                organization_id: *organization_id,
            })
            .collect();
        service_organizations.sort_by_key(|e| e.service_id);

        IdMappingSnapshot {
            next_id: state.next_id,
            destination_ids,
            instance_values,
            instance_mappings,
            service_organizations,
        }
    }

    /// Number of destination ids allocated so far
    pub fn allocated_count(&self) -> usize {
        self.lock().destination_ids.len()
    }

    fn lock(&self) -> MutexGuard<'_, IdMappingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl IdMappingStore for InMemoryIdMappingStore {
    async fn find_or_create_destination_id(
        &self,
        scope: IdScope,
        local_id: &LocalId,
    ) -> StoreResult<DestinationId> {
        let mut state = self.lock();
        let key = (scope, local_id.clone());
        if let Some(existing) = state.destination_ids.get(&key) {
            return Ok(*existing);
        }
        let allocated = state.allocate();
        state.destination_ids.insert(key, allocated);
        Ok(allocated)
    }

    async fn find_destination_id(
        &self,
        scope: IdScope,
        local_id: &LocalId,
    ) -> StoreResult<Option<DestinationId>> {
        Ok(self
            .lock()
            .destination_ids
            .get(&(scope, local_id.clone()))
            .copied())
    }

    async fn find_or_create_instance_mapping(
        &self,
        record_type: RecordType,
        local_id: &LocalId,
        mapping_value: &str,
    ) -> StoreResult<LocalId> {
        let mut state = self.lock();
        let winner = state
            .instance_values
            .entry((record_type, mapping_value.to_string()))
            .or_insert_with(|| local_id.clone())
            .clone();
        state
            .instance_mappings
            .insert((record_type, local_id.clone()), winner.clone());
        Ok(winner)
    }

    async fn find_instance_mapped_id(
        &self,
        record_type: RecordType,
        local_id: &LocalId,
    ) -> StoreResult<Option<LocalId>> {
        Ok(self
            .lock()
            .instance_mappings
            .get(&(record_type, local_id.clone()))
            .cloned())
    }

    async fn take_over_instance_mapping(
        &self,
        record_type: RecordType,
        old_id: &LocalId,
        new_id: &LocalId,
    ) -> StoreResult<()> {
        let mut state = self.lock();

        for ((mapped_type, _), mapped_id) in state.instance_mappings.iter_mut() {
            if *mapped_type == record_type && mapped_id == old_id {
                *mapped_id = new_id.clone();
            }
        }
        for ((value_type, _), owner) in state.instance_values.iter_mut() {
            if *value_type == record_type && owner == old_id {
                *owner = new_id.clone();
            }
        }
        state
            .instance_mappings
            .insert((record_type, old_id.clone()), new_id.clone());
        state
            .instance_mappings
            .insert((record_type, new_id.clone()), new_id.clone());

        let scope = IdScope::Record(record_type);
        let old_destination = state.destination_ids.get(&(scope, old_id.clone())).copied();
        if let Some(destination_id) = old_destination {
            let replaced = state
                .destination_ids
                .insert((scope, new_id.clone()), destination_id);

            // Services already mapped to the winner's own id follow it
            if let Some(replaced) = replaced.filter(|r| *r != destination_id) {
                if record_type == RecordType::Organization {
                    for organization_id in state.service_organizations.values_mut() {
                        if *organization_id == replaced {
                            *organization_id = destination_id;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    async fn get_org_mapping_for_service(
        &self,
        service_id: ServiceId,
    ) -> StoreResult<Option<DestinationId>> {
        Ok(self.lock().service_organizations.get(&service_id).copied())
    }

    async fn save_org_mapping_for_service(
        &self,
        service_id: ServiceId,
        organization_id: DestinationId,
    ) -> StoreResult<()> {
        self.lock()
            .service_organizations
            .insert(service_id, organization_id);
        Ok(())
    }
}

/// Serializable form of [`InMemoryIdMappingStore`]
///
/// Composite keys are flattened into entry lists since JSON objects only
/// take string keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdMappingSnapshot {
    #[serde(default)]
    pub next_id: i64,
    #[serde(default)]
    pub destination_ids: Vec<DestinationIdEntry>,
    #[serde(default)]
    pub instance_values: Vec<InstanceValueEntry>,
    #[serde(default)]
    pub instance_mappings: Vec<InstanceMappingEntry>,
    #[serde(default)]
    pub service_organizations: Vec<ServiceOrganizationEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestinationIdEntry {
    pub scope: IdScope,
    pub local_id: LocalId,
    pub destination_id: DestinationId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceValueEntry {
    pub record_type: RecordType,
    pub mapping_value: String,
    pub local_id: LocalId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceMappingEntry {
    pub record_type: RecordType,
    pub local_id: LocalId,
    pub mapped_id: LocalId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceOrganizationEntry {
    pub service_id: ServiceId,
    pub organization_id: DestinationId,
}

/// In-memory record history holding the latest version per reference
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: Mutex<HashMap<(ServiceId, Reference), Record>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with records
    pub fn with_records(records: impl IntoIterator<Item = Record>) -> Self {
        let store = Self::new();
        store.put_all(records);
        store
    }

    /// Stores a record as the current version, replacing any earlier one
    pub fn put(&self, record: Record) {
        self.lock()
            .insert((record.service_id, record.reference()), record);
    }

    pub fn put_all(&self, records: impl IntoIterator<Item = Record>) {
        let mut guard = self.lock();
        for record in records {
            guard.insert((record.service_id, record.reference()), record);
        }
    }

    /// Every stored record, ordered by service then reference
    pub fn records(&self) -> Vec<Record> {
        let mut records: Vec<Record> = self.lock().values().cloned().collect();
        records.sort_by(|a, b| {
            (a.service_id, a.reference()).cmp(&(b.service_id, b.reference()))
        });
        records
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<(ServiceId, Reference), Record>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get_current_version(
        &self,
        service_id: ServiceId,
        reference: &Reference,
    ) -> StoreResult<Lookup<Record>> {
        let lookup = match self.lock().get(&(service_id, reference.clone())) {
            None => Lookup::NotFound,
            Some(record) if record.deleted => Lookup::Deleted,
            Some(record) => Lookup::Found(record.clone()),
        };
        Ok(lookup)
    }
}

/// In-memory patient to person links
#[derive(Debug, Default)]
pub struct InMemoryPatientLinkStore {
    links: Mutex<HashMap<LocalId, LocalId>>,
}

impl InMemoryPatientLinkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Links a patient to a person, replacing any earlier link
    pub fn link(&self, patient_local_id: LocalId, person_local_id: LocalId) {
        self.links
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(patient_local_id, person_local_id);
    }

    /// Every link, ordered by patient id
    pub fn links(&self) -> Vec<(LocalId, LocalId)> {
        let mut links: Vec<_> = self
            .links
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(patient, person)| (patient.clone(), person.clone()))
            .collect();
        links.sort();
        links
    }
}

#[async_trait]
impl PatientLinkStore for InMemoryPatientLinkStore {
    async fn get_person_id(&self, patient_local_id: &LocalId) -> StoreResult<Option<LocalId>> {
        Ok(self
            .links
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(patient_local_id)
            .cloned())
    }
}

/// In-memory service directory
///
/// Counts lookups so callers can verify organization resolution is cached.
#[derive(Debug, Default)]
pub struct InMemoryServiceDirectory {
    organizations: Mutex<HashMap<ServiceId, ServiceOrganization>>,
    lookups: AtomicUsize,
}

impl InMemoryServiceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the organization owning a service
    pub fn register(&self, service_id: ServiceId, organization: ServiceOrganization) {
        self.organizations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(service_id, organization);
    }

    /// Every registration, ordered by service id
    pub fn organizations(&self) -> Vec<(ServiceId, ServiceOrganization)> {
        let mut organizations: Vec<_> = self
            .organizations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(service_id, organization)| (*service_id, organization.clone()))
            .collect();
        organizations.sort_by_key(|(service_id, _)| *service_id);
        organizations
    }

    /// Number of lookups served so far
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServiceDirectory for InMemoryServiceDirectory {
    async fn find_service_organization(
        &self,
        service_id: ServiceId,
    ) -> StoreResult<Option<ServiceOrganization>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .organizations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&service_id)
            .cloned())
    }
}
