//! Integration tests for concurrent batch processing
//!
//! These tests verify that:
//! - Concurrent marking of one reference lets exactly one caller through
//! - No task of a later phase starts before the earlier phase drained
//! - Concurrent destination id allocation is stable

use async_trait::async_trait;
use conduit::adapters::memory::{
    InMemoryIdMappingStore, InMemoryPatientLinkStore, InMemoryRecordStore,
    InMemoryServiceDirectory,
};
use conduit::adapters::IdMappingStore;
use conduit::config::{ConduitConfig, TransformConfig};
use conduit::core::batch::{BatchOrchestrator, Collaborators};
use conduit::core::index::ReferenceIndex;
use conduit::core::schedule::PHASE_ORDER;
use conduit::core::transform::{TableWriter, TransformContext, TransformerRegistry, TypeTransformer};
use conduit::domain::{
    Batch, BatchId, ExchangeId, IdScope, LocalId, Record, RecordType, Reference, ServiceId,
    SystemId, TransformError,
};
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn local(id: &str) -> LocalId {
    LocalId::new(id).unwrap()
}

fn batch(service_id: ServiceId, records: Vec<Record>) -> Batch {
    Batch::builder()
        .service_id(service_id)
        .system_id(SystemId::random())
        .exchange_id(ExchangeId::random())
        .batch_id(BatchId::random())
        .records(records)
        .build()
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_mark_transformed_admits_one_caller() {
    let service_id = ServiceId::random();
    let reference = Reference::new(RecordType::Encounter, local("E1"));
    let index = Arc::new(ReferenceIndex::build(
        &batch(
            service_id,
            vec![Record::new(RecordType::Encounter, local("E1"), "{}", service_id)],
        ),
        Arc::new(InMemoryRecordStore::new()),
    ));

    for _ in 0..20 {
        let index = Arc::new(ReferenceIndex::build(
            &batch(service_id, vec![]),
            Arc::new(InMemoryRecordStore::new()),
        ));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let index = Arc::clone(&index);
                let reference = reference.clone();
                tokio::spawn(async move { index.mark_transformed(&reference) })
            })
            .collect();

        let mut first_callers = 0;
        for handle in handles {
            if !handle.await.unwrap() {
                first_callers += 1;
            }
        }
        assert_eq!(first_callers, 1);
    }

    assert!(!index.mark_transformed(&reference));
    assert!(index.mark_transformed(&reference));
}

/// Records start and end ticks of every transform
#[derive(Default)]
struct SpanRecorder {
    clock: AtomicUsize,
    spans: Mutex<Vec<(RecordType, usize, usize)>>,
}

#[async_trait]
impl TypeTransformer for SpanRecorder {
    async fn transform(
        &self,
        record: &Record,
        writer: &dyn TableWriter,
        ctx: &TransformContext,
    ) -> Result<(), TransformError> {
        let start = self.clock.fetch_add(1, Ordering::SeqCst);
        let id = ctx.destination_id(&record.reference()).await?;
        tokio::time::sleep(Duration::from_millis(1)).await;
        writer.upsert(id, serde_json::Map::new());
        let end = self.clock.fetch_add(1, Ordering::SeqCst);
        self.spans
            .lock()
            .unwrap()
            .push((record.record_type, start, end));
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_phases_never_overlap() {
    let service_id = ServiceId::random();
    let types = [
        RecordType::Location,
        RecordType::Practitioner,
        RecordType::Patient,
        RecordType::Encounter,
        RecordType::Condition,
        RecordType::Observation,
    ];
    let recorder = Arc::new(SpanRecorder::default());
    let registry = types.iter().fold(TransformerRegistry::standard(), |registry, t| {
        registry.with_transformer(*t, t.as_str().to_lowercase(), recorder.clone())
    });

    let mut records = Vec::new();
    for record_type in types {
        let count = if record_type == RecordType::Patient { 1 } else { 15 };
        for i in 0..count {
            let payload = match record_type {
                RecordType::Encounter | RecordType::Condition => {
                    json!({"patient": {"reference": "Patient/P0"}})
                }
                RecordType::Observation => json!({"subject": {"reference": "Patient/P0"}}),
                _ => json!({}),
            };
            let prefix = &record_type.as_str()[..1];
            records.push(Record::from_json(
                record_type,
                local(&format!("{prefix}{i}")),
                &payload,
                service_id,
            ));
        }
    }

    let config = ConduitConfig {
        transform: TransformConfig {
            sub_batch_size: 4,
            ..Default::default()
        },
        ..Default::default()
    };
    let orchestrator = BatchOrchestrator::new(
        &config,
        registry,
        Collaborators {
            id_mappings: Arc::new(InMemoryIdMappingStore::new()),
            records: Arc::new(InMemoryRecordStore::new()),
            patient_links: Arc::new(InMemoryPatientLinkStore::new()),
            directory: Arc::new(InMemoryServiceDirectory::new()),
        },
    );

    let outcome = orchestrator
        .transform_batch(&batch(service_id, records))
        .await
        .unwrap();
    assert_eq!(outcome.summary.transformed, 76);
    assert_eq!(outcome.summary.pool_size, 7);

    let spans = recorder.spans.lock().unwrap().clone();
    let ordered: Vec<RecordType> = PHASE_ORDER
        .iter()
        .copied()
        .filter(|t| types.contains(t))
        .collect();
    for pair in ordered.windows(2) {
        let last_end = spans
            .iter()
            .filter(|(t, _, _)| *t == pair[0])
            .map(|(_, _, end)| *end)
            .max()
            .unwrap();
        let first_start = spans
            .iter()
            .filter(|(t, _, _)| *t == pair[1])
            .map(|(_, start, _)| *start)
            .min()
            .unwrap();
        assert!(
            last_end < first_start,
            "{} overlapped {}",
            pair[0],
            pair[1]
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_allocation_is_stable() {
    let store = Arc::new(InMemoryIdMappingStore::new());

    let handles: Vec<_> = (0..32)
        .map(|i| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .find_or_create_destination_id(
                        IdScope::Record(RecordType::Practitioner),
                        &local(&format!("PR{}", i % 4)),
                    )
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut ids = HashSet::new();
    for handle in handles {
        ids.insert(handle.await.unwrap());
    }

    assert_eq!(ids.len(), 4);
    assert_eq!(store.allocated_count(), 4);
}
