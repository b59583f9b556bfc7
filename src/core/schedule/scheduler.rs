//! Phase scheduler
//!
//! Drives one batch through [`PHASE_ORDER`]. Each phase fans its records out
//! over the worker pool in sub-batches and the pool is drained before the
//! next phase starts. Patient resolution runs right after the
//! [`PATIENT_BARRIER`] phase has drained.

use super::phase::{PATIENT_BARRIER, PHASE_ORDER};
use super::pool::WorkerPool;
use crate::config::{PatientNotReadyPolicy, TransformConfig};
use crate::core::resolve::PatientResolution;
use crate::core::transform::{
    OutputContainer, OutputTable, RegistryEntry, TransformContext, TransformerRegistry,
    TypeTransformer,
};
use crate::domain::{BatchId, BatchStage, BatchTransformError, Record, RecordType, TransformError};
use crate::{log_phase_complete, log_phase_start};
use serde::Serialize;
use std::sync::Arc;

/// What a phase did with its records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseOutcome {
    /// Records were handed to the type's transformer
    Transformed,
    /// The registry maps the type to a no-op; records were skipped
    NoOp,
    /// The type is disabled by configuration; records were skipped
    Disabled,
    /// Patient-scoped records skipped because the patient is not known
    /// downstream yet
    Blocked,
}

impl PhaseOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseOutcome::Transformed => "transformed",
            PhaseOutcome::NoOp => "no_op",
            PhaseOutcome::Disabled => "disabled",
            PhaseOutcome::Blocked => "blocked",
        }
    }
}

/// Statistics for one phase that had records
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseStats {
    pub record_type: RecordType,
    pub records: usize,
    pub tasks: usize,
    pub outcome: PhaseOutcome,
}

/// What the scheduler did for a batch
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScheduleReport {
    pub pool_size: usize,
    pub phases: Vec<PhaseStats>,
    /// Patient resolution outcome, `None` if resolution did not run
    pub patient: Option<&'static str>,
}

impl ScheduleReport {
    /// Stats of the phase for a type, if it had records
    pub fn phase(&self, record_type: RecordType) -> Option<&PhaseStats> {
        self.phases.iter().find(|p| p.record_type == record_type)
    }

    pub fn total_tasks(&self) -> usize {
        self.phases.iter().map(|p| p.tasks).sum()
    }
}

/// Runs the phases of one batch
pub struct PhaseScheduler<'a> {
    registry: &'a TransformerRegistry,
    config: &'a TransformConfig,
}

impl<'a> PhaseScheduler<'a> {
    pub fn new(registry: &'a TransformerRegistry, config: &'a TransformConfig) -> Self {
        Self { registry, config }
    }

    /// Runs every phase of the batch held by `ctx`
    ///
    /// Every record type in the batch is checked against the registry before
    /// any phase starts, so an unknown type fails the batch before a single
    /// row is written.
    ///
    /// # Errors
    ///
    /// Returns the first worker error of the failing phase, a patient
    /// resolution failure, or [`TransformError::UnknownRecordType`].
    pub async fn run(
        &self,
        ctx: Arc<TransformContext>,
        output: Arc<OutputContainer>,
    ) -> Result<ScheduleReport, BatchTransformError> {
        let batch_id = ctx.batch_id();
        let index = ctx.index();

        for record_type in index.record_types() {
            self.registry
                .lookup(record_type)
                .map_err(|e| e.in_stage(batch_id, BatchStage::Phase(record_type)))?;
        }

        let mut pool = WorkerPool::sized_for(index.len(), self.config.max_workers);
        let mut report = ScheduleReport {
            pool_size: pool.pool_size(),
            ..ScheduleReport::default()
        };
        tracing::debug!(
            batch_id = %batch_id,
            records = index.len(),
            pool_size = pool.pool_size(),
            sub_batch_size = self.config.sub_batch_size,
            "Scheduling batch"
        );

        let mut patient_blocked = false;
        let mut last_stage = BatchStage::Indexing;

        for record_type in PHASE_ORDER {
            let records = index.records_of_type(record_type);
            if !records.is_empty() {
                last_stage = BatchStage::Phase(record_type);
                let stats = self
                    .run_phase(record_type, records, patient_blocked, &mut pool, &ctx, &output)
                    .await?;
                report.phases.push(stats);
            }

            if record_type == PATIENT_BARRIER && index.has_patient_scoped_records() {
                let resolution = ctx
                    .resolve_patient()
                    .await
                    .map_err(|e| e.in_stage(batch_id, BatchStage::PatientResolution))?;
                report.patient = Some(resolution.label());

                if let PatientResolution::NotReady { source_patient } = resolution {
                    tracing::warn!(
                        batch_id = %batch_id,
                        patient = %source_patient,
                        policy = %self.config.patient_not_ready,
                        "Patient not yet known downstream"
                    );
                    patient_blocked =
                        self.config.patient_not_ready == PatientNotReadyPolicy::SkipPatientScoped;
                }
            }
        }

        drain(&mut pool, batch_id, last_stage).await?;
        Ok(report)
    }

    async fn run_phase(
        &self,
        record_type: RecordType,
        records: Vec<Arc<Record>>,
        patient_blocked: bool,
        pool: &mut WorkerPool,
        ctx: &Arc<TransformContext>,
        output: &Arc<OutputContainer>,
    ) -> Result<PhaseStats, BatchTransformError> {
        let batch_id = ctx.batch_id();
        let stage = BatchStage::Phase(record_type);
        log_phase_start!(batch_id, record_type, records.len());

        let entry = self
            .registry
            .lookup(record_type)
            .map_err(|e| e.in_stage(batch_id, stage))?;

        let mut stats = PhaseStats {
            record_type,
            records: records.len(),
            tasks: 0,
            outcome: self.outcome_for(record_type, entry, patient_blocked),
        };

        match entry {
            RegistryEntry::Transform { table, transformer }
                if stats.outcome == PhaseOutcome::Transformed =>
            {
                let writer = output.writer(table);
                for chunk in records.chunks(self.config.sub_batch_size.max(1)) {
                    pool.submit(transform_chunk(
                        chunk.to_vec(),
                        Arc::clone(transformer),
                        Arc::clone(&writer),
                        Arc::clone(ctx),
                    ));
                    stats.tasks += 1;
                }
                drain(pool, batch_id, stage).await?;
            }
            _ => {
                for record in &records {
                    ctx.index().mark_skipped(&record.reference());
                }
            }
        }

        log_phase_complete!(
            batch_id,
            record_type,
            stats.records,
            stats.tasks,
            stats.outcome.as_str()
        );
        Ok(stats)
    }

    fn outcome_for(
        &self,
        record_type: RecordType,
        entry: &RegistryEntry,
        patient_blocked: bool,
    ) -> PhaseOutcome {
        if self.config.is_disabled(record_type) {
            PhaseOutcome::Disabled
        } else if entry.is_no_op() {
            PhaseOutcome::NoOp
        } else if patient_blocked && record_type.is_patient_scoped() {
            PhaseOutcome::Blocked
        } else {
            PhaseOutcome::Transformed
        }
    }
}

/// Worker body for one sub-batch
async fn transform_chunk(
    records: Vec<Arc<Record>>,
    transformer: Arc<dyn TypeTransformer>,
    writer: Arc<OutputTable>,
    ctx: Arc<TransformContext>,
) -> Result<(), TransformError> {
    for record in records {
        let reference = record.reference();
        if ctx.index().mark_transformed(&reference) {
            tracing::debug!(
                batch_id = %ctx.batch_id(),
                reference = %reference,
                "Record already transformed, not emitting again"
            );
            continue;
        }

        transformer
            .transform(&record, writer.as_ref(), &ctx)
            .await
            .map_err(|e| TransformError::WorkerTask {
                reference,
                source: Box::new(e),
            })?;
    }
    Ok(())
}

/// Drains the pool; logs every error and returns the first
async fn drain(
    pool: &mut WorkerPool,
    batch_id: BatchId,
    stage: BatchStage,
) -> Result<(), BatchTransformError> {
    let errors = pool.drain_and_collect_errors().await;
    let failed = errors.len();

    let mut errors = errors.into_iter();
    let Some(first) = errors.next() else {
        return Ok(());
    };

    tracing::error!(batch_id = %batch_id, stage = %stage, error = %first, "Worker task failed");
    for error in errors {
        tracing::error!(batch_id = %batch_id, stage = %stage, error = %error, "Worker task failed");
    }
    if failed > 1 {
        tracing::error!(
            batch_id = %batch_id,
            stage = %stage,
            failed,
            "Multiple worker tasks failed, reporting the first"
        );
    }

    Err(first.in_stage(batch_id, stage))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{
        InMemoryIdMappingStore, InMemoryPatientLinkStore, InMemoryRecordStore,
        InMemoryServiceDirectory,
    };
    use crate::core::index::ReferenceIndex;
    use crate::core::resolve::{IdentifierResolver, PatientResolver, VisibilityPolicy};
    use crate::domain::{Batch, ExchangeId, LocalId, ServiceId, SystemId};

    fn practitioners(service_id: ServiceId, count: usize) -> Vec<Record> {
        (0..count)
            .map(|i| {
                Record::new(
                    RecordType::Practitioner,
                    LocalId::new(format!("PR{i}")).unwrap(),
                    r#"{"name":"Dr Example"}"#,
                    service_id,
                )
            })
            .collect()
    }

    fn context_for(records: Vec<Record>, service_id: ServiceId) -> Arc<TransformContext> {
        let batch = Batch::builder()
            .service_id(service_id)
            .system_id(SystemId::random())
            .exchange_id(ExchangeId::random())
            .batch_id(BatchId::random())
            .records(records)
            .build()
            .unwrap();
        let index = Arc::new(ReferenceIndex::build(
            &batch,
            Arc::new(InMemoryRecordStore::new()),
        ));
        let identifiers = Arc::new(IdentifierResolver::new(
            Arc::new(InMemoryIdMappingStore::new()),
            Arc::new(InMemoryServiceDirectory::new()),
        ));
        let patients = Arc::new(PatientResolver::new(
            Arc::clone(&identifiers),
            Arc::new(InMemoryPatientLinkStore::new()),
            VisibilityPolicy::default(),
        ));
        Arc::new(TransformContext::new(&batch, None, index, identifiers, patients))
    }

    fn config(sub_batch_size: usize) -> TransformConfig {
        TransformConfig {
            sub_batch_size,
            ..TransformConfig::default()
        }
    }

    #[tokio::test]
    async fn test_phase_is_split_into_sub_batches() {
        let service_id = ServiceId::random();
        let ctx = context_for(practitioners(service_id, 25), service_id);
        let output = Arc::new(OutputContainer::new());
        let registry = TransformerRegistry::standard();
        let config = config(10);

        let report = PhaseScheduler::new(&registry, &config)
            .run(Arc::clone(&ctx), Arc::clone(&output))
            .await
            .unwrap();

        let phase = report.phase(RecordType::Practitioner).unwrap();
        assert_eq!(phase.tasks, 3);
        assert_eq!(phase.outcome, PhaseOutcome::Transformed);
        assert_eq!(report.pool_size, 2);
        assert_eq!(report.patient, None);
        assert_eq!(output.row_count(), 25);
        assert!(ctx.index().pending().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_type_is_skipped() {
        let service_id = ServiceId::random();
        let ctx = context_for(practitioners(service_id, 3), service_id);
        let output = Arc::new(OutputContainer::new());
        let registry = TransformerRegistry::standard();
        let config = TransformConfig {
            disabled_types: vec![RecordType::Practitioner],
            ..TransformConfig::default()
        };

        let report = PhaseScheduler::new(&registry, &config)
            .run(Arc::clone(&ctx), Arc::clone(&output))
            .await
            .unwrap();

        assert_eq!(
            report.phase(RecordType::Practitioner).unwrap().outcome,
            PhaseOutcome::Disabled
        );
        assert_eq!(output.row_count(), 0);
        let completeness = ctx.index().check_completeness().unwrap();
        assert_eq!(completeness.skipped, 3);
    }

    #[tokio::test]
    async fn test_unknown_type_fails_before_any_phase() {
        let service_id = ServiceId::random();
        let mut records = practitioners(service_id, 2);
        records.push(Record::new(
            RecordType::Composition,
            LocalId::new("C1").unwrap(),
            "{}",
            service_id,
        ));
        let ctx = context_for(records, service_id);
        let output = Arc::new(OutputContainer::new());
        let registry = TransformerRegistry::standard();
        let config = config(10);

        let err = PhaseScheduler::new(&registry, &config)
            .run(Arc::clone(&ctx), Arc::clone(&output))
            .await
            .unwrap_err();

        assert_eq!(err.stage, BatchStage::Phase(RecordType::Composition));
        assert!(matches!(
            err.source,
            TransformError::UnknownRecordType(RecordType::Composition)
        ));
        assert_eq!(output.row_count(), 0);
    }

    #[test]
    fn test_phase_outcome_labels() {
        assert_eq!(PhaseOutcome::Transformed.as_str(), "transformed");
        assert_eq!(PhaseOutcome::Blocked.as_str(), "blocked");
    }
}
