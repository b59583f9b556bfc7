//! Batch orchestrator - control flow for one batch
//!
//! Builds the reference index, resolves the owning organization, runs the
//! phases, certifies completeness and finalizes the output. The resolvers are
//! created once and shared by every batch this orchestrator handles, so the
//! per-service organization cache lives for the whole process.

use super::summary::BatchSummary;
use crate::adapters::{IdMappingStore, OutputSink, PatientLinkStore, RecordStore, ServiceDirectory};
use crate::config::{ConduitConfig, TransformConfig};
use crate::core::index::ReferenceIndex;
use crate::core::resolve::{IdentifierResolver, PatientResolver, VisibilityPolicy};
use crate::core::schedule::PhaseScheduler;
use crate::core::transform::{OutputBatch, OutputContainer, TransformContext, TransformerRegistry};
use crate::domain::{Batch, BatchStage, BatchTransformError, TransformError};
use crate::log_batch_complete;
use std::sync::Arc;
use std::time::Instant;

/// External collaborators the orchestrator depends on
#[derive(Clone)]
pub struct Collaborators {
    pub id_mappings: Arc<dyn IdMappingStore>,
    pub records: Arc<dyn RecordStore>,
    pub patient_links: Arc<dyn PatientLinkStore>,
    pub directory: Arc<dyn ServiceDirectory>,
}

/// Result of transforming one batch
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub output: OutputBatch,
    pub summary: BatchSummary,
}

/// Transforms batches into destination rows
pub struct BatchOrchestrator {
    transform: TransformConfig,
    registry: TransformerRegistry,
    records: Arc<dyn RecordStore>,
    identifiers: Arc<IdentifierResolver>,
    patients: Arc<PatientResolver>,
}

impl BatchOrchestrator {
    /// Create a new orchestrator
    pub fn new(
        config: &ConduitConfig,
        registry: TransformerRegistry,
        collaborators: Collaborators,
    ) -> Self {
        let identifiers = Arc::new(IdentifierResolver::new(
            collaborators.id_mappings,
            collaborators.directory,
        ));
        let patients = Arc::new(PatientResolver::new(
            Arc::clone(&identifiers),
            collaborators.patient_links,
            VisibilityPolicy::from(&config.patient),
        ));

        Self {
            transform: config.transform.clone(),
            registry,
            records: collaborators.records,
            identifiers,
            patients,
        }
    }

    pub fn identifiers(&self) -> &Arc<IdentifierResolver> {
        &self.identifiers
    }

    /// Transforms one batch
    ///
    /// Either every record of the batch ends up transformed or skipped and
    /// the output is returned, or the batch fails as a whole and the caller
    /// redelivers it later.
    ///
    /// # Errors
    ///
    /// Returns a [`BatchTransformError`] naming the stage that failed.
    pub async fn transform_batch(&self, batch: &Batch) -> Result<BatchOutcome, BatchTransformError> {
        let started = Instant::now();
        let batch_id = batch.batch_id;

        tracing::info!(
            batch_id = %batch_id,
            service_id = %batch.service_id,
            exchange_id = %batch.exchange_id,
            records = batch.records.len(),
            "Transforming batch"
        );

        let index = Arc::new(ReferenceIndex::build(batch, Arc::clone(&self.records)));

        let organization_id = self
            .identifiers
            .resolve_organization_for_service(&index)
            .await
            .map_err(|e| e.in_stage(batch_id, BatchStage::Organization))?;

        let ctx = Arc::new(TransformContext::new(
            batch,
            organization_id,
            Arc::clone(&index),
            Arc::clone(&self.identifiers),
            Arc::clone(&self.patients),
        ));
        let container = Arc::new(OutputContainer::new());

        let schedule = PhaseScheduler::new(&self.registry, &self.transform)
            .run(ctx, Arc::clone(&container))
            .await?;

        let completeness = index
            .check_completeness()
            .map_err(|e| e.in_stage(batch_id, BatchStage::Completeness))?;

        let output = container.finalize(batch_id);

        let mut summary = BatchSummary::new(
            batch_id,
            batch.service_id,
            &completeness,
            &schedule,
            organization_id,
        );
        summary.rows = output.row_count();
        summary.tables = output.tables.len();
        summary.added_records = index.added_records();
        summary.duration = started.elapsed();

        log_batch_complete!(
            batch_id,
            summary.records,
            summary.transformed,
            summary.skipped,
            summary.duration
        );

        Ok(BatchOutcome { output, summary })
    }

    /// Transforms one batch and hands its output to a sink
    ///
    /// Nothing reaches the sink unless the whole batch transformed.
    ///
    /// # Returns
    ///
    /// The outcome and the number of rows the sink wrote.
    ///
    /// # Errors
    ///
    /// Returns a [`BatchTransformError`] if the transform or the write fails.
    pub async fn publish_batch(
        &self,
        batch: &Batch,
        sink: &dyn OutputSink,
    ) -> Result<(BatchOutcome, usize), BatchTransformError> {
        let outcome = self.transform_batch(batch).await?;

        let written = sink.write_batch(&outcome.output).await.map_err(|e| {
            TransformError::Output(e.to_string()).in_stage(batch.batch_id, BatchStage::Output)
        })?;

        Ok((outcome, written))
    }
}

impl std::fmt::Debug for BatchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchOrchestrator")
            .field("transform", &self.transform)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
