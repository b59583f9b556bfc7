//! Batch and run summaries
//!
//! This module defines structures for tracking and reporting transform results.

use crate::core::index::AddedRecord;
use crate::core::schedule::ScheduleReport;
use crate::core::verification::{CompletenessReport, TypeCounts};
use crate::domain::{BatchId, DestinationId, RecordType, ServiceId};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Summary of one successfully transformed batch
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub batch_id: BatchId,
    pub service_id: ServiceId,

    /// Records in the index, including records added by the orchestrator
    pub records: usize,
    pub transformed: usize,
    pub skipped: usize,
    pub by_type: BTreeMap<RecordType, TypeCounts>,

    /// Output rows across all tables
    pub rows: usize,
    pub tables: usize,

    /// Destination id of the owning organization, if resolved
    pub organization_id: Option<DestinationId>,

    /// Patient resolution outcome, if it ran
    pub patient: Option<&'static str>,

    pub pool_size: usize,
    pub tasks: usize,

    /// Records added to the batch that were not delivered with it
    pub added_records: Vec<AddedRecord>,

    pub duration: Duration,
}

impl BatchSummary {
    pub(crate) fn new(
        batch_id: BatchId,
        service_id: ServiceId,
        completeness: &CompletenessReport,
        schedule: &ScheduleReport,
        organization_id: Option<DestinationId>,
    ) -> Self {
        Self {
            batch_id,
            service_id,
            records: completeness.total,
            transformed: completeness.transformed,
            skipped: completeness.skipped,
            by_type: completeness.by_type.clone(),
            rows: 0,
            tables: 0,
            organization_id,
            patient: schedule.patient,
            pool_size: schedule.pool_size,
            tasks: schedule.total_tasks(),
            added_records: Vec::new(),
            duration: Duration::ZERO,
        }
    }

    /// Counts for one type, zero when the batch had none
    pub fn counts_for(&self, record_type: RecordType) -> TypeCounts {
        self.by_type.get(&record_type).copied().unwrap_or_default()
    }

    /// Log the summary
    pub fn log_summary(&self) {
        tracing::info!(
            batch_id = %self.batch_id,
            service_id = %self.service_id,
            records = self.records,
            transformed = self.transformed,
            skipped = self.skipped,
            rows = self.rows,
            tables = self.tables,
            organization_id = ?self.organization_id.map(|id| id.value()),
            patient = self.patient.unwrap_or("not_resolved"),
            pool_size = self.pool_size,
            tasks = self.tasks,
            duration_ms = self.duration.as_millis() as u64,
            "Batch summary"
        );

        for (record_type, counts) in &self.by_type {
            tracing::debug!(
                batch_id = %self.batch_id,
                record_type = %record_type,
                transformed = counts.transformed,
                skipped = counts.skipped,
                "Record type summary"
            );
        }

        for added in &self.added_records {
            tracing::info!(
                batch_id = %self.batch_id,
                reference = %added.reference,
                reason = %added.reason,
                "Record added to batch"
            );
        }
    }
}

/// A batch that could not be transformed or written
#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    /// Where the batch came from, e.g. its file path
    pub source: String,
    pub message: String,
}

/// Summary of a CLI run over several batches
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub batches_processed: usize,
    pub records: usize,
    pub transformed: usize,
    pub skipped: usize,
    pub rows_written: usize,
    pub records_added: usize,
    pub failures: Vec<BatchFailure>,

    /// Set when a shutdown signal stopped the run early
    pub interrupted: bool,
    pub duration: Duration,
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the duration
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Adds a successfully written batch
    pub fn add_batch(&mut self, summary: &BatchSummary, rows_written: usize) {
        self.batches_processed += 1;
        self.records += summary.records;
        self.transformed += summary.transformed;
        self.skipped += summary.skipped;
        self.rows_written += rows_written;
        self.records_added += summary.added_records.len();
    }

    /// Adds a failed batch
    pub fn add_failure(&mut self, source: impl Into<String>, message: impl Into<String>) {
        self.failures.push(BatchFailure {
            source: source.into(),
            message: message.into(),
        });
    }

    /// Check if the run was successful (no failures)
    pub fn is_successful(&self) -> bool {
        self.failures.is_empty()
    }

    /// Log the summary
    pub fn log_summary(&self) {
        tracing::info!(
            batches = self.batches_processed,
            failed = self.failures.len(),
            records = self.records,
            transformed = self.transformed,
            skipped = self.skipped,
            rows_written = self.rows_written,
            records_added = self.records_added,
            interrupted = self.interrupted,
            duration_secs = self.duration.as_secs(),
            "Transform run completed"
        );

        for failure in &self.failures {
            tracing::warn!(source = %failure.source, message = %failure.message, "Batch failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completeness() -> CompletenessReport {
        let mut report = CompletenessReport::new();
        report.record_transformed(RecordType::Patient);
        report.record_transformed(RecordType::Observation);
        report.record_skipped(RecordType::Slot);
        report
    }

    #[test]
    fn test_batch_summary_from_reports() {
        let schedule = ScheduleReport {
            pool_size: 1,
            phases: Vec::new(),
            patient: Some("resolved"),
        };
        let summary = BatchSummary::new(
            BatchId::random(),
            ServiceId::random(),
            &completeness(),
            &schedule,
            Some(DestinationId::new(7)),
        );

        assert_eq!(summary.records, 3);
        assert_eq!(summary.transformed, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.counts_for(RecordType::Slot).skipped, 1);
        assert_eq!(summary.counts_for(RecordType::Flag).total(), 0);
        assert_eq!(summary.patient, Some("resolved"));
    }

    #[test]
    fn test_run_summary_accumulates() {
        let schedule = ScheduleReport::default();
        let batch = BatchSummary::new(
            BatchId::random(),
            ServiceId::random(),
            &completeness(),
            &schedule,
            None,
        );

        let mut run = RunSummary::new();
        run.add_batch(&batch, 2);
        run.add_batch(&batch, 2);
        assert_eq!(run.batches_processed, 2);
        assert_eq!(run.records, 6);
        assert_eq!(run.rows_written, 4);
        assert!(run.is_successful());

        run.add_failure("batch-3.json", "unknown record type");
        assert!(!run.is_successful());
    }

    #[test]
    fn test_run_summary_with_duration() {
        let run = RunSummary::new().with_duration(Duration::from_secs(3));
        assert_eq!(run.duration, Duration::from_secs(3));
    }
}
