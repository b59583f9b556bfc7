//! Completeness report structures
//!
//! This module defines the report produced when a batch passes its
//! completeness check.

use crate::domain::RecordType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-type tally of how records were accounted for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeCounts {
    pub transformed: usize,
    pub skipped: usize,
}

impl TypeCounts {
    pub fn total(&self) -> usize {
        self.transformed + self.skipped
    }
}

/// Proof that every indexed record was transformed or skipped
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletenessReport {
    /// When the check ran
    pub checked_at: DateTime<Utc>,

    /// Number of records in the index
    pub total: usize,

    /// Records that were transformed
    pub transformed: usize,

    /// Records that were deliberately skipped
    pub skipped: usize,

    /// Breakdown by record type
    pub by_type: BTreeMap<RecordType, TypeCounts>,
}

impl CompletenessReport {
    pub fn new() -> Self {
        Self {
            checked_at: Utc::now(),
            total: 0,
            transformed: 0,
            skipped: 0,
            by_type: BTreeMap::new(),
        }
    }

    pub fn record_transformed(&mut self, record_type: RecordType) {
        self.total += 1;
        self.transformed += 1;
        self.by_type.entry(record_type).or_default().transformed += 1;
    }

    pub fn record_skipped(&mut self, record_type: RecordType) {
        self.total += 1;
        self.skipped += 1;
        self.by_type.entry(record_type).or_default().skipped += 1;
    }

    /// Counts for one type, zero when the batch had none
    pub fn counts_for(&self, record_type: RecordType) -> TypeCounts {
        self.by_type.get(&record_type).copied().unwrap_or_default()
    }

    /// Format the report as a human-readable string
    pub fn format_summary(&self) -> String {
        let mut summary = String::new();
        summary.push_str("Completeness Report\n");
        summary.push_str(&format!("  Checked at: {}\n", self.checked_at));
        summary.push_str(&format!("  Total records: {}\n", self.total));
        summary.push_str(&format!("  Transformed: {}\n", self.transformed));
        summary.push_str(&format!("  Skipped: {}\n", self.skipped));

        for (record_type, counts) in &self.by_type {
            summary.push_str(&format!(
                "    {record_type}: {} transformed, {} skipped\n",
                counts.transformed, counts.skipped
            ));
        }

        summary
    }
}

impl Default for CompletenessReport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_new() {
        let report = CompletenessReport::new();
        assert_eq!(report.total, 0);
        assert!(report.by_type.is_empty());
    }

    #[test]
    fn test_report_counts() {
        let mut report = CompletenessReport::new();
        report.record_transformed(RecordType::Appointment);
        report.record_skipped(RecordType::Slot);
        report.record_skipped(RecordType::Slot);

        assert_eq!(report.total, 3);
        assert_eq!(report.transformed, 1);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.counts_for(RecordType::Slot).skipped, 2);
        assert_eq!(report.counts_for(RecordType::Patient), TypeCounts::default());
    }

    #[test]
    fn test_format_summary() {
        let mut report = CompletenessReport::new();
        report.record_transformed(RecordType::Condition);

        let summary = report.format_summary();
        assert!(summary.contains("Total records: 1"));
        assert!(summary.contains("Condition: 1 transformed, 0 skipped"));
    }
}
