//! Completeness check
//!
//! The final gate of every batch: each indexed record must have been either
//! transformed or skipped. Anything left pending fails the batch.

use super::report::CompletenessReport;
use crate::domain::{Reference, TransformError};
use std::collections::HashSet;

/// Number of pending references named in a violation
pub const PENDING_SAMPLE_LIMIT: usize = 10;

/// Checks that every reference is accounted for
///
/// # Arguments
///
/// * `references` - Every indexed reference, in index order
/// * `transformed` - References marked transformed
/// * `skipped` - References marked skipped
///
/// # Errors
///
/// Returns [`TransformError::CompletenessViolation`] with the pending count
/// and up to the first [`PENDING_SAMPLE_LIMIT`] pending references.
pub fn check_completeness<'a>(
    references: impl IntoIterator<Item = &'a Reference>,
    transformed: &HashSet<Reference>,
    skipped: &HashSet<Reference>,
) -> Result<CompletenessReport, TransformError> {
    let mut report = CompletenessReport::new();
    let mut pending = 0usize;
    let mut sample = Vec::new();

    for reference in references {
        if transformed.contains(reference) {
            report.record_transformed(reference.record_type);
        } else if skipped.contains(reference) {
            report.record_skipped(reference.record_type);
        } else {
            pending += 1;
            if sample.len() < PENDING_SAMPLE_LIMIT {
                sample.push(reference.clone());
            }
        }
    }

    if pending > 0 {
        return Err(TransformError::CompletenessViolation { pending, sample });
    }

    Ok(report)
}
