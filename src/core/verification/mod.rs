//! Completeness verification for transformed batches
//!
//! This module certifies that every record of a batch was either transformed
//! or deliberately skipped before the batch output is finalized.

pub mod completeness;
pub mod report;

pub use completeness::{check_completeness, PENDING_SAMPLE_LIMIT};
pub use report::{CompletenessReport, TypeCounts};
