//! Batch orchestration
//!
//! - [`orchestrator`] - transforms one batch end to end
//! - [`summary`] - per-batch and per-run summaries

pub mod orchestrator;
pub mod summary;

pub use orchestrator::{BatchOrchestrator, BatchOutcome, Collaborators};
pub use summary::{BatchFailure, BatchSummary, RunSummary};
