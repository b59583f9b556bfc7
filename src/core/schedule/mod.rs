//! Phase scheduling
//!
//! - [`phase`] - the fixed phase order and the patient barrier
//! - [`pool`] - the bounded worker pool drained at every phase transition
//! - [`scheduler`] - runs a batch's phases through the pool

pub mod phase;
pub mod pool;
pub mod scheduler;

pub use phase::{is_after_barrier, phase_position, PATIENT_BARRIER, PHASE_ORDER};
pub use pool::{pool_size, WorkerPool};
pub use scheduler::{PhaseOutcome, PhaseScheduler, PhaseStats, ScheduleReport};
