//! Per-batch reference index and transform state

pub mod reference_index;

pub use reference_index::{AddedRecord, ReferenceIndex};
