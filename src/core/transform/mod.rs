//! Record transformation
//!
//! This module turns canonical records into destination table rows:
//!
//! - [`registry`] - record type to transformer lookup
//! - [`context`] - per-batch state handed to transformers
//! - [`output`] - table writers and the per-batch output container
//! - [`generic`] - the transformer used by the standard registry

pub mod context;
pub mod generic;
pub mod output;
pub mod registry;

pub use context::TransformContext;
pub use generic::GenericTransformer;
pub use output::{OutputBatch, OutputContainer, OutputRow, OutputTable, RowAction, TableWriter};
pub use registry::{table_name, RegistryEntry, TransformerRegistry, TypeTransformer};
