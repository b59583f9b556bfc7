//! Core business logic for Conduit.
//!
//! This module contains the batch transformation orchestrator.
//!
//! # Modules
//!
//! - [`batch`] - Batch orchestration and summaries
//! - [`index`] - Per-batch reference index and transform state
//! - [`resolve`] - Identifier, organization and patient resolution
//! - [`schedule`] - Phase order, worker pool and phase scheduler
//! - [`transform`] - Transformer registry, context and output tables
//! - [`verification`] - Completeness check
//!
//! # Batch Workflow
//!
//! 1. **Index**: Key every record by `Type/local-id`
//! 2. **Organization**: Resolve the service's owning organization and pull its
//!    record into the batch
//! 3. **Phases**: Transform each record type in a fixed order, draining the
//!    worker pool between phases
//! 4. **Patient barrier**: Resolve patient and person ids after the Patient
//!    phase
//! 5. **Completeness**: Fail the batch if any record was neither transformed
//!    nor skipped
//! 6. **Output**: Finalize the rows for the writer
//!
//! # Example
//!
//! ```rust,no_run
//! use conduit::adapters::local::{load_batch_file, LocalState, LocalStores};
//! use conduit::config::load_config;
//! use conduit::core::batch::BatchOrchestrator;
//! use conduit::core::transform::TransformerRegistry;
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("conduit.toml")?;
//! let stores = LocalStores::from_state(LocalState::load(Path::new(&config.state.path)).await?);
//!
//! let orchestrator = BatchOrchestrator::new(
//!     &config,
//!     TransformerRegistry::standard(),
//!     stores.collaborators(),
//! );
//!
//! let batch = load_batch_file(Path::new("batch.json")).await?;
//! let outcome = orchestrator.transform_batch(&batch).await?;
//!
//! println!("Transformed: {}", outcome.summary.transformed);
//! println!("Rows: {}", outcome.summary.rows);
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod index;
pub mod resolve;
pub mod schedule;
pub mod transform;
pub mod verification;
