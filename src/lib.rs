// Conduit - Clinical Record Batch Transformer
// Copyright (c) 2025 Conduit Contributors
// Licensed under the MIT License

//! # Conduit - Clinical Record Batch Transformer
//!
//! Conduit turns batches of heterogeneous clinical records (organizations,
//! practitioners, patients, encounters, observations, medications and more)
//! into rows of a relational subscriber schema.
//!
//! ## Overview
//!
//! The heart of the library is the batch orchestrator, which:
//! - **Orders** work by record type so every type only depends on types
//!   transformed before it
//! - **Fans out** each type's records over a bounded worker pool
//! - **Resolves** organization, patient and person identifiers once per batch
//! - **Certifies** that every record was transformed or deliberately skipped
//!
//! ## Architecture
//!
//! Conduit follows a layered architecture:
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Business logic (index, resolvers, scheduler, orchestrator)
//! - [`adapters`] - External collaborators (id mappings, record history,
//!   output sinks)
//! - [`domain`] - Core domain types and models
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging and observability
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use conduit::adapters::local::{load_batch_file, JsonLinesSink, LocalStores};
//! use conduit::config::ConduitConfig;
//! use conduit::core::batch::BatchOrchestrator;
//! use conduit::core::transform::TransformerRegistry;
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConduitConfig::default();
//!     let stores = LocalStores::from_state(Default::default());
//!     let orchestrator = BatchOrchestrator::new(
//!         &config,
//!         TransformerRegistry::standard(),
//!         stores.collaborators(),
//!     );
//!
//!     let batch = load_batch_file(Path::new("batch.json")).await?;
//!     let sink = JsonLinesSink::new("./output", false);
//!     let (outcome, written) = orchestrator.publish_batch(&batch, &sink).await?;
//!
//!     println!("Transformed {} records into {written} rows", outcome.summary.transformed);
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! A batch either completes or fails as a whole with a
//! [`domain::BatchTransformError`] naming the stage that failed. The caller
//! redelivers failed batches; partial output is never written.
//!
//! ## Logging
//!
//! Conduit uses structured logging with the `tracing` crate. Every event
//! carries the `batch_id`, and phase events carry the `record_type`.

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
