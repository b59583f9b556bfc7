//! Collaborator integrations for Conduit.
//!
//! The orchestrator depends on its durable stores and output destination only
//! through the traits in [`traits`]:
//!
//! - [`IdMappingStore`] - destination id allocation and instance mappings
//! - [`RecordStore`] - latest persisted version of a record
//! - [`PatientLinkStore`] - patient to person links
//! - [`ServiceDirectory`] - organization owning a publishing service
//! - [`OutputSink`] - destination for finalized batch output
//!
//! # Implementations
//!
//! - [`memory`] - thread-safe in-memory stores, used by tests
//! - [`local`] - JSON state file and JSON-lines output for the CLI
//!
//! ```rust
//! use conduit::adapters::memory::InMemoryIdMappingStore;
//! use conduit::adapters::IdMappingStore;
//! use conduit::domain::{IdScope, LocalId, RecordType};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = InMemoryIdMappingStore::new();
//! let id = store
//!     .find_or_create_destination_id(
//!         IdScope::Record(RecordType::Patient),
//!         &LocalId::new("P1")?,
//!     )
//!     .await?;
//! assert_eq!(id.value(), 1);
//! # Ok(())
//! # }
//! ```

pub mod local;
pub mod memory;
pub mod traits;

pub use traits::{
    IdMappingStore, OutputSink, PatientLinkStore, RecordStore, ServiceDirectory,
    ServiceOrganization, StoreResult,
};
