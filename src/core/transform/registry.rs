//! Type transformer registry
//!
//! A static map from record type to how its records are transformed. Types
//! folded into another type's output map to [`RegistryEntry::NoOp`]; types
//! absent from the map are an error, never a silent fallthrough.

use super::context::TransformContext;
use super::generic::GenericTransformer;
use super::output::TableWriter;
use crate::domain::{Record, RecordType, TransformError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Per-type mapping from a canonical record to destination rows
#[async_trait]
pub trait TypeTransformer: Send + Sync {
    /// Emits zero or more rows for one record
    ///
    /// May run concurrently with other records of the same type. Must only
    /// look up destination ids of types transformed in earlier phases.
    async fn transform(
        &self,
        record: &Record,
        writer: &dyn TableWriter,
        ctx: &TransformContext,
    ) -> Result<(), TransformError>;
}

/// What the registry holds for one record type
#[derive(Clone)]
pub enum RegistryEntry {
    Transform {
        table: String,
        transformer: Arc<dyn TypeTransformer>,
    },
    /// Records are accounted for as skipped
    NoOp,
}

impl RegistryEntry {
    pub fn is_no_op(&self) -> bool {
        matches!(self, RegistryEntry::NoOp)
    }
}

impl std::fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryEntry::Transform { table, .. } => {
                f.debug_struct("Transform").field("table", table).finish()
            }
            RegistryEntry::NoOp => f.write_str("NoOp"),
        }
    }
}

/// Lookup from record type to registry entry
#[derive(Debug, Clone, Default)]
pub struct TransformerRegistry {
    entries: HashMap<RecordType, RegistryEntry>,
}

impl TransformerRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry used in production
    ///
    /// Every phase type gets a [`GenericTransformer`] writing to its
    /// snake_case table, except Slot and QuestionnaireResponse which are
    /// folded into other output. Composition is deliberately unregistered.
    pub fn standard() -> Self {
        let generic: Arc<dyn TypeTransformer> = Arc::new(GenericTransformer::new());
        let mut registry = Self::new();

        for record_type in RecordType::ALL {
            match record_type {
                RecordType::Slot | RecordType::QuestionnaireResponse => {
                    registry = registry.with_no_op(record_type);
                }
                RecordType::Composition => {}
                _ => {
                    registry = registry.with_transformer(
                        record_type,
                        table_name(record_type),
                        generic.clone(),
                    );
                }
            }
        }

        registry
    }

    /// Registers a transformer for a type, replacing any earlier entry
    pub fn with_transformer(
        mut self,
        record_type: RecordType,
        table: impl Into<String>,
        transformer: Arc<dyn TypeTransformer>,
    ) -> Self {
        self.entries.insert(
            record_type,
            RegistryEntry::Transform {
                table: table.into(),
                transformer,
            },
        );
        self
    }

    /// Registers a type whose records are skipped
    pub fn with_no_op(mut self, record_type: RecordType) -> Self {
        self.entries.insert(record_type, RegistryEntry::NoOp);
        self
    }

    /// Removes a type entirely
    pub fn without(mut self, record_type: RecordType) -> Self {
        self.entries.remove(&record_type);
        self
    }

    /// Looks up the entry for a type
    ///
    /// # Errors
    ///
    /// Returns [`TransformError::UnknownRecordType`] if the type has no entry,
    /// not even a no-op.
    pub fn lookup(&self, record_type: RecordType) -> Result<&RegistryEntry, TransformError> {
        self.entries
            .get(&record_type)
            .ok_or(TransformError::UnknownRecordType(record_type))
    }

    pub fn contains(&self, record_type: RecordType) -> bool {
        self.entries.contains_key(&record_type)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Destination table for a record type, e.g. `medication_statement`
pub fn table_name(record_type: RecordType) -> String {
    let mut table = String::new();
    for (i, c) in record_type.as_str().chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                table.push('_');
            }
            table.push(c.to_ascii_lowercase());
        } else {
            table.push(c);
        }
    }
    table
}
