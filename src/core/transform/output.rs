//! Destination table writers and the per-batch output container
//!
//! Transformers append rows through the [`TableWriter`] contract. Rows are
//! buffered in memory per table and only handed to an
//! [`OutputSink`](crate::adapters::OutputSink) once the whole batch has
//! succeeded, so a failed batch never produces a partial output unit.

use crate::domain::{BatchId, DestinationId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// What a row asks the destination to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowAction {
    Upsert,
    Delete,
}

/// One row destined for an output table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRow {
    pub action: RowAction,
    pub id: DestinationId,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub fields: Map<String, Value>,
}

/// Append-only writer for one destination table
///
/// Implementations must tolerate concurrent calls from every worker of a
/// phase. Upserts are idempotent by id on the destination side.
pub trait TableWriter: Send + Sync {
    /// Name of the destination table
    fn table_name(&self) -> &str;

    /// Inserts or replaces the row with this id
    fn upsert(&self, id: DestinationId, fields: Map<String, Value>);

    /// Removes the row with this id
    fn delete(&self, id: DestinationId);
}

/// In-memory buffer for one output table
#[derive(Debug)]
pub struct OutputTable {
    name: String,
    rows: Mutex<Vec<OutputRow>>,
}

impl OutputTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: Mutex::new(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, row: OutputRow) {
        self.rows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(row);
    }

    fn take_rows(&self) -> Vec<OutputRow> {
        std::mem::take(&mut *self.rows.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl TableWriter for OutputTable {
    fn table_name(&self) -> &str {
        &self.name
    }

    fn upsert(&self, id: DestinationId, fields: Map<String, Value>) {
        self.push(OutputRow {
            action: RowAction::Upsert,
            id,
            fields,
        });
    }

    fn delete(&self, id: DestinationId) {
        self.push(OutputRow {
            action: RowAction::Delete,
            id,
            fields: Map::new(),
        });
    }
}

/// Every output table touched by one batch
#[derive(Debug, Default)]
pub struct OutputContainer {
    tables: RwLock<BTreeMap<String, Arc<OutputTable>>>,
}

impl OutputContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the writer for a table, creating it on first use
    pub fn writer(&self, table: &str) -> Arc<OutputTable> {
        if let Some(existing) = self
            .tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(table)
        {
            return existing.clone();
        }

        self.tables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(table.to_string())
            .or_insert_with(|| Arc::new(OutputTable::new(table)))
            .clone()
    }

    /// Total rows buffered across all tables
    pub fn row_count(&self) -> usize {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|table| table.len())
            .sum()
    }

    /// Drains the buffered rows into a transport unit
    ///
    /// Tables that never received a row are omitted.
    pub fn finalize(&self, batch_id: BatchId) -> OutputBatch {
        let tables = self
            .tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, table)| (name.clone(), table.take_rows()))
            .filter(|(_, rows)| !rows.is_empty())
            .collect();

        OutputBatch { batch_id, tables }
    }
}

/// The finalized output of one batch, ready for an output sink
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputBatch {
    pub batch_id: BatchId,
    pub tables: BTreeMap<String, Vec<OutputRow>>,
}

impl OutputBatch {
    pub fn row_count(&self) -> usize {
        self.tables.values().map(Vec::len).sum()
    }

    pub fn table(&self, name: &str) -> Option<&[OutputRow]> {
        self.tables.get(name).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
