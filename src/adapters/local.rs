//! File-backed collaborators for local runs
//!
//! The CLI keeps every durable store in one JSON state file and writes each
//! finalized batch as a directory of JSON-lines tables:
//!
//! ```text
//! <output>/<batch_id>/<table>.jsonl
//! ```

use super::memory::{
    IdMappingSnapshot, InMemoryIdMappingStore, InMemoryPatientLinkStore, InMemoryRecordStore,
    InMemoryServiceDirectory,
};
use super::traits::{OutputSink, ServiceOrganization};
use crate::core::batch::Collaborators;
use crate::core::transform::output::{OutputBatch, OutputRow};
use crate::domain::{
    Batch, BatchId, ConduitError, ExchangeId, LocalId, Record, RecordType, Result, ServiceId,
    SystemId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const STATE_VERSION: u32 = 1;

/// Everything the local stores persist between runs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocalState {
    #[serde(default)]
    pub version: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub id_mappings: IdMappingSnapshot,

    #[serde(default)]
    pub service_organizations: Vec<ServiceDirectoryEntry>,

    #[serde(default)]
    pub person_links: Vec<PersonLinkEntry>,

    /// Latest version of every record seen so far
    #[serde(default)]
    pub records: Vec<Record>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDirectoryEntry {
    pub service_id: ServiceId,
    pub organization_local_id: LocalId,
    pub mapping_value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonLinkEntry {
    pub patient_local_id: LocalId,
    pub person_local_id: LocalId,
}

impl LocalState {
    /// Loads state from a file, starting empty when it does not exist yet
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn load(path: &Path) -> Result<Self> {
        if !tokio::fs::try_exists(path).await? {
            tracing::info!(path = %path.display(), "No state file found, starting fresh");
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let state: LocalState = serde_json::from_str(&content).map_err(|e| {
            ConduitError::Serialization(format!(
                "Failed to parse state file {}: {e}",
                path.display()
            ))
        })?;

        tracing::debug!(
            path = %path.display(),
            records = state.records.len(),
            destination_ids = state.id_mappings.destination_ids.len(),
            "Loaded local state"
        );
        Ok(state)
    }

    /// Writes state to a file, replacing it atomically
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory or file cannot be written.
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut state = self.clone();
        state.version = STATE_VERSION;
        state.updated_at = Some(Utc::now());
        let json = serde_json::to_string_pretty(&state)?;

        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, json).await?;
        tokio::fs::rename(&tmp_path, path).await?;

        tracing::debug!(path = %path.display(), "Saved local state");
        Ok(())
    }
}

/// The in-memory stores backing a local run
#[derive(Debug, Clone)]
pub struct LocalStores {
    pub id_mappings: Arc<InMemoryIdMappingStore>,
    pub records: Arc<InMemoryRecordStore>,
    pub patient_links: Arc<InMemoryPatientLinkStore>,
    pub directory: Arc<InMemoryServiceDirectory>,
}

impl LocalStores {
    pub fn from_state(state: LocalState) -> Self {
        let patient_links = InMemoryPatientLinkStore::new();
        for link in state.person_links {
            patient_links.link(link.patient_local_id, link.person_local_id);
        }

        let directory = InMemoryServiceDirectory::new();
        for entry in state.service_organizations {
            directory.register(
                entry.service_id,
                ServiceOrganization {
                    local_id: entry.organization_local_id,
                    mapping_value: entry.mapping_value,
                },
            );
        }

        Self {
            id_mappings: Arc::new(InMemoryIdMappingStore::from_snapshot(state.id_mappings)),
            records: Arc::new(InMemoryRecordStore::with_records(state.records)),
            patient_links: Arc::new(patient_links),
            directory: Arc::new(directory),
        }
    }

    pub fn to_state(&self) -> LocalState {
        LocalState {
            version: STATE_VERSION,
            updated_at: None,
            id_mappings: self.id_mappings.snapshot(),
            service_organizations: self
                .directory
                .organizations()
                .into_iter()
                .map(|(service_id, organization)| ServiceDirectoryEntry {
                    service_id,
                    organization_local_id: organization.local_id,
                    mapping_value: organization.mapping_value,
                })
                .collect(),
            person_links: self
                .patient_links
                .links()
                .into_iter()
                .map(|(patient, person)| PersonLinkEntry {
                    patient_local_id: patient,
                    person_local_id: person,
                })
                .collect(),
            records: self.records.records(),
        }
    }

    /// Trait-object handles for the orchestrator
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            id_mappings: self.id_mappings.clone(),
            records: self.records.clone(),
            patient_links: self.patient_links.clone(),
            directory: self.directory.clone(),
        }
    }
}

/// On-disk batch document accepted by the CLI
#[derive(Debug, Deserialize)]
struct BatchFile {
    service_id: ServiceId,
    system_id: SystemId,
    exchange_id: ExchangeId,
    #[serde(default)]
    batch_id: Option<BatchId>,
    #[serde(default)]
    patient_scope: Option<LocalId>,
    #[serde(default)]
    records: Vec<BatchFileRecord>,
}

#[derive(Debug, Deserialize)]
struct BatchFileRecord {
    record_type: RecordType,
    local_id: LocalId,
    #[serde(default)]
    deleted: bool,
    #[serde(default)]
    payload: serde_json::Value,
}

/// Reads a batch from a JSON document
///
/// Record payloads are embedded as JSON objects. A missing `batch_id` gets a
/// fresh random one.
///
/// # Errors
///
/// Returns an error if the file cannot be read, is malformed, or carries
/// records from a different service than the batch.
pub async fn load_batch_file(path: &Path) -> Result<Batch> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        ConduitError::Io(format!("Failed to read batch file {}: {e}", path.display()))
    })?;
    let file: BatchFile = serde_json::from_str(&content).map_err(|e| {
        ConduitError::Serialization(format!(
            "Failed to parse batch file {}: {e}",
            path.display()
        ))
    })?;

    let service_id = file.service_id;
    let records = file.records.into_iter().map(|entry| {
        if entry.deleted {
            Record::tombstone(entry.record_type, entry.local_id, service_id)
        } else {
            Record::from_json(entry.record_type, entry.local_id, &entry.payload, service_id)
        }
    });

    let mut builder = Batch::builder()
        .service_id(service_id)
        .system_id(file.system_id)
        .exchange_id(file.exchange_id)
        .batch_id(file.batch_id.unwrap_or_else(BatchId::random))
        .records(records);
    if let Some(patient) = file.patient_scope {
        builder = builder.patient_scope(patient);
    }
    builder.build()
}

/// Writes each batch as a directory of JSON-lines tables
#[derive(Debug, Clone)]
pub struct JsonLinesSink {
    root: PathBuf,
    dry_run: bool,
}

impl JsonLinesSink {
    pub fn new(root: impl Into<PathBuf>, dry_run: bool) -> Self {
        Self {
            root: root.into(),
            dry_run,
        }
    }

    /// Directory a batch's tables are written to
    pub fn batch_dir(&self, batch_id: BatchId) -> PathBuf {
        self.root.join(batch_id.to_string())
    }
}

async fn write_table(dir: &Path, table: &str, rows: &[OutputRow]) -> Result<usize> {
    let mut buffer = String::new();
    for row in rows {
        buffer.push_str(&serde_json::to_string(row)?);
        buffer.push('\n');
    }
    tokio::fs::write(dir.join(format!("{table}.jsonl")), buffer).await?;
    Ok(rows.len())
}

#[async_trait]
impl OutputSink for JsonLinesSink {
    async fn write_batch(&self, output: &OutputBatch) -> Result<usize> {
        if self.dry_run {
            tracing::info!(
                batch_id = %output.batch_id,
                tables = output.tables.len(),
                rows = output.row_count(),
                "Dry run: skipping output write"
            );
            return Ok(0);
        }

        let dir = self.batch_dir(output.batch_id);
        tokio::fs::create_dir_all(&dir).await?;

        let written: usize = try_join_all(
            output
                .tables
                .iter()
                .map(|(table, rows)| write_table(&dir, table, rows)),
        )
        .await?
        .into_iter()
        .sum();

        tracing::info!(
            batch_id = %output.batch_id,
            dir = %dir.display(),
            rows = written,
            "Batch output written"
        );
        Ok(written)
    }
}
