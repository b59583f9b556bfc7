//! Integration tests for local runs of the transform command
//!
//! Each test runs the command against a temporary directory holding the
//! configuration, the state file, the batch files and the output tables.

use conduit::adapters::local::{LocalState, LocalStores};
use conduit::adapters::IdMappingStore;
use conduit::cli::commands::transform::TransformArgs;
use conduit::domain::{IdScope, LocalId, RecordType};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::sync::watch;

const SERVICE_ID: &str = "7d44b88c-4199-4bad-97dc-d78268e01398";
const SYSTEM_ID: &str = "b7a6c1de-0b55-4a3b-9a51-1d4a3c2f0e11";
const FIRST_BATCH: &str = "0b7f6a52-95a4-4c5e-9c43-3f7d1c2e8a10";
const SECOND_BATCH: &str = "5c1e9d37-2b8f-4a61-8e0d-7a4b3c9f1e22";

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let config = format!(
            "[output]\ndirectory = \"{}\"\n\n[state]\npath = \"{}\"\n",
            dir.path().join("output").display(),
            dir.path().join("state").join("conduit-state.json").display()
        );
        std::fs::write(dir.path().join("conduit.toml"), config).unwrap();
        Self { dir }
    }

    fn config_path(&self) -> String {
        self.dir.path().join("conduit.toml").display().to_string()
    }

    fn state_path(&self) -> PathBuf {
        self.dir.path().join("state").join("conduit-state.json")
    }

    fn table_path(&self, batch_id: &str, table: &str) -> PathBuf {
        self.dir
            .path()
            .join("output")
            .join(batch_id)
            .join(format!("{table}.jsonl"))
    }

    fn write_batch(&self, name: &str, batch_id: &str, records: Value) -> PathBuf {
        let path = self.dir.path().join(name);
        let document = json!({
            "service_id": SERVICE_ID,
            "system_id": SYSTEM_ID,
            "exchange_id": uuid::Uuid::new_v4().to_string(),
            "batch_id": batch_id,
            "records": records,
        });
        std::fs::write(&path, document.to_string()).unwrap();
        path
    }

    async fn run(&self, files: Vec<PathBuf>, dry_run: bool) -> i32 {
        let (_tx, rx) = watch::channel(false);
        self.run_with_signal(files, dry_run, rx).await
    }

    async fn run_with_signal(
        &self,
        files: Vec<PathBuf>,
        dry_run: bool,
        shutdown: watch::Receiver<bool>,
    ) -> i32 {
        let args = TransformArgs {
            files,
            dry_run,
            output: None,
            state: None,
        };
        args.execute(&self.config_path(), shutdown).await.unwrap()
    }
}

fn read_rows(path: &Path) -> Vec<Value> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn first_batch_records() -> Value {
    json!([
        {"record_type": "Patient", "local_id": "P1", "payload": {"gender": "female"}},
        {
            "record_type": "Observation",
            "local_id": "O1",
            "payload": {"subject": {"reference": "Patient/P1"}, "status": "final"}
        }
    ])
}

#[tokio::test]
async fn test_transform_writes_tables_and_state() {
    let workspace = Workspace::new();
    let batch = workspace.write_batch("batch-1.json", FIRST_BATCH, first_batch_records());

    let code = workspace.run(vec![batch], false).await;
    assert_eq!(code, 0);

    let patients = read_rows(&workspace.table_path(FIRST_BATCH, "patient"));
    assert_eq!(patients.len(), 1);
    assert_eq!(patients[0]["action"], json!("upsert"));
    assert_eq!(patients[0]["fields"]["gender"], json!("female"));

    let observations = read_rows(&workspace.table_path(FIRST_BATCH, "observation"));
    assert_eq!(observations.len(), 1);
    assert_eq!(observations[0]["fields"]["patient_id"], patients[0]["id"]);
    assert_eq!(observations[0]["fields"]["status"], json!("final"));

    let state = LocalState::load(&workspace.state_path()).await.unwrap();
    assert_eq!(state.records.len(), 2);
    assert!(state.updated_at.is_some());
}

#[tokio::test]
async fn test_destination_ids_survive_restart() {
    let workspace = Workspace::new();
    let first = workspace.write_batch("batch-1.json", FIRST_BATCH, first_batch_records());
    assert_eq!(workspace.run(vec![first], false).await, 0);

    let second = workspace.write_batch(
        "batch-2.json",
        SECOND_BATCH,
        json!([{
            "record_type": "Observation",
            "local_id": "O2",
            "payload": {"subject": {"reference": "Patient/P1"}}
        }]),
    );
    assert_eq!(workspace.run(vec![second], false).await, 0);

    let patients = read_rows(&workspace.table_path(FIRST_BATCH, "patient"));
    let observations = read_rows(&workspace.table_path(SECOND_BATCH, "observation"));
    assert_eq!(observations.len(), 1);
    assert_eq!(observations[0]["fields"]["patient_id"], patients[0]["id"]);
    assert!(!workspace.table_path(SECOND_BATCH, "patient").exists());

    let stores = LocalStores::from_state(LocalState::load(&workspace.state_path()).await.unwrap());
    let patient_id = stores
        .id_mappings
        .find_destination_id(
            IdScope::Record(RecordType::Patient),
            &LocalId::new("P1").unwrap(),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(json!(patient_id.value()), patients[0]["id"]);
}

#[tokio::test]
async fn test_dry_run_writes_neither_output_nor_state() {
    let workspace = Workspace::new();
    let batch = workspace.write_batch("batch-1.json", FIRST_BATCH, first_batch_records());

    let code = workspace.run(vec![batch], true).await;
    assert_eq!(code, 0);

    assert!(!workspace.table_path(FIRST_BATCH, "patient").exists());
    assert!(!workspace.state_path().exists());
}

#[tokio::test]
async fn test_failed_batch_does_not_stop_later_batches() {
    let workspace = Workspace::new();
    let missing = workspace.dir.path().join("missing.json");
    let batch = workspace.write_batch("batch-1.json", FIRST_BATCH, first_batch_records());

    let code = workspace.run(vec![missing, batch], false).await;
    assert_eq!(code, 3);
    assert!(workspace.table_path(FIRST_BATCH, "patient").exists());
}

#[tokio::test]
async fn test_unregistered_type_fails_batch_without_output() {
    let workspace = Workspace::new();
    let batch = workspace.write_batch(
        "batch-1.json",
        FIRST_BATCH,
        json!([
            {"record_type": "Patient", "local_id": "P1", "payload": {}},
            {
                "record_type": "Composition",
                "local_id": "C1",
                "payload": {"subject": {"reference": "Patient/P1"}}
            }
        ]),
    );

    let code = workspace.run(vec![batch], false).await;
    assert_eq!(code, 3);
    assert!(!workspace.dir.path().join("output").join(FIRST_BATCH).exists());

    let state = LocalState::load(&workspace.state_path()).await.unwrap();
    assert!(state.records.is_empty());
}

#[tokio::test]
async fn test_shutdown_before_first_batch() {
    let workspace = Workspace::new();
    let batch = workspace.write_batch("batch-1.json", FIRST_BATCH, first_batch_records());
    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();

    let code = workspace.run_with_signal(vec![batch], false, rx).await;
    assert_eq!(code, 130);
    assert!(!workspace.table_path(FIRST_BATCH, "patient").exists());
}
