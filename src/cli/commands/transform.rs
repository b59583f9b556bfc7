//! Transform command implementation
//!
//! This module implements the `transform` command, which runs batch files
//! through the orchestrator against the local state file and writes the
//! output tables as JSON lines.

use crate::adapters::local::{load_batch_file, JsonLinesSink, LocalState, LocalStores};
use crate::config::{load_config, ConduitConfig};
use crate::core::batch::{BatchOrchestrator, RunSummary};
use crate::core::transform::TransformerRegistry;
use clap::Args;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::sync::watch;

/// Arguments for the transform command
#[derive(Args, Debug)]
pub struct TransformArgs {
    /// Batch files to transform, in order
    #[arg(required = true, value_name = "BATCH_FILE")]
    pub files: Vec<PathBuf>,

    /// Dry run mode - transform batches without writing output or state
    #[arg(long)]
    pub dry_run: bool,

    /// Override the output directory
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<String>,

    /// Override the local state file
    #[arg(long, value_name = "FILE")]
    pub state: Option<String>,
}

impl TransformArgs {
    /// Applies CLI overrides on top of the loaded configuration
    fn apply_overrides(&self, config: &mut ConduitConfig) {
        if self.dry_run {
            tracing::info!("Enabling dry-run mode from CLI");
            config.application.dry_run = true;
        }

        if let Some(output) = &self.output {
            tracing::info!(directory = %output, "Overriding output directory from CLI");
            config.output.directory = output.clone();
        }

        if let Some(state) = &self.state {
            tracing::info!(path = %state, "Overriding state file from CLI");
            config.state.path = state.clone();
        }
    }

    /// Execute the transform command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!(files = self.files.len(), "Starting transform command");

        let mut config = match load_config(config_path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load configuration");
                eprintln!("Failed to load configuration: {e}");
                return Ok(2);
            }
        };

        self.apply_overrides(&mut config);

        if let Err(e) = config.validate() {
            tracing::error!(error = %e, "Configuration validation failed");
            eprintln!("Configuration validation failed: {e}");
            return Ok(2);
        }

        let dry_run = config.application.dry_run;
        if dry_run {
            tracing::info!("Dry run mode enabled - no output or state will be written");
            println!("🔍 DRY RUN MODE - No output or state will be written");
            println!();
        }

        let state_path = PathBuf::from(&config.state.path);
        let state = LocalState::load(&state_path).await?;
        let stores = LocalStores::from_state(state);

        let orchestrator = BatchOrchestrator::new(
            &config,
            TransformerRegistry::standard(),
            stores.collaborators(),
        );
        let sink = JsonLinesSink::new(&config.output.directory, dry_run);

        println!("🚀 Transforming {} batch file(s)...", self.files.len());
        println!();

        let summary = run_batches(&self.files, &orchestrator, &sink, &stores, shutdown_signal).await;
        summary.log_summary();

        if dry_run {
            tracing::info!("Dry run: local state not saved");
        } else {
            stores.to_state().save(&state_path).await?;
        }

        print_summary(&summary);

        let exit_code = if summary.interrupted {
            println!("⚠️  Transform interrupted between batches. Completed batches were saved.");
            tracing::info!("Transform interrupted by user signal");
            130
        } else if summary.is_successful() {
            println!("✅ Transform completed successfully!");
            0
        } else {
            println!("⚠️  Transform completed with failed batches");
            3
        };

        Ok(exit_code)
    }
}

/// Runs each batch file in order, stopping between batches on shutdown
async fn run_batches(
    files: &[PathBuf],
    orchestrator: &BatchOrchestrator,
    sink: &JsonLinesSink,
    stores: &LocalStores,
    shutdown_signal: watch::Receiver<bool>,
) -> RunSummary {
    let started = Instant::now();
    let mut summary = RunSummary::new();

    for path in files {
        if *shutdown_signal.borrow() {
            tracing::info!(
                remaining = files.len() - summary.batches_processed - summary.failures.len(),
                "Shutdown requested, not starting further batches"
            );
            summary.interrupted = true;
            break;
        }

        if let Err(message) = run_batch(path, orchestrator, sink, stores, &mut summary).await {
            tracing::error!(file = %path.display(), error = %message, "Batch failed");
            summary.add_failure(path.display().to_string(), message);
        }
    }

    summary.with_duration(started.elapsed())
}

async fn run_batch(
    path: &Path,
    orchestrator: &BatchOrchestrator,
    sink: &JsonLinesSink,
    stores: &LocalStores,
    summary: &mut RunSummary,
) -> Result<(), String> {
    let batch = load_batch_file(path).await.map_err(|e| e.to_string())?;

    let (outcome, written) = orchestrator
        .publish_batch(&batch, sink)
        .await
        .map_err(|e| e.to_string())?;

    // Later batches resolve references to these records from the store.
    stores.records.put_all(batch.records);

    outcome.summary.log_summary();
    println!(
        "  {} → batch {}: {} transformed, {} skipped, {} rows",
        path.display(),
        outcome.summary.batch_id,
        outcome.summary.transformed,
        outcome.summary.skipped,
        outcome.summary.rows
    );
    summary.add_batch(&outcome.summary, written);
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("📊 Transform Summary:");
    println!("  Batches: {}", summary.batches_processed);
    println!("  Failed: {}", summary.failures.len());
    println!("  Records: {}", summary.records);
    println!("  Transformed: {}", summary.transformed);
    println!("  Skipped: {}", summary.skipped);
    println!("  Rows Written: {}", summary.rows_written);
    println!("  Records Added: {}", summary.records_added);
    println!("  Duration: {:.2}s", summary.duration.as_secs_f64());
    println!();

    if !summary.failures.is_empty() {
        println!("⚠️  Failed batches:");
        for failure in &summary.failures {
            println!("  - {}: {}", failure.source, failure.message);
        }
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_args_overrides() {
        let args = TransformArgs {
            files: vec![PathBuf::from("batch.json")],
            dry_run: true,
            output: Some("/tmp/out".to_string()),
            state: Some("/tmp/state.json".to_string()),
        };
        let mut config = ConduitConfig::default();

        args.apply_overrides(&mut config);

        assert!(config.application.dry_run);
        assert_eq!(config.output.directory, "/tmp/out");
        assert_eq!(config.state.path, "/tmp/state.json");
    }

    #[test]
    fn test_transform_args_without_overrides_keep_config() {
        let args = TransformArgs {
            files: vec![PathBuf::from("batch.json")],
            dry_run: false,
            output: None,
            state: None,
        };
        let mut config = ConduitConfig::default();

        args.apply_overrides(&mut config);

        assert!(!config.application.dry_run);
        assert_eq!(config.output.directory, "./output");
    }

    #[tokio::test]
    async fn test_missing_config_is_configuration_error() {
        let args = TransformArgs {
            files: vec![PathBuf::from("batch.json")],
            dry_run: true,
            output: None,
            state: None,
        };
        let (_tx, rx) = watch::channel(false);

        let code = args.execute("/nonexistent/conduit.toml", rx).await.unwrap();
        assert_eq!(code, 2);
    }
}
