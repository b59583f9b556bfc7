//! Validate config command implementation
//!
//! This module implements the `validate-config` command for validating
//! the Conduit configuration file.

use crate::config::load_config;
use clap::Args;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Execute the validate-config command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("🔍 Validating configuration file: {config_path}");
        println!();

        // Loading also validates
        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Configuration is invalid");
                println!("   Error: {e}");
                return Ok(2);
            }
        };

        let disabled = if config.transform.disabled_types.is_empty() {
            "none".to_string()
        } else {
            config
                .transform
                .disabled_types
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        };

        println!("✅ Configuration is valid");
        println!();
        println!("Configuration Summary:");
        println!("  Log Level: {}", config.application.log_level);
        println!("  Dry Run: {}", config.application.dry_run);
        println!("  Sub-batch Size: {}", config.transform.sub_batch_size);
        println!("  Max Workers: {}", config.transform.max_workers);
        println!("  Disabled Types: {disabled}");
        println!(
            "  Patient Not Ready: {}",
            config.transform.patient_not_ready
        );
        println!(
            "  Require National Identifier: {}",
            config.patient.require_national_identifier
        );
        println!("  Output Directory: {}", config.output.directory);
        println!("  State File: {}", config.state.path);
        println!();
        Ok(0)
    }
}
