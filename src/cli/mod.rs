//! CLI interface and argument parsing
//!
//! This module provides the command-line interface for Conduit using clap.

pub mod commands;

use clap::{Parser, Subcommand};

/// Conduit - clinical record batch transformer
#[derive(Parser, Debug)]
#[command(name = "conduit")]
#[command(version, about, long_about = None)]
#[command(author = "Conduit Contributors")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "conduit.toml", env = "CONDUIT_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "CONDUIT_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Transform batch files into destination tables
    Transform(commands::transform::TransformArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate::ValidateArgs),
}
