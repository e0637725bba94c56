//! CLI interface for the credit aligner

use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "credit-aligner")]
#[command(about = "Skill alignment and credit recommendation for vocational-to-university transfer")]
#[command(long_about = "Cluster, match and score extracted skills of vocational units against a university course, with edge case detection and ensemble consensus")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Align one or more vocational units with a university course
    Align {
        /// JSON file with one unit profile or an array of them
        #[arg(short, long)]
        source: PathBuf,

        /// JSON file with the course profile
        #[arg(short, long)]
        target: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Console)]
        output: OutputFormat,

        /// Save the JSON result to a file
        #[arg(long)]
        save: Option<PathBuf>,

        /// Stop the clustering sweep after this many trials
        #[arg(long)]
        max_trials: Option<usize>,

        /// Skip clustering trials not started within this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Reconcile repeated extraction runs into a consensus skill list
    Consensus {
        /// One JSON file per extraction run
        #[arg(required = true, num_args = 1..)]
        runs: Vec<PathBuf>,

        /// Override the grouping similarity threshold
        #[arg(long)]
        threshold: Option<f32>,

        /// Save the consensus to a file instead of printing it
        #[arg(long)]
        save: Option<PathBuf>,
    },

    /// Show or reset configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Print the configuration file location
    Path,

    /// Reset configuration to defaults
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Console,
    Json,
}

/// Validate file extension
pub fn validate_file_extension(path: &Path, allowed_extensions: &[&str]) -> Result<(), String> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) => {
            if allowed_extensions.contains(&ext.to_lowercase().as_str()) {
                Ok(())
            } else {
                Err(format!(
                    "Unsupported file extension: .{}. Allowed: {}",
                    ext,
                    allowed_extensions.join(", ")
                ))
            }
        }
        None => Err("File has no extension".to_string()),
    }
}
