//! CLI argument definitions using clap
//!
//! The command implementations live in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Tally - Ask questions about tabular data
#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Conversational analytics over CSV datasets", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Analytics config file (defaults to the per-user override, then built-in defaults)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Answer a natural-language query about a CSV file
    Analyze {
        /// CSV file to analyze
        #[arg(short, long)]
        file: PathBuf,

        /// The question, e.g. "Are there any anomalies in revenue?"
        #[arg(short, long)]
        query: String,

        /// Intent hint: comprehensive, insights, forecast, recommendations, qa
        #[arg(long)]
        hint: Option<String>,

        /// Print the full response as JSON
        #[arg(long)]
        json: bool,
    },

    /// Profile a CSV file: column statistics, quality and suggested queries
    Profile {
        /// CSV file to profile
        #[arg(short, long)]
        file: PathBuf,

        /// Print the profile as JSON
        #[arg(long)]
        json: bool,
    },

    /// Start the web server
    Serve {
        /// Directory of CSV datasets (defaults to TALLY_DATA_DIR, then ./data)
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Disable authentication (for local development only)
        ///
        /// WARNING: Do not use this flag when exposing the server to a network.
        /// By default, requests need "Authorization: Bearer <key>" with a key from TALLY_API_KEYS.
        #[arg(long)]
        no_auth: bool,
    },

    /// Show the active configuration and available datasets
    Status {
        /// Directory of CSV datasets (defaults to TALLY_DATA_DIR, then ./data)
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
}
