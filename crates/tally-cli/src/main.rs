//! Tally CLI - Conversational analytics over CSV datasets
//!
//! Usage:
//!   tally analyze --file data.csv --query "..."   Answer a query
//!   tally profile --file data.csv                 Profile a dataset
//!   tally serve --data-dir ./data --port 3000     Start web server
//!   tally status                                  Show configuration

mod cli;
mod commands;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact().with_writer(std::io::stderr))
        .init();

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Analyze {
            file,
            query,
            hint,
            json,
        } => commands::cmd_analyze(config, &file, &query, hint.as_deref(), json),
        Commands::Profile { file, json } => commands::cmd_profile(&file, json),
        Commands::Serve {
            data_dir,
            host,
            port,
            no_auth,
        } => {
            let data_dir = commands::resolve_data_dir(data_dir);
            commands::cmd_serve(config, data_dir, &host, port, no_auth).await
        }
        Commands::Status { data_dir } => {
            let data_dir = commands::resolve_data_dir(data_dir);
            commands::cmd_status(&config, cli.config.as_deref(), &data_dir)
        }
    }
}
