pub mod ask;
pub mod config;
pub mod research;

use std::path::PathBuf;

use anyhow::Result;

use crate::cli::{Commands, OutputFormat};

/// Dispatches a parsed [`Commands`] to its handler. Each handler builds its
/// own [`crate::runtime::Runtime`] rather than sharing one across commands,
/// since a CLI invocation only ever runs a single command.
pub async fn execute_command(command: Commands, config: Option<PathBuf>, output: OutputFormat) -> Result<()> {
    match command {
        Commands::Ask { query, mode, session, docs } => ask::run(config, output, query, mode, session, docs).await,
        Commands::Research { topic, docs } => research::run(config, output, topic, docs).await,
        Commands::Config { command } => config::run(config, output, command).await,
    }
}
