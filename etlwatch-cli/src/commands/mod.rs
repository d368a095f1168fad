//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod job;
mod watch;

pub use job::JobCommands;

use anyhow::Result;
use clap::Subcommand;
use etlwatch_monitor::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Job management and live logs
    Job {
        #[command(subcommand)]
        command: JobCommands,
    },
    /// Attach to whichever job is running and keep following new ones
    ///
    /// Reads commands from stdin: `follow <id>`, `stop`, `refresh`, `quit`.
    Watch,
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Job { command } => job::handle_job_command(command, config).await,
        Commands::Watch => watch::handle_watch(config).await,
    }
}
