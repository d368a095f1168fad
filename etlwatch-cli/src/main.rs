//! etlwatch CLI
//!
//! Command-line interface for watching ETL jobs on a dashboard backend.

mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use etlwatch_monitor::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "etlwatch")]
#[command(about = "Follow live ETL job logs", long_about = None)]
struct Cli {
    /// Backend URL
    #[arg(long, global = true, env = "ETLWATCH_URL")]
    url: Option<String>,

    /// Endpoint base path (e.g., /api/etl/chart)
    #[arg(long, global = true, env = "ETLWATCH_ENDPOINT")]
    endpoint: Option<String>,

    /// Bearer token for the backend
    #[arg(long, global = true, env = "ETLWATCH_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Diagnostics go to stderr; stdout belongs to the log view
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "etlwatch=info,etlwatch_monitor=info,etlwatch_client=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(url) = cli.url {
        config.base_url = url;
    }
    if let Some(endpoint) = cli.endpoint {
        config.endpoint = endpoint;
    }
    if let Some(token) = cli.token.filter(|token| !token.is_empty()) {
        config.token = Some(token);
    }
    config.validate()?;

    handle_command(cli.command, &config).await
}
