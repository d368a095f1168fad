//! Watch command
//!
//! Runs the job monitor in the foreground and turns stdin lines into
//! monitor commands.

use anyhow::{Context, Result};
use colored::*;
use etlwatch_core::domain::job::JobId;
use etlwatch_monitor::{Config, ConsoleSink, JobMonitor, MonitorCommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::info;

/// Run the monitor until `quit`, Ctrl-C or end of input
pub async fn handle_watch(config: &Config) -> Result<()> {
    let client = config.client()?;
    info!(
        "Watching {}{} for running jobs",
        client.base_url(),
        client.endpoint().base_path()
    );

    let (commands, rx) = mpsc::channel(16);
    let monitor = JobMonitor::new(config, client.clone(), client, ConsoleSink::stdout());
    let mut monitor = tokio::spawn(monitor.run(rx));

    println!(
        "{}",
        "Commands: follow <id>, stop, refresh, quit".dimmed()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            result = &mut monitor => {
                result.context("Job monitor task failed")??;
                return Ok(());
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            line = lines.next_line(), if stdin_open => {
                let Some(line) = line? else {
                    // Keep watching without interactive input
                    stdin_open = false;
                    continue;
                };

                match parse_command(&line) {
                    Ok(Some(MonitorCommand::Shutdown)) => break,
                    Ok(Some(command)) => {
                        if commands.send(command).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(message) => println!("{}", message.yellow()),
                }
            }
        }
    }

    // The monitor may already be gone if it failed; its result says why
    let _ = commands.send(MonitorCommand::Shutdown).await;
    monitor.await.context("Job monitor task failed")??;

    Ok(())
}

/// Parse one line of user input
///
/// Blank lines yield `None`.
fn parse_command(line: &str) -> Result<Option<MonitorCommand>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };

    let command = match (verb.to_ascii_lowercase().as_str(), words.next()) {
        ("follow" | "f", Some(id)) => MonitorCommand::Follow(JobId::new(id)),
        ("follow" | "f", None) => return Err("usage: follow <id>".to_string()),
        ("stop" | "s", None) => MonitorCommand::Stop,
        ("refresh" | "r", None) => MonitorCommand::Refresh,
        ("quit" | "q" | "exit", None) => MonitorCommand::Shutdown,
        _ => {
            return Err(format!(
                "unknown command {:?} (expected follow <id>, stop, refresh, quit)",
                line.trim()
            ));
        }
    };

    if words.next().is_some() {
        return Err(format!("unexpected arguments in {:?}", line.trim()));
    }

    Ok(Some(command))
}
