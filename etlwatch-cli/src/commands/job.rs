//! Job command handlers
//!
//! Handles all job-related CLI commands including listing, viewing details,
//! starting jobs and following their live logs.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use etlwatch_client::{DashboardClient, SessionEnd, StreamSession};
use etlwatch_core::domain::job::{JobId, JobStatus, JobSummary};
use etlwatch_monitor::{Config, ConsoleSink, SinkHandler};
use serde_json::{Map, Value};
use tokio_util::io::ReaderStream;

/// Job subcommands
#[derive(Subcommand)]
pub enum JobCommands {
    /// List recent jobs
    List {
        /// Number of jobs to show (defaults to ETLWATCH_LIST_LIMIT)
        #[arg(long)]
        limit: Option<u32>,

        /// Number of jobs to skip
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
    /// Get job details
    Get {
        /// Job ID
        id: String,
    },
    /// Start a new job
    Run {
        /// Job parameter as key=value (repeatable)
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, Value)>,

        /// Follow the job's log once it started
        #[arg(short, long)]
        follow: bool,
    },
    /// Follow a job's live log until it ends (Ctrl-C to stop)
    Follow {
        /// Job ID
        id: String,
    },
    /// Decode a captured stream from a file
    Replay {
        /// File holding the raw event-stream bytes
        path: PathBuf,
    },
}

/// Handle job commands
///
/// Routes job subcommands to their respective handlers.
pub async fn handle_job_command(command: JobCommands, config: &Config) -> Result<()> {
    let client = config.client()?;

    match command {
        JobCommands::List { limit, offset } => {
            list_jobs(&client, limit.unwrap_or(config.list_limit), offset).await
        }
        JobCommands::Get { id } => get_job(&client, &JobId::new(id)).await,
        JobCommands::Run { params, follow } => run_job(&client, params, follow).await,
        JobCommands::Follow { id } => follow_job(&client, JobId::new(id)).await,
        JobCommands::Replay { path } => replay(&client, path).await,
    }
}

/// List recent jobs
async fn list_jobs(client: &DashboardClient, limit: u32, offset: u32) -> Result<()> {
    let jobs = client.list_jobs(limit, offset).await?;

    if jobs.is_empty() {
        println!("{}", "No jobs found.".yellow());
    } else {
        println!("{}", format!("Found {} job(s):", jobs.len()).bold());
        println!();
        print_job_table(&jobs);
    }

    Ok(())
}

/// Get and display a single job
async fn get_job(client: &DashboardClient, id: &JobId) -> Result<()> {
    let job = match client.get_job(id).await {
        Ok(job) => job,
        Err(e) if e.is_not_found() => anyhow::bail!("Job {} not found", id),
        Err(e) => return Err(e.into()),
    };

    print_job_details(&job);

    Ok(())
}

/// Start a job and optionally follow it
async fn run_job(client: &DashboardClient, params: Vec<(String, Value)>, follow: bool) -> Result<()> {
    let parameters: Map<String, Value> = params.into_iter().collect();
    let job_id = client
        .start_job(&Value::Object(parameters))
        .await
        .context("Failed to start job")?;

    println!("{} Started job {}", "✓".green(), job_id.to_string().cyan());

    if follow {
        println!();
        follow_job(client, job_id).await?;
    }

    Ok(())
}

/// Stream one job's log to the console
async fn follow_job(client: &DashboardClient, job_id: JobId) -> Result<()> {
    let session = client.stream_session(&job_id);
    stream_to_console(job_id, session).await
}

/// Feed a captured stream through the same decoder and console view
async fn replay(client: &DashboardClient, path: PathBuf) -> Result<()> {
    let file = tokio::fs::File::open(&path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let job_id = JobId::new(path.display().to_string());
    let session = StreamSession::from_byte_stream(
        job_id.clone(),
        client.protocol().clone(),
        ReaderStream::new(file),
    );
    stream_to_console(job_id, session).await
}

async fn stream_to_console(job_id: JobId, session: StreamSession) -> Result<()> {
    let handle = session.handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel();
        }
    });

    let mut sink = ConsoleSink::stdout();
    let mut handler = SinkHandler::new(job_id.clone(), &mut sink);
    let end = session.run(&mut handler).await;
    interrupt.abort();
    handler.finish(end);

    match end {
        SessionEnd::Failed => anyhow::bail!("Stream for job {} failed", job_id),
        _ => Ok(()),
    }
}

/// Parse a `key=value` job parameter
///
/// Values that read as JSON (numbers, booleans, objects) keep their type;
/// anything else is passed as a string.
fn parse_param(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {raw:?}"))?;

    let key = key.trim();
    if key.is_empty() {
        return Err(format!("parameter name missing in {raw:?}"));
    }

    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// Print jobs as an aligned table
fn print_job_table(jobs: &[JobSummary]) {
    println!(
        "  {}",
        format!("{:<10} {:<9} {:<20} {:>8}  {}", "ID", "STATUS", "STARTED", "RECORDS", "MESSAGE").bold()
    );
    for job in jobs {
        println!(
            "  {} {} {} {:>8}  {}",
            format!("{:<10}", job.id.as_str()).cyan(),
            colorize_status(job.status),
            format!("{:<20}", job.started_at.as_deref().unwrap_or("-")).dimmed(),
            job.records_count
                .map(|count| count.to_string())
                .unwrap_or_else(|| "-".to_string()),
            job.message.as_deref().unwrap_or("")
        );
    }
}

/// Print detailed job information
fn print_job_details(job: &JobSummary) {
    println!("{}", "Job Details:".bold());
    println!("  ID:        {}", job.id.to_string().cyan());
    println!("  Status:    {}", colorize_status(job.status));

    if let Some(started) = &job.started_at {
        println!("  Started:   {}", started);
    }

    if let Some(finished) = &job.finished_at {
        println!("  Finished:  {}", finished);
    }

    if let Some(count) = job.records_count {
        println!("  Records:   {}", count);
    }

    if let Some(message) = &job.message {
        println!("\n{}", "Message:".bold());
        match job.status {
            JobStatus::Error => println!("{}", message.red()),
            _ => println!("{}", message),
        }
    }
}

/// Colorize job status for display
fn colorize_status(status: JobStatus) -> ColoredString {
    let status_str = format!("{:<9}", format!("{:?}", status));
    match status {
        JobStatus::Running => status_str.cyan(),
        JobStatus::Finished => status_str.green(),
        JobStatus::Error => status_str.red(),
        JobStatus::Stuck => status_str.yellow(),
        JobStatus::Unknown => status_str.dimmed(),
    }
}
