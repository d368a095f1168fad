//! Presentation sink
//!
//! Where streamed records end up. The console implementation prints a
//! scrolling log with a progress bar per record.

use std::collections::HashMap;
use std::io::Write;

use colored::*;
use etlwatch_client::{ClientError, SessionEnd, StreamHandler};
use etlwatch_core::domain::job::JobId;
use etlwatch_core::domain::log::{ControlSignal, LogLevel, LogRecord};
use etlwatch_core::domain::progress::JobProgress;

/// Consumer of everything a monitored stream produces
pub trait PresentationSink: Send {
    /// The stream for `job_id` is open
    fn attached(&mut self, job_id: &JobId);

    fn record(&mut self, job_id: &JobId, record: &LogRecord);

    /// The stream for `job_id` failed at the transport level
    fn failed(&mut self, job_id: &JobId, error: &str);

    /// The stream for `job_id` is gone for good
    fn finished(&mut self, job_id: &JobId, end: SessionEnd);
}

const BAR_WIDTH: usize = 20;

/// Writes a colored console log to any `Write` (stdout by default)
pub struct ConsoleSink<W: Write + Send = std::io::Stdout> {
    out: W,
    progress: HashMap<JobId, JobProgress>,
}

impl ConsoleSink {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            progress: HashMap::new(),
        }
    }

    pub fn progress(&self, job_id: &JobId) -> Option<&JobProgress> {
        self.progress.get(job_id)
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    // Console output is best effort; a closed stdout must not stop the stream
    fn line(&mut self, text: impl std::fmt::Display) {
        let _ = writeln!(self.out, "{}", text);
    }
}

impl<W: Write + Send> PresentationSink for ConsoleSink<W> {
    fn attached(&mut self, job_id: &JobId) {
        self.progress.insert(job_id.clone(), JobProgress::new());
        self.line(format!(
            "{} {}",
            "▸".cyan(),
            format!("Following job {}", job_id).bold()
        ));
        self.line("─".repeat(80).dimmed());
    }

    fn record(&mut self, job_id: &JobId, record: &LogRecord) {
        let progress = self.progress.entry(job_id.clone()).or_default();
        progress.observe(record);
        let bar = progress.render_bar(BAR_WIDTH);

        let line = format!(
            "{} {} {} {}",
            record.display_time().dimmed(),
            colorize_level(record.level()),
            bar.dimmed(),
            record.message()
        );
        self.line(line);
    }

    fn failed(&mut self, job_id: &JobId, error: &str) {
        self.line(format!(
            "{} {}",
            "✗".red(),
            format!("Stream for job {} failed: {}", job_id, error).red()
        ));
    }

    fn finished(&mut self, job_id: &JobId, end: SessionEnd) {
        let mut progress = self.progress.remove(job_id).unwrap_or_default();
        if let SessionEnd::Control(signal) = end {
            progress.finish(signal);
        }

        let summary = format!(
            "{} record(s), {} warning(s), {} error(s)",
            progress.records(),
            progress.warnings(),
            progress.errors()
        );
        let headline = match end {
            SessionEnd::Control(ControlSignal::Completion) => {
                format!("✓ Job {} completed", job_id).green()
            }
            SessionEnd::Control(ControlSignal::Disconnected) => {
                format!("■ Job {}: server closed the stream", job_id).yellow()
            }
            SessionEnd::EndOfStream => format!("■ Job {}: stream ended", job_id).yellow(),
            SessionEnd::Failed => format!("✗ Job {}: stream lost", job_id).red(),
            SessionEnd::Cancelled => format!("■ Stopped following job {}", job_id).dimmed(),
        };

        self.line("─".repeat(80).dimmed());
        self.line(format!("{} {} {}", headline, progress.render_bar(BAR_WIDTH), summary.dimmed()));
    }
}

/// Colorize a log level for display
fn colorize_level(level: LogLevel) -> ColoredString {
    let label = format!("{:<7}", format!("{:?}", level).to_uppercase());
    match level {
        LogLevel::Debug => label.dimmed(),
        LogLevel::Info => label.cyan(),
        LogLevel::Success => label.green(),
        LogLevel::Warning => label.yellow(),
        LogLevel::Error => label.red(),
    }
}

/// Adapts a sink to a single session's callbacks
///
/// Used when one job is followed directly, without a supervisor.
pub struct SinkHandler<'a, K: PresentationSink + ?Sized> {
    job_id: JobId,
    sink: &'a mut K,
}

impl<'a, K: PresentationSink + ?Sized> SinkHandler<'a, K> {
    pub fn new(job_id: JobId, sink: &'a mut K) -> Self {
        Self { job_id, sink }
    }

    /// Reports how the session ended
    pub fn finish(self, end: SessionEnd) {
        self.sink.finished(&self.job_id, end);
    }
}

impl<K: PresentationSink + ?Sized> StreamHandler for SinkHandler<'_, K> {
    fn on_open(&mut self) {
        self.sink.attached(&self.job_id);
    }

    fn on_record(&mut self, record: LogRecord) {
        self.sink.record(&self.job_id, &record);
    }

    fn on_error(&mut self, error: ClientError) {
        self.sink.failed(&self.job_id, &error.to_string());
    }
}
