//! Progress tracking for one streamed job

use super::log::{ControlSignal, LogLevel, LogRecord};

/// Running tally of what a live stream has reported so far
///
/// Backends do not promise monotonic progress, so both the latest and the
/// highest value seen are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobProgress {
    latest: u8,
    peak: u8,
    records: u64,
    warnings: u64,
    errors: u64,
    finished: Option<ControlSignal>,
}

impl JobProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, record: &LogRecord) {
        self.records += 1;
        self.latest = record.percent();
        self.peak = self.peak.max(self.latest);
        match record.level() {
            LogLevel::Warning => self.warnings += 1,
            LogLevel::Error => self.errors += 1,
            _ => {}
        }
    }

    pub fn finish(&mut self, signal: ControlSignal) {
        if signal == ControlSignal::Completion {
            self.latest = 100;
            self.peak = 100;
        }
        self.finished = Some(signal);
    }

    pub fn latest(&self) -> u8 {
        self.latest
    }

    pub fn peak(&self) -> u8 {
        self.peak
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn warnings(&self) -> u64 {
        self.warnings
    }

    pub fn errors(&self) -> u64 {
        self.errors
    }

    pub fn is_finished(&self) -> bool {
        self.finished.is_some()
    }

    pub fn signal(&self) -> Option<ControlSignal> {
        self.finished
    }

    /// Renders `[#####-----]  50%` with `width` cells
    pub fn render_bar(&self, width: usize) -> String {
        let filled = width * self.latest as usize / 100;
        format!(
            "[{}{}] {:>3}%",
            "#".repeat(filled),
            "-".repeat(width - filled),
            self.latest
        )
    }
}
