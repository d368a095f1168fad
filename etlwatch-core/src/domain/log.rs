//! Log domain types

use serde::{Deserialize, Deserializer, Serialize};

/// Severity of a log record. Drives presentation only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Success,
    #[serde(alias = "warn")]
    Warning,
    Error,
}

/// One progress entry emitted by a running job
///
/// Records are immutable once built: fields are only readable, and the
/// builder methods consume the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    level: LogLevel,
    message: String,
    #[serde(default, deserialize_with = "lenient_progress")]
    progress: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
}

/// Accepts integer, fractional (rounded) and null progress values
fn lenient_progress<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<f64>::deserialize(deserializer)?;
    Ok(raw.map(|value| value.round() as i64).unwrap_or(0))
}

impl LogRecord {
    pub fn new(level: LogLevel, message: impl Into<String>, progress: i64) -> Self {
        Self {
            level,
            message: message.into(),
            progress,
            data: None,
            timestamp: None,
        }
    }

    pub fn with_data(self, data: serde_json::Value) -> Self {
        Self {
            data: Some(data),
            ..self
        }
    }

    pub fn with_timestamp(self, timestamp: impl Into<String>) -> Self {
        Self {
            timestamp: Some(timestamp.into()),
            ..self
        }
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Progress exactly as the backend reported it
    pub fn progress(&self) -> i64 {
        self.progress
    }

    /// Progress clamped to 0..=100 for display
    pub fn percent(&self) -> u8 {
        self.progress.clamp(0, 100) as u8
    }

    pub fn data(&self) -> Option<&serde_json::Value> {
        self.data.as_ref()
    }

    pub fn timestamp(&self) -> Option<&str> {
        self.timestamp.as_deref()
    }

    /// Parses the timestamp when it is RFC 3339
    pub fn parsed_timestamp(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        let raw = self.timestamp.as_deref()?;
        chrono::DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|ts| ts.with_timezone(&chrono::Utc))
    }

    /// Short wall-clock form for consoles, falling back to the raw string
    pub fn display_time(&self) -> String {
        match (self.parsed_timestamp(), self.timestamp.as_deref()) {
            (Some(ts), _) => ts.format("%H:%M:%S").to_string(),
            (None, Some(raw)) => raw.to_string(),
            (None, None) => String::new(),
        }
    }
}

/// Lifecycle marker carried by a control frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlSignal {
    /// The job finished; no more records will arrive
    Completion,
    /// The server is closing the channel on purpose
    Disconnected,
}
