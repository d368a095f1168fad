//! Job domain types

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Opaque identifier of a backend ETL job
///
/// The backend reports ids either as JSON numbers or strings; both are kept
/// as their textual form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for JobId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Number(i64),
            Text(String),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Number(n) => JobId(n.to_string()),
            RawId::Text(s) => JobId(s),
        })
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        JobId(s.to_string())
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        JobId(s)
    }
}

impl From<u64> for JobId {
    fn from(n: u64) -> Self {
        JobId(n.to_string())
    }
}

/// Job execution status as reported by the list endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Finished,
    Error,
    Stuck,
    #[serde(other)]
    Unknown,
}

/// One entry of the job list
///
/// Only `id` and `status` matter for streaming; the rest is display metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: JobId,
    pub status: JobStatus,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub finished_at: Option<String>,
    #[serde(default)]
    pub records_count: Option<u64>,
    #[serde(default)]
    pub message: Option<String>,
}

impl JobSummary {
    pub fn is_running(&self) -> bool {
        self.status == JobStatus::Running
    }
}

/// Response of the run endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartedJob {
    #[serde(alias = "id")]
    pub log_id: JobId,
}
