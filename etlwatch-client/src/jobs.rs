//! Job list, detail and start endpoints

use crate::DashboardClient;
use crate::error::Result;
use etlwatch_core::domain::job::{JobId, JobSummary, StartedJob};
use serde::Deserialize;

/// The list endpoint answers either with a bare array or a paged envelope
#[derive(Deserialize)]
#[serde(untagged)]
enum JobList {
    Bare(Vec<JobSummary>),
    Paged { items: Vec<JobSummary> },
}

impl DashboardClient {
    /// List recent job runs, newest first as the backend orders them
    ///
    /// # Arguments
    /// * `limit` - Page size
    /// * `offset` - Number of entries to skip
    pub async fn list_jobs(&self, limit: u32, offset: u32) -> Result<Vec<JobSummary>> {
        let url = self.url(&self.endpoint.logs());
        let request = self
            .client
            .get(&url)
            .query(&[("limit", limit), ("offset", offset)]);
        let response = self.prepare(request).send().await?;

        let list: JobList = self.handle_response(response).await?;
        Ok(match list {
            JobList::Bare(items) | JobList::Paged { items } => items,
        })
    }

    /// Get a single job run
    pub async fn get_job(&self, id: &JobId) -> Result<JobSummary> {
        let url = self.url(&self.endpoint.log(id));
        let response = self.prepare(self.client.get(&url)).send().await?;

        self.handle_response(response).await
    }

    /// Start a new job run
    ///
    /// # Arguments
    /// * `parameters` - JSON body forwarded to the run endpoint
    ///
    /// # Returns
    /// The id to stream the new run's log with
    pub async fn start_job(&self, parameters: &serde_json::Value) -> Result<JobId> {
        let url = self.url(&self.endpoint.run());
        let request = self.client.post(&url).json(parameters);
        let response = self.prepare(request).send().await?;

        let started: StartedJob = self.handle_response(response).await?;
        tracing::info!("Started job {}", started.log_id);
        Ok(started.log_id)
    }
}
