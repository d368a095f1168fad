//! etlwatch HTTP Client
//!
//! A type-safe client for the ETL dashboard backend: job listing, job start,
//! and live log streaming.
//!
//! One client talks to one endpoint family (for example the category-subject
//! fetch or the chart fetch). Endpoints differ only in their base path and,
//! occasionally, in the stream's control tokens, so both are configuration.
//!
//! # Example
//!
//! ```no_run
//! use etlwatch_client::{DashboardClient, Endpoint};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = DashboardClient::new("http://localhost:8000", Endpoint::new("/api/etl/chart"));
//!
//!     for job in client.list_jobs(20, 0).await? {
//!         println!("{} {:?}", job.id, job.status);
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
mod jobs;
pub mod session;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use etlwatch_core::stream::Protocol;
pub use session::{SessionEnd, SessionHandle, SessionState, StreamHandler, StreamSession};

use std::time::Duration;

use etlwatch_core::domain::job::JobId;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;

/// Base path of one endpoint family, e.g. `/api/etl/chart`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    base_path: String,
}

impl Endpoint {
    pub fn new(base_path: impl Into<String>) -> Self {
        let base_path = base_path.into();
        let trimmed = base_path.trim_matches('/');
        Self {
            base_path: if trimmed.is_empty() {
                String::new()
            } else {
                format!("/{}", trimmed)
            },
        }
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    fn logs(&self) -> String {
        format!("{}/logs", self.base_path)
    }

    fn log(&self, id: &JobId) -> String {
        format!("{}/logs/{}", self.base_path, id)
    }

    fn run(&self) -> String {
        format!("{}/run", self.base_path)
    }

    fn stream(&self) -> String {
        format!("{}/stream", self.base_path)
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new("/api/etl")
    }
}

/// HTTP client for one dashboard endpoint family
#[derive(Debug, Clone)]
pub struct DashboardClient {
    /// Base URL of the backend (e.g., "http://localhost:8000")
    base_url: String,
    endpoint: Endpoint,
    protocol: Protocol,
    /// Bearer token attached to every request, if any
    token: Option<String>,
    /// Overall deadline for list, detail and start requests (never streams)
    request_timeout: Option<Duration>,
    /// HTTP client instance
    client: Client,
}

impl DashboardClient {
    /// Create a new client
    ///
    /// # Arguments
    /// * `base_url` - The backend base URL (e.g., "http://localhost:8000")
    /// * `endpoint` - The endpoint family to talk to
    pub fn new(base_url: impl Into<String>, endpoint: Endpoint) -> Self {
        Self::with_client(base_url, endpoint, Client::new())
    }

    /// Create a new client with a custom HTTP client
    ///
    /// Streams are long-lived: a client with an overall request timeout will
    /// cut live sessions off when it expires. Prefer `connect_timeout`.
    pub fn with_client(base_url: impl Into<String>, endpoint: Endpoint, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            endpoint,
            protocol: Protocol::default(),
            token: None,
            request_timeout: None,
            client,
        }
    }

    /// Attach a bearer token to every request
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Bound every non-streaming request by `timeout`
    ///
    /// Stream sessions are exempt; they run for as long as the job does.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Override the stream's wire tokens for this endpoint
    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Get the base URL of the backend
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Authorize a short-lived request and apply the request timeout
    fn prepare(&self, request: RequestBuilder) -> RequestBuilder {
        let request = self.authorize(request);
        match self.request_timeout {
            Some(timeout) => request.timeout(timeout),
            None => request,
        }
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Check the status code and turn failures into `ClientError::ApiError`
    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        Ok(response)
    }

    /// Handle an API response and deserialize JSON
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        Self::check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }
}
