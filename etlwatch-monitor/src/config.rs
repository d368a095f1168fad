//! Monitor configuration
//!
//! Defines all configurable parameters for the monitor including the backend
//! connection, polling and attach timing, and the inactivity policy.

use std::time::Duration;

use etlwatch_client::{DashboardClient, Endpoint};

/// Bound on establishing any connection, streams included
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Monitor configuration
///
/// All intervals are configurable to allow tuning for different deployments
/// (local backend vs. a slow remote one).
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend base URL (e.g., "http://localhost:8000")
    pub base_url: String,

    /// Base path of the endpoint family to watch (e.g., "/api/etl/chart")
    pub endpoint: String,

    /// Bearer token sent with every request
    pub token: Option<String>,

    /// How often to refresh the job list
    pub poll_interval: Duration,

    /// Delay between spotting a running job and attaching to it
    pub attach_debounce: Duration,

    /// Page size used when refreshing the job list
    pub list_limit: u32,

    /// Cancel a session that delivered nothing for this long
    pub idle_timeout: Option<Duration>,

    /// Deadline for list, detail and start requests (streams are exempt)
    pub request_timeout: Duration,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            endpoint: "/api/etl".to_string(),
            token: None,
            poll_interval: Duration::from_secs(5),
            attach_debounce: Duration::from_millis(500),
            list_limit: 20,
            idle_timeout: None,
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Recognized environment variables (all optional):
    /// - ETLWATCH_URL (default: http://localhost:8000)
    /// - ETLWATCH_ENDPOINT (default: /api/etl)
    /// - ETLWATCH_TOKEN
    /// - ETLWATCH_POLL_INTERVAL (seconds, default: 5)
    /// - ETLWATCH_ATTACH_DEBOUNCE_MS (default: 500)
    /// - ETLWATCH_LIST_LIMIT (default: 20)
    /// - ETLWATCH_IDLE_TIMEOUT (seconds, default: none)
    /// - ETLWATCH_REQUEST_TIMEOUT (seconds, default: 30)
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Some(url) = lookup("ETLWATCH_URL") {
            config.base_url = url;
        }

        if let Some(endpoint) = lookup("ETLWATCH_ENDPOINT") {
            config.endpoint = endpoint;
        }

        config.token = lookup("ETLWATCH_TOKEN").filter(|token| !token.is_empty());

        if let Some(raw) = lookup("ETLWATCH_POLL_INTERVAL") {
            let secs = raw
                .parse::<u64>()
                .map_err(|_| anyhow::anyhow!("ETLWATCH_POLL_INTERVAL must be a number of seconds, got {raw:?}"))?;
            config.poll_interval = Duration::from_secs(secs);
        }

        if let Some(raw) = lookup("ETLWATCH_ATTACH_DEBOUNCE_MS") {
            let millis = raw
                .parse::<u64>()
                .map_err(|_| anyhow::anyhow!("ETLWATCH_ATTACH_DEBOUNCE_MS must be a number of milliseconds, got {raw:?}"))?;
            config.attach_debounce = Duration::from_millis(millis);
        }

        if let Some(raw) = lookup("ETLWATCH_LIST_LIMIT") {
            config.list_limit = raw
                .parse::<u32>()
                .map_err(|_| anyhow::anyhow!("ETLWATCH_LIST_LIMIT must be a positive number, got {raw:?}"))?;
        }

        if let Some(raw) = lookup("ETLWATCH_IDLE_TIMEOUT") {
            let secs = raw
                .parse::<u64>()
                .map_err(|_| anyhow::anyhow!("ETLWATCH_IDLE_TIMEOUT must be a number of seconds, got {raw:?}"))?;
            config.idle_timeout = Some(Duration::from_secs(secs));
        }

        if let Some(raw) = lookup("ETLWATCH_REQUEST_TIMEOUT") {
            let secs = raw
                .parse::<u64>()
                .map_err(|_| anyhow::anyhow!("ETLWATCH_REQUEST_TIMEOUT must be a number of seconds, got {raw:?}"))?;
            config.request_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.base_url.is_empty() {
            anyhow::bail!("base_url cannot be empty");
        }

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            anyhow::bail!("base_url must start with http:// or https://");
        }

        if self.poll_interval.is_zero() {
            anyhow::bail!("poll_interval must be greater than 0");
        }

        if self.list_limit == 0 {
            anyhow::bail!("list_limit must be greater than 0");
        }

        if self.request_timeout.is_zero() {
            anyhow::bail!("request_timeout must be greater than 0");
        }

        if self.idle_timeout.is_some_and(|timeout| timeout.is_zero()) {
            anyhow::bail!("idle_timeout must be greater than 0 when set");
        }

        Ok(())
    }

    /// Builds the HTTP client for the configured endpoint
    ///
    /// Connecting is bounded for every request; the overall request timeout
    /// applies to everything but live streams.
    pub fn client(&self) -> anyhow::Result<DashboardClient> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        let client = DashboardClient::with_client(
            self.base_url.clone(),
            Endpoint::new(&self.endpoint),
            http,
        )
        .with_request_timeout(self.request_timeout);

        Ok(match &self.token {
            Some(token) => client.with_token(token.clone()),
            None => client,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new("http://localhost:8000".to_string())
    }
}
