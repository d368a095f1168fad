//! Supervisor layer
//!
//! Decides which job, if any, is being streamed. The job list and the
//! session transport sit behind traits so the decision logic can be driven
//! by scripted inputs.

pub mod monitor;

pub use monitor::{JobMonitor, MonitorCommand};

use async_trait::async_trait;
use etlwatch_client::{
    ClientError, DashboardClient, SessionEnd, SessionHandle, StreamHandler, StreamSession,
};
use etlwatch_core::domain::job::{JobId, JobSummary};
use etlwatch_core::domain::log::LogRecord;
use tokio::sync::mpsc;

/// Source of the job list
#[async_trait]
pub trait JobSource: Send + Sync {
    /// Fetches the most recent `limit` jobs
    async fn fetch_jobs(&self, limit: u32) -> anyhow::Result<Vec<JobSummary>>;
}

#[async_trait]
impl JobSource for DashboardClient {
    async fn fetch_jobs(&self, limit: u32) -> anyhow::Result<Vec<JobSummary>> {
        Ok(self.list_jobs(limit, 0).await?)
    }
}

/// Opens stream sessions on behalf of the supervisor
pub trait SessionOpener: Send + Sync {
    /// Starts a session for `job_id` that reports through `events`
    fn open(&self, job_id: &JobId, events: SessionEvents) -> SessionHandle;
}

impl SessionOpener for DashboardClient {
    fn open(&self, job_id: &JobId, events: SessionEvents) -> SessionHandle {
        events.spawn(self.stream_session(job_id))
    }
}

/// What a session reports back to the supervisor
#[derive(Debug)]
pub enum SessionEvent {
    Opened,
    Record(LogRecord),
    Failed(String),
    Closed(SessionEnd),
}

/// Stream handler that forwards callbacks to the supervisor
///
/// Every event is tagged with the generation of the session that produced
/// it, so the supervisor can tell a stale session from the current one.
pub struct SessionEvents {
    generation: u64,
    tx: mpsc::UnboundedSender<(u64, SessionEvent)>,
}

impl SessionEvents {
    pub(crate) fn new(generation: u64, tx: mpsc::UnboundedSender<(u64, SessionEvent)>) -> Self {
        Self { generation, tx }
    }

    fn send(&self, event: SessionEvent) {
        // The supervisor is gone; nobody is listening anymore
        let _ = self.tx.send((self.generation, event));
    }

    /// Runs `session` on a new task and reports its end as `Closed`
    pub fn spawn(self, session: StreamSession) -> SessionHandle {
        let handle = session.handle();
        tokio::spawn(async move {
            let mut events = self;
            let end = session.run(&mut events).await;
            events.send(SessionEvent::Closed(end));
        });
        handle
    }
}

impl StreamHandler for SessionEvents {
    fn on_open(&mut self) {
        self.send(SessionEvent::Opened);
    }

    fn on_record(&mut self, record: LogRecord) {
        self.send(SessionEvent::Record(record));
    }

    fn on_error(&mut self, error: ClientError) {
        self.send(SessionEvent::Failed(error.to_string()));
    }
}
