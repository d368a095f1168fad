//! Job monitor
//!
//! Polls the job list and keeps at most one stream session attached to a
//! running job. The active session lives in a single slot owned by
//! `JobMonitor`; nothing else can open or replace it.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use etlwatch_client::{SessionEnd, SessionHandle};
use etlwatch_core::domain::job::{JobId, JobSummary};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::{JobSource, SessionEvent, SessionEvents, SessionOpener};
use crate::config::Config;
use crate::sink::PresentationSink;

/// User intent delivered to a running monitor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorCommand {
    /// Attach to this job now, replacing whatever is followed
    Follow(JobId),
    /// Stop following the current job and do not re-attach to it
    Stop,
    /// Refresh the job list immediately
    Refresh,
    Shutdown,
}

#[derive(Debug, Clone)]
struct Timing {
    poll_interval: Duration,
    attach_debounce: Duration,
    list_limit: u32,
    idle_timeout: Option<Duration>,
}

struct ActiveSession {
    generation: u64,
    handle: SessionHandle,
    last_activity: Instant,
}

type JobList = Result<Vec<JobSummary>>;

struct PendingAttach {
    job_id: JobId,
    due: Instant,
}

/// Supervisor that keeps a stream attached to the running job
pub struct JobMonitor<S, O, K> {
    source: Arc<S>,
    opener: O,
    sink: K,
    timing: Timing,
    active: Option<ActiveSession>,
    pending: Option<PendingAttach>,
    /// Jobs the user stopped following; never auto-attached again
    dismissed: HashSet<JobId>,
    generation: u64,
    events_tx: mpsc::UnboundedSender<(u64, SessionEvent)>,
    events_rx: mpsc::UnboundedReceiver<(u64, SessionEvent)>,
    /// List fetch in flight; it reports back through `lists_tx`
    refreshing: Option<JoinHandle<()>>,
    /// Another refresh was asked for while one was in flight
    refresh_again: bool,
    lists_tx: mpsc::UnboundedSender<JobList>,
    lists_rx: mpsc::UnboundedReceiver<JobList>,
}

impl<S, O, K> JobMonitor<S, O, K>
where
    S: JobSource + 'static,
    O: SessionOpener,
    K: PresentationSink,
{
    /// Creates a new monitor
    pub fn new(config: &Config, source: S, opener: O, sink: K) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (lists_tx, lists_rx) = mpsc::unbounded_channel();
        Self {
            source: Arc::new(source),
            opener,
            sink,
            timing: Timing {
                poll_interval: config.poll_interval,
                attach_debounce: config.attach_debounce,
                list_limit: config.list_limit,
                idle_timeout: config.idle_timeout,
            },
            active: None,
            pending: None,
            dismissed: HashSet::new(),
            generation: 0,
            events_tx,
            events_rx,
            refreshing: None,
            refresh_again: false,
            lists_tx,
            lists_rx,
        }
    }

    /// Job currently being followed, if any
    pub fn active_job(&self) -> Option<&JobId> {
        self.active.as_ref().map(|active| active.handle.job_id())
    }

    /// Runs until `Shutdown` arrives or the command channel closes
    pub async fn run(mut self, mut commands: mpsc::Receiver<MonitorCommand>) -> Result<K> {
        info!(
            "Starting job monitor (poll interval: {:?}, attach debounce: {:?})",
            self.timing.poll_interval, self.timing.attach_debounce
        );

        let mut ticker = time::interval(self.timing.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let attach_due = self.pending.as_ref().map(|pending| pending.due);
            let idle_due = self.idle_deadline();

            tokio::select! {
                _ = ticker.tick() => self.refresh(),
                Some(list) = self.lists_rx.recv() => self.on_job_list(list),
                Some((generation, event)) = self.events_rx.recv() => {
                    if self.on_session_event(generation, event) {
                        self.refresh();
                    }
                }
                _ = sleep_until(attach_due) => self.attach_pending(),
                _ = sleep_until(idle_due) => self.cancel_idle(),
                command = commands.recv() => match command {
                    Some(MonitorCommand::Follow(job_id)) => self.follow(job_id),
                    Some(MonitorCommand::Stop) => self.stop(),
                    Some(MonitorCommand::Refresh) => self.refresh(),
                    Some(MonitorCommand::Shutdown) | None => {
                        self.shutdown();
                        return Ok(self.sink);
                    }
                },
            }
        }
    }

    /// Starts a list fetch on its own task
    ///
    /// A slow or hung backend never blocks commands or session events; at
    /// most one fetch runs at a time.
    fn refresh(&mut self) {
        if self.refreshing.as_ref().is_some_and(|task| !task.is_finished()) {
            debug!("Job list refresh already in flight");
            self.refresh_again = true;
            return;
        }

        debug!("Refreshing job list");
        let source = Arc::clone(&self.source);
        let limit = self.timing.list_limit;
        let tx = self.lists_tx.clone();
        self.refreshing = Some(tokio::spawn(async move {
            // The monitor is gone; nobody wants the list anymore
            let _ = tx.send(source.fetch_jobs(limit).await);
        }));
    }

    fn on_job_list(&mut self, list: JobList) {
        if self.refreshing.as_ref().is_some_and(JoinHandle::is_finished) {
            self.refreshing = None;
        }
        match list {
            Ok(jobs) => self.apply_job_list(&jobs),
            Err(e) => error!("Failed to refresh job list: {:#}", e),
        }

        if std::mem::take(&mut self.refresh_again) {
            self.refresh();
        }
    }

    fn apply_job_list(&mut self, jobs: &[JobSummary]) {
        if let Some(active) = &self.active {
            let job_id = active.handle.job_id();
            if !jobs.iter().any(|job| &job.id == job_id && job.is_running()) {
                // The session ends itself on its control frame
                debug!("Job {} no longer reported running; waiting for its stream to end", job_id);
            }
            return;
        }

        let candidate = jobs
            .iter()
            .find(|job| job.is_running() && !self.dismissed.contains(&job.id));

        match candidate {
            Some(job) => {
                if self.pending.as_ref().is_some_and(|p| p.job_id == job.id) {
                    return;
                }
                debug!(
                    "Job {} is running; attaching in {:?}",
                    job.id, self.timing.attach_debounce
                );
                self.pending = Some(PendingAttach {
                    job_id: job.id.clone(),
                    due: Instant::now() + self.timing.attach_debounce,
                });
            }
            None => {
                if let Some(pending) = self.pending.take() {
                    debug!("Job {} stopped running before attach", pending.job_id);
                }
            }
        }
    }

    fn attach_pending(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };

        if self.active.is_some() {
            debug!("Skipping auto-attach to job {}: a session is already active", pending.job_id);
            return;
        }

        self.attach(pending.job_id);
    }

    fn attach(&mut self, job_id: JobId) {
        debug_assert!(self.active.is_none(), "second session while one is active");

        self.generation += 1;
        let events = SessionEvents::new(self.generation, self.events_tx.clone());
        let handle = self.opener.open(&job_id, events);

        info!("Attached to job {} (session #{})", job_id, self.generation);
        self.active = Some(ActiveSession {
            generation: self.generation,
            handle,
            last_activity: Instant::now(),
        });
    }

    /// Cancels the active session and reports it to the sink
    fn detach(&mut self) -> Option<JobId> {
        let active = self.active.take()?;
        active.handle.cancel();

        let job_id = active.handle.job_id().clone();
        self.sink.finished(&job_id, SessionEnd::Cancelled);
        Some(job_id)
    }

    fn follow(&mut self, job_id: JobId) {
        info!("Following job {} on request", job_id);
        self.pending = None;
        self.dismissed.remove(&job_id);
        self.detach();
        self.attach(job_id);
    }

    fn stop(&mut self) {
        let stopped = match self.detach() {
            Some(job_id) => Some(job_id),
            None => self.pending.take().map(|pending| pending.job_id),
        };

        match stopped {
            Some(job_id) => {
                info!("Stopped following job {}", job_id);
                self.dismissed.insert(job_id);
            }
            None => info!("Not following any job"),
        }
    }

    fn shutdown(&mut self) {
        info!("Shutting down job monitor");
        if let Some(task) = self.refreshing.take() {
            task.abort();
        }
        self.pending = None;
        self.detach();
    }

    fn idle_deadline(&self) -> Option<Instant> {
        let timeout = self.timing.idle_timeout?;
        self.active
            .as_ref()
            .map(|active| active.last_activity + timeout)
    }

    fn cancel_idle(&mut self) {
        if let Some(job_id) = self.detach() {
            warn!(
                "No stream activity for job {} in {:?}; detaching",
                job_id,
                self.timing.idle_timeout.unwrap_or_default()
            );
        }
    }

    /// Applies one session event
    ///
    /// Returns true when the active session ended and the job list should be
    /// refreshed right away. A failed session waits for the next poll so a
    /// broken stream endpoint is not hammered.
    fn on_session_event(&mut self, generation: u64, event: SessionEvent) -> bool {
        let Some(active) = self
            .active
            .as_mut()
            .filter(|active| active.generation == generation)
        else {
            debug!("Discarding event from stale session #{}", generation);
            return false;
        };

        active.last_activity = Instant::now();
        let job_id = active.handle.job_id().clone();

        match event {
            SessionEvent::Opened => self.sink.attached(&job_id),
            SessionEvent::Record(record) => self.sink.record(&job_id, &record),
            SessionEvent::Failed(error) => self.sink.failed(&job_id, &error),
            SessionEvent::Closed(end) => {
                self.active = None;
                self.sink.finished(&job_id, end);
                if end == SessionEnd::Failed {
                    info!("Stream for job {} failed; retrying after the next poll", job_id);
                    return false;
                }
                return true;
            }
        }

        false
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use etlwatch_client::{Protocol, SessionState, StreamSession};
    use etlwatch_core::domain::job::JobStatus;
    use etlwatch_core::domain::log::LogRecord;
    use futures_util::stream::{self, StreamExt};
    use std::sync::{Arc, Mutex};

    fn job(id: u64, status: JobStatus) -> JobSummary {
        JobSummary {
            id: JobId::from(id),
            status,
            started_at: None,
            finished_at: None,
            records_count: None,
            message: None,
        }
    }

    /// Job list that can be swapped between refreshes
    #[derive(Clone, Default)]
    struct ScriptedJobs {
        jobs: Arc<Mutex<Vec<JobSummary>>>,
    }

    impl ScriptedJobs {
        fn set(&self, jobs: Vec<JobSummary>) {
            *self.jobs.lock().unwrap() = jobs;
        }
    }

    #[async_trait]
    impl JobSource for ScriptedJobs {
        async fn fetch_jobs(&self, _limit: u32) -> anyhow::Result<Vec<JobSummary>> {
            Ok(self.jobs.lock().unwrap().clone())
        }
    }

    /// How a fake session behaves once opened
    #[derive(Clone, Copy)]
    enum Script {
        /// One record, then the connection stays open forever
        StayOpen,
        /// One record, then a completion frame
        Complete,
        /// The first read fails
        Fail,
    }

    #[derive(Clone)]
    struct FakeOpener {
        script: Script,
        opened: Arc<Mutex<Vec<SessionHandle>>>,
        overlaps: Arc<Mutex<usize>>,
    }

    impl FakeOpener {
        fn new(script: Script) -> Self {
            Self {
                script,
                opened: Arc::default(),
                overlaps: Arc::default(),
            }
        }

        fn opened_jobs(&self) -> Vec<String> {
            self.opened
                .lock()
                .unwrap()
                .iter()
                .map(|handle| handle.job_id().to_string())
                .collect()
        }

        fn handles(&self) -> Vec<SessionHandle> {
            self.opened.lock().unwrap().clone()
        }
    }

    impl SessionOpener for FakeOpener {
        fn open(&self, job_id: &JobId, events: SessionEvents) -> SessionHandle {
            let mut opened = self.opened.lock().unwrap();
            if opened.iter().any(SessionHandle::is_active) {
                *self.overlaps.lock().unwrap() += 1;
            }

            let first = format!(
                "data: {}\n\n",
                serde_json::to_string(&LogRecord::new(
                    etlwatch_core::domain::log::LogLevel::Info,
                    format!("job {job_id} started"),
                    5
                ))
                .unwrap()
            );
            let chunks = vec![Ok::<_, std::io::Error>(Bytes::from(first))];
            let session = match self.script {
                Script::StayOpen => StreamSession::from_byte_stream(
                    job_id.clone(),
                    Protocol::default(),
                    stream::iter(chunks).chain(stream::pending()),
                ),
                Script::Fail => StreamSession::from_byte_stream(
                    job_id.clone(),
                    Protocol::default(),
                    stream::iter(vec![Err::<Bytes, _>(std::io::Error::other(
                        "connection reset",
                    ))]),
                ),
                Script::Complete => {
                    let mut chunks = chunks;
                    chunks.push(Ok(Bytes::from_static(b"data: {\"type\":\"completed\"}\n\n")));
                    StreamSession::from_byte_stream(
                        job_id.clone(),
                        Protocol::default(),
                        stream::iter(chunks),
                    )
                }
            };

            let handle = events.spawn(session);
            opened.push(handle.clone());
            handle
        }
    }

    #[derive(Clone, Default)]
    struct RecordingSink {
        lines: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingSink {
        fn lines(&self) -> Vec<String> {
            self.lines.lock().unwrap().clone()
        }
    }

    impl PresentationSink for RecordingSink {
        fn attached(&mut self, job_id: &JobId) {
            self.lines.lock().unwrap().push(format!("attached {job_id}"));
        }

        fn record(&mut self, job_id: &JobId, record: &LogRecord) {
            self.lines
                .lock()
                .unwrap()
                .push(format!("record {job_id} {}", record.message()));
        }

        fn failed(&mut self, job_id: &JobId, error: &str) {
            self.lines.lock().unwrap().push(format!("failed {job_id} {error}"));
        }

        fn finished(&mut self, job_id: &JobId, end: SessionEnd) {
            self.lines
                .lock()
                .unwrap()
                .push(format!("finished {job_id} {end:?}"));
        }
    }

    fn config() -> Config {
        Config {
            poll_interval: Duration::from_secs(5),
            attach_debounce: Duration::from_millis(500),
            ..Config::default()
        }
    }

    struct Harness {
        jobs: ScriptedJobs,
        opener: FakeOpener,
        sink: RecordingSink,
        commands: mpsc::Sender<MonitorCommand>,
        task: tokio::task::JoinHandle<Result<RecordingSink>>,
    }

    fn start(config: Config, jobs: Vec<JobSummary>, script: Script) -> Harness {
        let source = ScriptedJobs::default();
        source.set(jobs);
        let opener = FakeOpener::new(script);
        let sink = RecordingSink::default();
        let (commands, rx) = mpsc::channel(8);

        let monitor = JobMonitor::new(&config, source.clone(), opener.clone(), sink.clone());
        let task = tokio::spawn(monitor.run(rx));

        Harness {
            jobs: source,
            opener,
            sink,
            commands,
            task,
        }
    }

    async fn advance(by: Duration) {
        time::sleep(by).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_attaches_to_running_job_after_debounce() {
        let h = start(
            config(),
            vec![job(41, JobStatus::Finished), job(42, JobStatus::Running)],
            Script::StayOpen,
        );

        advance(Duration::from_millis(100)).await;
        assert!(h.opener.opened_jobs().is_empty(), "attached before debounce");

        advance(Duration::from_millis(600)).await;
        assert_eq!(h.opener.opened_jobs(), vec!["42"]);

        advance(Duration::from_secs(30)).await;
        assert_eq!(h.opener.opened_jobs(), vec!["42"]);
        assert_eq!(
            h.sink.lines(),
            vec!["attached 42".to_string(), "record 42 job 42 started".to_string()]
        );

        h.commands.send(MonitorCommand::Shutdown).await.unwrap();
        h.task.await.unwrap().unwrap();
        let handle = &h.opener.handles()[0];
        handle.closed().await;
        assert_eq!(handle.state(), SessionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finished_jobs_are_never_attached() {
        let h = start(
            config(),
            vec![job(1, JobStatus::Finished), job(2, JobStatus::Error), job(3, JobStatus::Stuck)],
            Script::StayOpen,
        );

        advance(Duration::from_secs(60)).await;
        assert!(h.opener.opened_jobs().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_more_than_one_session() {
        let h = start(
            config(),
            vec![
                job(1, JobStatus::Running),
                job(2, JobStatus::Running),
                job(3, JobStatus::Running),
            ],
            Script::Complete,
        );

        for _ in 0..40 {
            advance(Duration::from_millis(250)).await;
            let active = h
                .opener
                .handles()
                .iter()
                .filter(|handle| handle.is_active())
                .count();
            assert!(active <= 1, "{active} sessions active at once");
        }

        assert!(h.opener.opened_jobs().len() > 1, "completed sessions are replaced");
        assert_eq!(*h.opener.overlaps.lock().unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_frees_the_slot() {
        let h = start(config(), vec![job(42, JobStatus::Running)], Script::Complete);

        advance(Duration::from_millis(400)).await;
        h.jobs.set(vec![job(42, JobStatus::Finished), job(43, JobStatus::Running)]);

        // 42 attaches at 500ms and completes; the refresh that follows
        // schedules 43 well before the next poll tick
        advance(Duration::from_millis(700)).await;

        assert_eq!(h.opener.opened_jobs(), vec!["42", "43"]);
        let lines = h.sink.lines();
        assert!(lines.contains(&"finished 42 Control(Completion)".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_sticky_for_that_job() {
        let h = start(
            config(),
            vec![job(7, JobStatus::Running), job(8, JobStatus::Running)],
            Script::StayOpen,
        );

        advance(Duration::from_millis(600)).await;
        assert_eq!(h.opener.opened_jobs(), vec!["7"]);

        h.commands.send(MonitorCommand::Stop).await.unwrap();
        advance(Duration::from_secs(20)).await;

        assert_eq!(h.opener.opened_jobs(), vec!["7", "8"]);
        assert_eq!(h.opener.handles()[0].state(), SessionState::Closed);
        assert!(h.sink.lines().contains(&"finished 7 Cancelled".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_follow_preempts_pending_auto_attach() {
        let h = start(config(), vec![job(5, JobStatus::Running)], Script::StayOpen);

        advance(Duration::from_millis(10)).await;
        h.commands
            .send(MonitorCommand::Follow(JobId::from("9")))
            .await
            .unwrap();
        advance(Duration::from_secs(12)).await;

        assert_eq!(h.opener.opened_jobs(), vec!["9"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_follow_replaces_active_session() {
        let h = start(config(), vec![job(1, JobStatus::Running)], Script::StayOpen);

        advance(Duration::from_millis(600)).await;
        h.commands
            .send(MonitorCommand::Follow(JobId::from("2")))
            .await
            .unwrap();
        advance(Duration::from_millis(50)).await;

        let handles = h.opener.handles();
        assert_eq!(h.opener.opened_jobs(), vec!["1", "2"]);
        assert!(!handles[0].is_active());
        assert!(handles[1].is_active());
        assert_eq!(*h.opener.overlaps.lock().unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_session_is_detached() {
        let config = Config {
            idle_timeout: Some(Duration::from_secs(30)),
            ..config()
        };
        let h = start(config, vec![job(3, JobStatus::Running)], Script::StayOpen);

        advance(Duration::from_millis(600)).await;
        advance(Duration::from_secs(31)).await;

        let handles = h.opener.handles();
        assert!(!handles[0].is_active());
        assert!(h.sink.lines().contains(&"finished 3 Cancelled".to_string()));
    }

    #[tokio::test]
    async fn test_stale_session_events_are_discarded() {
        let opener = FakeOpener::new(Script::StayOpen);
        let sink = RecordingSink::default();
        let mut monitor =
            JobMonitor::new(&config(), ScriptedJobs::default(), opener.clone(), sink.clone());

        monitor.follow(JobId::from("1"));
        monitor.follow(JobId::from("2"));
        assert_eq!(monitor.active_job(), Some(&JobId::from("2")));

        let stale = LogRecord::new(etlwatch_core::domain::log::LogLevel::Info, "old", 1);
        assert!(!monitor.on_session_event(1, SessionEvent::Record(stale)));
        assert!(!monitor.on_session_event(1, SessionEvent::Closed(SessionEnd::Cancelled)));
        assert_eq!(monitor.active_job(), Some(&JobId::from("2")));

        assert!(monitor.on_session_event(2, SessionEvent::Closed(SessionEnd::EndOfStream)));
        assert!(monitor.active_job().is_none());
        assert_eq!(
            sink.lines(),
            vec!["finished 1 Cancelled".to_string(), "finished 2 EndOfStream".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_stream_waits_for_next_poll() {
        let h = start(config(), vec![job(42, JobStatus::Running)], Script::Fail);

        advance(Duration::from_secs(10)).await;

        let opened = h.opener.opened_jobs().len();
        assert!((1..=3).contains(&opened), "{opened} sessions in 10s");
        assert!(h.sink.lines().iter().any(|line| line.starts_with("failed 42")));
        assert!(h.sink.lines().contains(&"finished 42 Failed".to_string()));
    }

    /// Backend whose list endpoint never answers
    struct HungSource;

    #[async_trait]
    impl JobSource for HungSource {
        async fn fetch_jobs(&self, _limit: u32) -> anyhow::Result<Vec<JobSummary>> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_list_fetch_does_not_block_commands() {
        let opener = FakeOpener::new(Script::StayOpen);
        let (commands, rx) = mpsc::channel(8);
        let monitor = JobMonitor::new(&config(), HungSource, opener.clone(), RecordingSink::default());
        let task = tokio::spawn(monitor.run(rx));

        advance(Duration::from_millis(10)).await;
        commands
            .send(MonitorCommand::Follow(JobId::from("9")))
            .await
            .unwrap();
        commands.send(MonitorCommand::Refresh).await.unwrap();
        advance(Duration::from_millis(10)).await;
        assert_eq!(opener.opened_jobs(), vec!["9"]);

        commands.send(MonitorCommand::Shutdown).await.unwrap();
        let sink = time::timeout(Duration::from_secs(1), task)
            .await
            .expect("monitor shuts down while a fetch hangs")
            .unwrap()
            .unwrap();
        assert!(sink.lines().contains(&"finished 9 Cancelled".to_string()));
    }
}
