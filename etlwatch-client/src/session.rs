//! Live log stream session
//!
//! A `StreamSession` owns one long-lived connection to the stream endpoint.
//! It feeds every chunk of the response body through the frame decoder and
//! record parser and hands the results to a `StreamHandler`, in arrival
//! order, until one of four things ends it:
//!
//! - a control frame (`on_control`, then the session closes the connection)
//! - a transport failure (`on_error`)
//! - the end of the response body
//! - `SessionHandle::cancel` (no callback at all)
//!
//! Exactly one of these ends a session. A session is never reused once
//! `Closed`; attaching again means building a new one.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use bytes::Bytes;
use etlwatch_core::domain::job::JobId;
use etlwatch_core::domain::log::{ControlSignal, LogRecord};
use etlwatch_core::stream::{FrameError, LogStreamDecoder, Parsed, Protocol};
use futures_util::stream::{BoxStream, Stream, StreamExt};
use reqwest::RequestBuilder;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::DashboardClient;
use crate::error::ClientError;

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl SessionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => SessionState::Connecting,
            1 => SessionState::Open,
            2 => SessionState::Closing,
            _ => SessionState::Closed,
        }
    }
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    Control(ControlSignal),
    EndOfStream,
    Failed,
    Cancelled,
}

/// Callbacks driven by a session
///
/// All callbacks run on the session's task, one at a time.
pub trait StreamHandler: Send {
    /// The server accepted the request; called once, before any record
    fn on_open(&mut self) {}

    fn on_record(&mut self, record: LogRecord);

    /// A terminal control frame arrived; called at most once
    fn on_control(&mut self, _signal: ControlSignal) {}

    /// The transport failed; called at most once
    fn on_error(&mut self, _error: ClientError) {}

    /// A frame was dropped. The session has already logged it.
    fn on_warning(&mut self, _error: &FrameError) {}
}

#[derive(Debug)]
struct StateCell(AtomicU8);

impl StateCell {
    fn new() -> Self {
        Self(AtomicU8::new(SessionState::Connecting as u8))
    }

    fn get(&self) -> SessionState {
        SessionState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn transition(&self, from: SessionState, to: SessionState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Moves a live session to `Closing`; false if it was already closing
    fn begin_closing(&self) -> bool {
        self.transition(SessionState::Connecting, SessionState::Closing)
            || self.transition(SessionState::Open, SessionState::Closing)
    }

    fn close(&self) {
        self.0.store(SessionState::Closed as u8, Ordering::Release);
    }
}

/// Cheap, cloneable handle to a session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    job_id: JobId,
    state: Arc<StateCell>,
    cancel: CancellationToken,
    finished: CancellationToken,
}

impl SessionHandle {
    fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            state: Arc::new(StateCell::new()),
            cancel: CancellationToken::new(),
            finished: CancellationToken::new(),
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    /// Connecting or Open
    pub fn is_active(&self) -> bool {
        matches!(
            self.state(),
            SessionState::Connecting | SessionState::Open
        )
    }

    /// Stops the session and releases its connection
    ///
    /// Called from inside a callback, no further callback starts. Called from
    /// another task, a callback already being dispatched may still run, so
    /// callers drop whatever arrives after cancelling. Calling it again, or
    /// after the session ended on its own, does nothing.
    pub fn cancel(&self) {
        if self.state.begin_closing() {
            debug!("Cancelling stream session for job {}", self.job_id);
        }
        self.cancel.cancel();
    }

    /// Resolves once the session reached `Closed`
    pub async fn closed(&self) {
        self.finished.cancelled().await;
    }
}

enum Source {
    Http(RequestBuilder),
    Bytes(BoxStream<'static, Result<Bytes, ClientError>>),
}

/// One live connection to a job's log stream
pub struct StreamSession {
    handle: SessionHandle,
    protocol: Protocol,
    source: Source,
}

impl StreamSession {
    /// Builds a session over an arbitrary byte stream
    ///
    /// The stream stands in for an already-accepted response body, so
    /// `on_open` fires immediately when the session runs. Useful for
    /// replaying captured streams.
    pub fn from_byte_stream<S, E>(job_id: JobId, protocol: Protocol, stream: S) -> Self
    where
        S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
        E: Into<ClientError>,
    {
        Self {
            handle: SessionHandle::new(job_id),
            protocol,
            source: Source::Bytes(
                stream
                    .map(|chunk| chunk.map_err(Into::<ClientError>::into))
                    .boxed(),
            ),
        }
    }

    pub fn job_id(&self) -> &JobId {
        self.handle.job_id()
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Runs the session on a new task
    pub fn spawn<H>(self, mut handler: H) -> SessionHandle
    where
        H: StreamHandler + 'static,
    {
        let handle = self.handle();
        tokio::spawn(async move {
            self.run(&mut handler).await;
        });
        handle
    }

    /// Runs the session to its end on the current task
    pub async fn run<H>(self, handler: &mut H) -> SessionEnd
    where
        H: StreamHandler + ?Sized,
    {
        let StreamSession {
            handle,
            protocol,
            source,
        } = self;

        let end = drive(&handle, protocol, source, handler).await;

        handle.state.close();
        handle.finished.cancel();
        info!("Stream session for job {} closed: {:?}", handle.job_id, end);
        end
    }
}

async fn drive<H>(
    handle: &SessionHandle,
    protocol: Protocol,
    source: Source,
    handler: &mut H,
) -> SessionEnd
where
    H: StreamHandler + ?Sized,
{
    let cancel = &handle.cancel;

    let mut body = match source {
        Source::Bytes(stream) => stream,
        Source::Http(request) => {
            debug!("Connecting stream for job {}", handle.job_id);
            let connected = tokio::select! {
                biased;
                _ = cancel.cancelled() => return SessionEnd::Cancelled,
                response = request.send() => response,
            };
            let response = match connected {
                Ok(response) => response,
                Err(e) => return fail(handle, handler, e.into()),
            };
            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => return SessionEnd::Cancelled,
                checked = DashboardClient::check_status(response) => checked,
            };
            match response {
                Ok(response) => response
                    .bytes_stream()
                    .map(|chunk| chunk.map_err(ClientError::from))
                    .boxed(),
                Err(e) => return fail(handle, handler, e),
            }
        }
    };

    if !handle
        .state
        .transition(SessionState::Connecting, SessionState::Open)
    {
        return SessionEnd::Cancelled;
    }
    handler.on_open();

    let mut decoder = LogStreamDecoder::new(protocol);

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return SessionEnd::Cancelled,
            next = body.next() => next,
        };

        let chunk = match next {
            Some(Ok(chunk)) => chunk,
            Some(Err(e)) => return fail(handle, handler, e),
            None => {
                if decoder.pending_bytes() > 0 {
                    debug!(
                        "Discarding {} bytes of unterminated frame for job {}",
                        decoder.pending_bytes(),
                        handle.job_id
                    );
                }
                return SessionEnd::EndOfStream;
            }
        };

        for parsed in decoder.push(&chunk) {
            if cancel.is_cancelled() {
                return SessionEnd::Cancelled;
            }

            match parsed {
                Ok(Parsed::Record(record)) => handler.on_record(record),
                Ok(Parsed::Control(signal)) => {
                    if !handle.state.begin_closing() {
                        return SessionEnd::Cancelled;
                    }
                    handler.on_control(signal);
                    return SessionEnd::Control(signal);
                }
                Ok(Parsed::EndMarker) => {
                    debug!("End-of-data marker on stream for job {}", handle.job_id);
                }
                Err(e) => {
                    warn!("Dropped frame on stream for job {}: {}", handle.job_id, e);
                    handler.on_warning(&e);
                }
            }
        }
    }
}

fn fail<H>(handle: &SessionHandle, handler: &mut H, error: ClientError) -> SessionEnd
where
    H: StreamHandler + ?Sized,
{
    if !handle.state.begin_closing() {
        return SessionEnd::Cancelled;
    }
    warn!("Stream for job {} failed: {}", handle.job_id, error);
    handler.on_error(error);
    SessionEnd::Failed
}

impl DashboardClient {
    // =============================================================================
    // Log Streaming
    // =============================================================================

    /// Build a session for a job's live log without starting it
    pub fn stream_session(&self, job_id: &JobId) -> StreamSession {
        let url = self.url(&self.endpoint.stream());
        let request = self
            .client
            .get(&url)
            .query(&[("log_id", job_id.as_str())])
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache");

        StreamSession {
            handle: SessionHandle::new(job_id.clone()),
            protocol: self.protocol.clone(),
            source: Source::Http(self.authorize(request)),
        }
    }

    /// Open a job's live log on a new task
    ///
    /// # Returns
    /// The handle used to observe and cancel the session
    pub fn open_stream<H>(&self, job_id: &JobId, handler: H) -> SessionHandle
    where
        H: StreamHandler + 'static,
    {
        self.stream_session(job_id).spawn(handler)
    }
}
