//! etlwatch Monitor
//!
//! Keeps a live log stream attached to whichever ETL job is currently running.
//!
//! Architecture:
//! - Configuration: settings from environment or defaults
//! - Supervisor: list polling, auto-attach with debounce, the single active session
//! - Sink: presentation of attached jobs, records and progress
//!
//! The supervisor polls the job list, opens at most one stream session at a
//! time and forwards what it delivers to a presentation sink.

pub mod config;
pub mod sink;
pub mod supervisor;

pub use config::Config;
pub use sink::{ConsoleSink, PresentationSink, SinkHandler};
pub use supervisor::{JobMonitor, JobSource, MonitorCommand, SessionEvents, SessionOpener};
