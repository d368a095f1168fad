//! etlwatch Core
//!
//! Core types and decoding for the etlwatch ETL log tailer.
//!
//! This crate contains:
//! - Domain types: jobs, log records, control signals and progress tracking
//! - Stream decoding: the frame decoder and record parser for the live log stream
//!
//! Note: Networking lives in `etlwatch-client`, supervision in `etlwatch-monitor`.

pub mod domain;
pub mod stream;
