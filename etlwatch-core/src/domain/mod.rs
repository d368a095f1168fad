//! Core domain types
//!
//! These types describe what the backend reports about ETL jobs and what a
//! live log stream carries. They are shared between the HTTP client (which
//! deserializes them) and the monitor (which renders them).

pub mod job;
pub mod log;
pub mod progress;
