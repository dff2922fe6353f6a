//! Queue consumer for compile and workflow jobs.
//!
//! A worker dequeues one job at a time, owns its row until it is terminal,
//! and publishes lifecycle events on the `jobs` channel. Workflow jobs run
//! the orchestrator on the blocking pool inside a per-job work directory.

pub mod bundle;
pub mod config;
pub mod context;
pub mod error;
pub mod jobs;
pub mod runner;
pub mod sweeper;

pub use config::{WorkerConfig, WorkerConfigError};
pub use context::WorkerContext;
pub use error::JobError;
pub use runner::Worker;
