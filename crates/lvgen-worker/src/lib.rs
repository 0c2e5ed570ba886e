//! Lane worker.
//!
//! This crate provides:
//! - The lane executor with ack-late delivery, crash recovery and a DLQ
//! - Generation jobs: provider calls with transient-only retries,
//!   cooperative cancellation and local caching of outputs
//! - Segment aggregation and group finalization, including combination of
//!   the segment videos
//! - Graceful shutdown

pub mod cancel_watch;
pub mod config;
pub mod error;
pub mod executor;
pub mod finalize;
pub mod logging;
pub mod metrics;
pub mod processor;
pub mod retry;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::{ExecutorExit, JobDisposition, LaneExecutor};
pub use logging::JobLogger;
pub use processor::JobProcessor;
pub use retry::RetryPolicy;
