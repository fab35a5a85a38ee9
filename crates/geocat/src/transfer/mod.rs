//! Concurrent batch execution of independent transfer jobs.

mod engine;
mod job;

pub use engine::{BatchEngine, BatchJob, BatchResult, JobFailure};
pub use job::{TransferDirection, TransferJob};
