//! Background job system with bounded concurrency, retry and backoff.
//!
//! ## Components
//!
//! - `Job`: a typed unit of work with its attempt history
//! - `JobStore`: full-record persistence (in-memory or one file per job)
//! - `JobQueue`: FIFO admission, worker dispatch, retry scheduling, recovery
//! - `JobWorker`: the seam job types plug into

pub mod queue;
pub mod store;
pub mod types;

pub use queue::{FnWorker, JobQueue, JobWorker, QueueConfig, QueueError, RecoveryReport};
pub use store::{FileJobStore, InMemoryJobStore, JobStore, JobStoreError};
pub use types::{
    FailureOutcome, InvalidTransition, Job, JobError, JobStatus, MAX_BACKOFF, RetryPolicy,
};
