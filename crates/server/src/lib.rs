//! Service wiring: the long-lived ops context, the benchmark worker and the
//! line-oriented intake used by the `benchops` binary.

pub mod intake;
pub mod service;
pub mod worker;

pub use intake::{IntakeError, Submission, submit_line};
pub use service::OpsService;
pub use worker::{BENCHMARK_JOB_TYPE, BenchmarkWorker};
