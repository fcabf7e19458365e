//! Infrastructure layer: job storage, the job queue, background task
//! plumbing and configuration.

pub mod config;
pub mod jobs;
pub mod workers;

pub use config::{ConfigError, OpsConfig};
