//! JSON-lines job submissions: `{"type": "...", "payload": {...}}`.

use std::time::Instant;

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use benchops_infra::jobs::{Job, QueueError};

use crate::service::OpsService;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Submission {
    #[serde(rename = "type")]
    pub job_type: String,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("invalid submission: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("job type must not be empty")]
    EmptyType,
    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl Submission {
    pub fn parse(line: &str) -> Result<Self, IntakeError> {
        let submission: Submission = serde_json::from_str(line)?;
        if submission.job_type.trim().is_empty() {
            return Err(IntakeError::EmptyType);
        }
        Ok(submission)
    }
}

/// Parse and enqueue one submission, recording it as an API request.
pub async fn submit_line(service: &OpsService, line: &str) -> Result<Job, IntakeError> {
    let started = Instant::now();
    let outcome = match Submission::parse(line) {
        Ok(submission) => service
            .enqueue(&submission.job_type, submission.payload)
            .await
            .map_err(IntakeError::from),
        Err(err) => Err(err),
    };

    let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
    service.record_api_request(latency_ms, outcome.is_err());
    if let Err(err) = &outcome {
        warn!(error = %err, "submission rejected");
    }
    outcome
}
