use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use benchops_infra::jobs::{Job, JobWorker};
use benchops_pipeline::{BenchmarkPipeline, BenchmarkRequest, RunContext};

/// Job type served by [`BenchmarkWorker`].
pub const BENCHMARK_JOB_TYPE: &str = "benchmark";

/// Runs the benchmark pipeline for one job attempt and returns the report as
/// the job result.
#[derive(Debug)]
pub struct BenchmarkWorker {
    pipeline: BenchmarkPipeline,
}

impl BenchmarkWorker {
    pub fn new(pipeline: BenchmarkPipeline) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl JobWorker for BenchmarkWorker {
    async fn run(&self, job: Job) -> anyhow::Result<Value> {
        let request = BenchmarkRequest::from_payload(&job.payload)?;
        let report = self
            .pipeline
            .run(
                &request,
                RunContext {
                    job_id: job.id,
                    attempt: job.attempt,
                },
            )
            .await?;
        debug!(
            job_id = %job.id,
            total = report.total,
            fail = report.fail,
            average_score = report.average_score,
            "benchmark report ready"
        );
        Ok(serde_json::to_value(report)?)
    }
}
