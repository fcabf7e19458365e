//! Derived metric views.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::collector::LifetimeCounters;

/// Point-in-time view of the job queue, supplied by the scheduler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub pending: usize,
    pub running: usize,
    pub concurrency: usize,
    pub max_attempts: u32,
    pub base_retry_ms: u64,
}

/// API request health over the rolling window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ApiSummary {
    pub requests: u64,
    pub errors: u64,
    /// 100.0 when the window holds no requests.
    pub availability_pct: f64,
    pub latency_p95_ms: f64,
}

/// Job execution health.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    /// Derived from lifetime completed/failed counters, not the window.
    pub success_rate_pct: f64,
    pub duration_p95_ms: f64,
    pub queue_wait_p95_ms: f64,
    pub duration_samples: usize,
    pub queue_wait_samples: usize,
}

/// Everything the SLO evaluator and the text export need.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub generated_at: DateTime<Utc>,
    pub window_secs: u64,
    pub api: ApiSummary,
    pub jobs: JobSummary,
    pub counters: LifetimeCounters,
    pub queue: QueueSnapshot,
}
