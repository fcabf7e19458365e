//! Sample store with a fixed rolling window and lifetime counters.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use benchops_core::{Clock, SystemClock};

use super::percentile::p95;
use super::summary::{ApiSummary, JobSummary, MetricsSummary, QueueSnapshot};

/// Default sample retention: 15 minutes.
pub const DEFAULT_WINDOW_SECS: u64 = 15 * 60;

/// Tag of a windowed sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleKind {
    ApiLatency,
    JobDuration,
    QueueWait,
}

/// Monotonic counters for the whole process lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifetimeCounters {
    pub requests: u64,
    pub errors: u64,
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub retried: u64,
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    at: DateTime<Utc>,
    value: f64,
    error: bool,
}

#[derive(Debug, Default)]
struct CollectorState {
    api: VecDeque<Sample>,
    job_duration: VecDeque<Sample>,
    queue_wait: VecDeque<Sample>,
    counters: LifetimeCounters,
}

impl CollectorState {
    fn samples_mut(&mut self, kind: SampleKind) -> &mut VecDeque<Sample> {
        match kind {
            SampleKind::ApiLatency => &mut self.api,
            SampleKind::JobDuration => &mut self.job_duration,
            SampleKind::QueueWait => &mut self.queue_wait,
        }
    }

    /// Drop every sample older than `cutoff`. Samples are appended in clock
    /// order, so each deque is pruned from the front.
    fn prune(&mut self, cutoff: DateTime<Utc>) {
        for samples in [&mut self.api, &mut self.job_duration, &mut self.queue_wait] {
            while samples.front().is_some_and(|s| s.at < cutoff) {
                samples.pop_front();
            }
        }
    }
}

/// Rolling metrics for API calls and job execution.
///
/// Sample arrays are bounded by the window; counters only ever grow.
pub struct MetricsCollector {
    window: Duration,
    clock: Arc<dyn Clock>,
    state: Mutex<CollectorState>,
}

impl std::fmt::Debug for MetricsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsCollector")
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(
            Duration::seconds(DEFAULT_WINDOW_SECS as i64),
            Arc::new(SystemClock),
        )
    }
}

impl MetricsCollector {
    pub fn new(window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            window,
            clock,
            state: Mutex::new(CollectorState::default()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut CollectorState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    fn record(&self, kind: SampleKind, value: f64, error: bool) {
        let now = self.clock.now();
        let cutoff = now - self.window;
        self.with_state(|state| {
            state.samples_mut(kind).push_back(Sample {
                at: now,
                value,
                error,
            });
            state.prune(cutoff);
        });
    }

    /// Record one served API request.
    pub fn record_api_request(&self, latency_ms: f64, is_error: bool) {
        self.with_state(|state| {
            state.counters.requests += 1;
            if is_error {
                state.counters.errors += 1;
            }
        });
        self.record(SampleKind::ApiLatency, latency_ms, is_error);
    }

    pub fn record_job_submitted(&self) {
        self.with_state(|state| state.counters.submitted += 1);
    }

    /// Record a successful job run and its duration.
    pub fn record_job_completed(&self, duration_ms: f64) {
        self.with_state(|state| state.counters.completed += 1);
        self.record(SampleKind::JobDuration, duration_ms, false);
    }

    /// Record a job that exhausted its attempts.
    pub fn record_job_failed(&self) {
        self.with_state(|state| state.counters.failed += 1);
    }

    pub fn record_job_retried(&self) {
        self.with_state(|state| state.counters.retried += 1);
    }

    /// Record how long a job sat in the queue before an attempt started.
    pub fn record_queue_wait(&self, wait_ms: f64) {
        self.record(SampleKind::QueueWait, wait_ms, false);
    }

    pub fn counters(&self) -> LifetimeCounters {
        self.with_state(|state| state.counters)
    }

    /// Number of retained samples of one kind (after pruning).
    pub fn sample_count(&self, kind: SampleKind) -> usize {
        let cutoff = self.clock.now() - self.window;
        self.with_state(|state| {
            state.prune(cutoff);
            state.samples_mut(kind).len()
        })
    }

    /// Derive a summary from the current window, lifetime counters and `queue`.
    pub fn build_summary(&self, queue: QueueSnapshot) -> MetricsSummary {
        let now = self.clock.now();
        let cutoff = now - self.window;

        let (api_values, api_errors, durations, waits, counters) = self.with_state(|state| {
            state.prune(cutoff);
            let api_values: Vec<f64> = state.api.iter().map(|s| s.value).collect();
            let api_errors = state.api.iter().filter(|s| s.error).count() as u64;
            let durations: Vec<f64> = state.job_duration.iter().map(|s| s.value).collect();
            let waits: Vec<f64> = state.queue_wait.iter().map(|s| s.value).collect();
            (api_values, api_errors, durations, waits, state.counters)
        });

        let requests = api_values.len() as u64;
        let availability_pct = if requests == 0 {
            100.0
        } else {
            (requests - api_errors) as f64 / requests as f64 * 100.0
        };

        let terminal = counters.completed + counters.failed;
        let success_rate_pct = if terminal == 0 {
            100.0
        } else {
            counters.completed as f64 / terminal as f64 * 100.0
        };

        MetricsSummary {
            generated_at: now,
            window_secs: self.window.num_seconds().max(0) as u64,
            api: ApiSummary {
                requests,
                errors: api_errors,
                availability_pct,
                latency_p95_ms: p95(&api_values),
            },
            jobs: JobSummary {
                success_rate_pct,
                duration_p95_ms: p95(&durations),
                queue_wait_p95_ms: p95(&waits),
                duration_samples: durations.len(),
                queue_wait_samples: waits.len(),
            },
            counters,
            queue,
        }
    }
}
