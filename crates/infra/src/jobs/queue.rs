//! Bounded-concurrency job queue with retry and exponential backoff.
//!
//! Jobs are admitted FIFO from a pending list and dispatched as Tokio tasks,
//! never more than `concurrency` at once. A failed attempt is either scheduled
//! for re-admission after `base × 2^(attempt-1)` or, once attempts are
//! exhausted, parked in the terminal `failed` state.
//!
//! All queue bookkeeping (pending, running, re-admission timers) lives under a
//! single mutex that is never held across an await point.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use benchops_core::{Clock, JobId};
use benchops_observability::{MetricsCollector, QueueSnapshot};

use super::store::{JobStore, JobStoreError};
use super::types::{FailureOutcome, InvalidTransition, Job, JobStatus, RetryPolicy};
use crate::workers::supervisor::panic_message;
use crate::workers::{ScheduledTask, TaskSupervisor};

/// Message recorded for jobs found `running` when the queue starts.
pub const INTERRUPTED_MESSAGE: &str = "interrupted by restart";

/// Queue tuning.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum jobs running at once (at least 1).
    pub concurrency: usize,
    pub retry: RetryPolicy,
    /// Per-attempt worker timeout; `None` disables it.
    pub job_timeout: Option<Duration>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            retry: RetryPolicy::default(),
            job_timeout: Some(Duration::from_secs(600)),
        }
    }
}

/// Queue error.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error(transparent)]
    Store(#[from] JobStoreError),
    #[error(transparent)]
    Transition(#[from] InvalidTransition),
}

/// Executes one attempt of a job.
///
/// An `Err` counts as a failed attempt and goes through the retry path.
#[async_trait]
pub trait JobWorker: Send + Sync + 'static {
    async fn run(&self, job: Job) -> anyhow::Result<Value>;
}

/// Adapts an async closure into a [`JobWorker`].
pub struct FnWorker<F>(F);

impl<F, Fut> FnWorker<F>
where
    F: Fn(Job) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F, Fut> JobWorker for FnWorker<F>
where
    F: Fn(Job) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    async fn run(&self, job: Job) -> anyhow::Result<Value> {
        (self.0)(job).await
    }
}

/// What [`JobQueue::recover`] did with persisted jobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub requeued: usize,
    pub rescheduled: usize,
    pub interrupted: usize,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<JobId>,
    running: usize,
    peak_running: usize,
    retry_timers: HashMap<JobId, ScheduledTask>,
}

impl QueueState {
    fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.running == 0 && self.retry_timers.is_empty()
    }
}

struct QueueInner {
    config: QueueConfig,
    store: Arc<dyn JobStore>,
    metrics: Arc<MetricsCollector>,
    clock: Arc<dyn Clock>,
    supervisor: TaskSupervisor,
    workers: RwLock<HashMap<String, Arc<dyn JobWorker>>>,
    state: Mutex<QueueState>,
    idle: Notify,
}

impl QueueInner {
    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolve the worker for a job type: exact name, then `prefix.*`
    /// (longest prefix wins), then `*`.
    fn worker_for(&self, job_type: &str) -> Option<Arc<dyn JobWorker>> {
        let workers = self.workers.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(w) = workers.get(job_type) {
            return Some(w.clone());
        }

        let category = workers
            .iter()
            .filter_map(|(pattern, worker)| {
                let prefix = pattern.strip_suffix(".*")?;
                let rest = job_type.strip_prefix(prefix)?;
                rest.starts_with('.').then_some((prefix.len(), worker))
            })
            .max_by_key(|(len, _)| *len)
            .map(|(_, w)| w.clone());
        if category.is_some() {
            return category;
        }

        workers.get("*").cloned()
    }
}

/// Handle to the queue. Clones share the same queue.
#[derive(Clone)]
pub struct JobQueue {
    inner: Arc<QueueInner>,
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("config", &self.inner.config)
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

impl JobQueue {
    pub fn new(
        config: QueueConfig,
        store: Arc<dyn JobStore>,
        metrics: Arc<MetricsCollector>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let config = QueueConfig {
            concurrency: config.concurrency.max(1),
            ..config
        };
        Self {
            inner: Arc::new(QueueInner {
                config,
                store,
                metrics,
                clock,
                supervisor: TaskSupervisor::new("job-queue"),
                workers: RwLock::new(HashMap::new()),
                state: Mutex::new(QueueState::default()),
                idle: Notify::new(),
            }),
        }
    }

    /// Register a worker for a job type pattern: an exact type name,
    /// `prefix.*` for a family of types, or `*` for everything else.
    pub fn register_worker<W: JobWorker>(&self, pattern: impl Into<String>, worker: W) {
        let pattern = pattern.into();
        debug!(pattern = %pattern, "job worker registered");
        self.inner
            .workers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(pattern, Arc::new(worker));
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    pub fn supervisor(&self) -> &TaskSupervisor {
        &self.inner.supervisor
    }

    /// Persist a new job and put it at the back of the pending list.
    ///
    /// Returns as soon as the job is stored; execution happens in the background.
    pub async fn enqueue(
        &self,
        job_type: impl Into<String>,
        payload: Value,
    ) -> Result<Job, QueueError> {
        let job = Job::new(
            job_type,
            payload,
            self.inner.config.retry.max_attempts,
            self.inner.clock.now(),
        );
        self.inner.store.save(&job).await?;
        self.inner.metrics.record_job_submitted();
        info!(job_id = %job.id, job_type = %job.job_type, "job enqueued");

        self.inner.state().pending.push_back(job.id);
        drain(&self.inner);
        Ok(job)
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let state = self.inner.state();
        QueueSnapshot {
            pending: state.pending.len(),
            running: state.running,
            concurrency: self.inner.config.concurrency,
            max_attempts: self.inner.config.retry.max_attempts,
            base_retry_ms: u64::try_from(self.inner.config.retry.base_delay.as_millis())
                .unwrap_or(u64::MAX),
        }
    }

    /// Highest number of jobs observed running at once.
    pub fn peak_running(&self) -> usize {
        self.inner.state().peak_running
    }

    /// Number of jobs waiting on a re-admission timer.
    pub fn scheduled_retries(&self) -> usize {
        self.inner.state().retry_timers.len()
    }

    /// Re-admit persisted non-terminal jobs after a restart.
    ///
    /// `queued` jobs go back in line by `queued_at`; `retrying` jobs get a timer
    /// for whatever is left of their delay; `running` jobs were cut off mid-attempt
    /// and take a failed attempt through the normal failure path.
    pub async fn recover(&self) -> Result<RecoveryReport, QueueError> {
        let inner = &self.inner;
        let now = inner.clock.now();
        let mut report = RecoveryReport::default();
        let mut queued = Vec::new();

        for mut job in inner.store.all()? {
            match job.status {
                JobStatus::Queued => queued.push(job),
                JobStatus::Retrying => {
                    let remaining = job
                        .next_retry_at
                        .map(|at| at - now)
                        .and_then(|d| d.to_std().ok())
                        .unwrap_or(Duration::ZERO);
                    schedule_readmission(inner, job.id, remaining);
                    report.rescheduled += 1;
                }
                JobStatus::Running => {
                    let outcome = job.mark_failed(INTERRUPTED_MESSAGE, &inner.config.retry, now)?;
                    inner.store.save(&job).await?;
                    report.interrupted += 1;
                    match outcome {
                        FailureOutcome::Retry { delay } => {
                            inner.metrics.record_job_retried();
                            schedule_readmission(inner, job.id, delay);
                        }
                        FailureOutcome::Exhausted => inner.metrics.record_job_failed(),
                    }
                    warn!(job_id = %job.id, attempt = job.attempt, "job interrupted by restart");
                }
                JobStatus::Completed | JobStatus::Failed => {}
            }
        }

        queued.sort_by(|a, b| a.queued_at.cmp(&b.queued_at).then_with(|| a.id.cmp(&b.id)));
        report.requeued = queued.len();
        inner.state().pending.extend(queued.iter().map(|j| j.id));

        info!(
            requeued = report.requeued,
            rescheduled = report.rescheduled,
            interrupted = report.interrupted,
            "job queue recovered"
        );
        drain(inner);
        Ok(report)
    }

    /// Resolve once nothing is pending, running or waiting on a retry timer.
    pub async fn wait_until_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.inner.state().is_idle() {
                return;
            }
            notified.await;
        }
    }

    /// Cancel every scheduled re-admission. Affected jobs stay `retrying` in the
    /// store and are picked up again by [`JobQueue::recover`].
    pub fn shutdown(&self) {
        let timers: Vec<ScheduledTask> = {
            let mut state = self.inner.state();
            state.retry_timers.drain().map(|(_, t)| t).collect()
        };
        let cancelled = timers.len();
        for timer in timers {
            timer.cancel();
        }
        info!(cancelled, "job queue shut down");
        notify_if_idle(&self.inner);
    }
}

/// Frees a running slot on drop, whatever happened to the attempt.
struct RunningSlot {
    inner: Arc<QueueInner>,
}

impl Drop for RunningSlot {
    fn drop(&mut self) {
        {
            let mut state = self.inner.state();
            state.running = state.running.saturating_sub(1);
        }
        drain(&self.inner);
    }
}

fn notify_if_idle(inner: &QueueInner) {
    if inner.state().is_idle() {
        inner.idle.notify_waiters();
    }
}

/// Admit pending jobs while there is capacity.
fn drain(inner: &Arc<QueueInner>) {
    let mut admitted = Vec::new();
    {
        let mut state = inner.state();
        while state.running < inner.config.concurrency {
            let Some(id) = state.pending.pop_front() else {
                break;
            };
            match inner.store.get(id) {
                Ok(Some(job)) if job.status == JobStatus::Queued => {
                    state.running += 1;
                    state.peak_running = state.peak_running.max(state.running);
                    admitted.push(job);
                }
                Ok(Some(job)) => {
                    debug!(job_id = %id, status = %job.status, "skipping pending job that is no longer queued");
                }
                Ok(None) => warn!(job_id = %id, "pending job missing from store"),
                Err(err) => error!(job_id = %id, error = %err, "failed to load pending job"),
            }
        }
    }

    for job in admitted {
        let slot = RunningSlot {
            inner: inner.clone(),
        };
        inner.supervisor.spawn("job", execute(slot, job));
    }

    notify_if_idle(inner);
}

fn schedule_readmission(inner: &Arc<QueueInner>, job_id: JobId, delay: Duration) {
    let mut state = inner.state();
    let task = ScheduledTask::after(&inner.supervisor, delay, readmit(inner.clone(), job_id));
    if let Some(previous) = state.retry_timers.insert(job_id, task) {
        previous.cancel();
    }
}

async fn readmit(inner: Arc<QueueInner>, job_id: JobId) {
    let requeued = match inner.store.get(job_id) {
        Ok(Some(mut job)) if job.status == JobStatus::Retrying => {
            match job.mark_queued(inner.clock.now()) {
                Ok(()) => {
                    if let Err(err) = inner.store.save(&job).await {
                        error!(job_id = %job_id, error = %err, "failed to persist re-admitted job");
                    }
                    true
                }
                Err(err) => {
                    error!(job_id = %job_id, error = %err, "job bookkeeping fault");
                    false
                }
            }
        }
        Ok(Some(job)) => {
            warn!(job_id = %job_id, status = %job.status, "retry timer fired for job that is not retrying");
            false
        }
        Ok(None) => {
            warn!(job_id = %job_id, "retry timer fired for unknown job");
            false
        }
        Err(err) => {
            error!(job_id = %job_id, error = %err, "failed to load job for re-admission");
            false
        }
    };

    {
        let mut state = inner.state();
        state.retry_timers.remove(&job_id);
        if requeued {
            state.pending.push_back(job_id);
        }
    }
    if requeued {
        debug!(job_id = %job_id, "job re-admitted");
    }
    drain(&inner);
}

/// Run one attempt of `job`. The slot is released when this future finishes
/// or unwinds.
async fn execute(slot: RunningSlot, mut job: Job) {
    let inner = slot.inner.clone();
    let retry = &inner.config.retry;

    let queue_wait = match job.mark_running(inner.clock.now()) {
        Ok(wait) => wait,
        Err(err) => {
            error!(job_id = %job.id, error = %err, "job bookkeeping fault");
            return;
        }
    };
    inner
        .metrics
        .record_queue_wait(queue_wait.num_milliseconds().max(0) as f64);
    persist(&inner, &job).await;
    debug!(job_id = %job.id, job_type = %job.job_type, attempt = job.attempt, "job started");

    let outcome = run_worker(&inner, &job).await;
    let now = inner.clock.now();

    match outcome {
        Ok(result) => {
            let duration_ms = job.attempt_duration(now).num_milliseconds().max(0);
            if let Err(err) = job.mark_completed(result, now) {
                error!(job_id = %job.id, error = %err, "job bookkeeping fault");
                return;
            }
            inner.metrics.record_job_completed(duration_ms as f64);
            persist(&inner, &job).await;
            info!(job_id = %job.id, job_type = %job.job_type, attempt = job.attempt, duration_ms, "job completed");
        }
        Err(message) => match job.mark_failed(message.clone(), retry, now) {
            Ok(FailureOutcome::Retry { delay }) => {
                inner.metrics.record_job_retried();
                persist(&inner, &job).await;
                warn!(
                    job_id = %job.id,
                    attempt = job.attempt,
                    max_attempts = job.max_attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %message,
                    "job attempt failed, retry scheduled"
                );
                schedule_readmission(&inner, job.id, delay);
            }
            Ok(FailureOutcome::Exhausted) => {
                inner.metrics.record_job_failed();
                persist(&inner, &job).await;
                error!(
                    job_id = %job.id,
                    attempt = job.attempt,
                    error = %message,
                    "job failed, attempts exhausted"
                );
            }
            Err(err) => error!(job_id = %job.id, error = %err, "job bookkeeping fault"),
        },
    }

    drop(slot);
}

async fn persist(inner: &QueueInner, job: &Job) {
    if let Err(err) = inner.store.save(job).await {
        error!(job_id = %job.id, status = %job.status, error = %err, "failed to persist job");
    }
}

/// Invoke the worker in its own task so a panic or timeout becomes a failed
/// attempt instead of taking the queue down.
async fn run_worker(inner: &QueueInner, job: &Job) -> Result<Value, String> {
    let Some(worker) = inner.worker_for(&job.job_type) else {
        return Err(format!("no worker registered for job type `{}`", job.job_type));
    };

    let input = job.clone();
    let mut handle = tokio::spawn(async move { worker.run(input).await });

    let joined = match inner.config.job_timeout {
        Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
            Ok(joined) => joined,
            Err(_) => {
                handle.abort();
                return Err(format!("worker timed out after {}ms", limit.as_millis()));
            }
        },
        None => handle.await,
    };

    match joined {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(format!("{err:#}")),
        Err(err) if err.is_panic() => Err(format!(
            "worker panicked: {}",
            panic_message(err.into_panic())
        )),
        Err(_) => Err("worker task cancelled".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::store::InMemoryJobStore;
    use benchops_core::SystemClock;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn queue_with(
        concurrency: usize,
        max_attempts: u32,
        base_ms: u64,
    ) -> (JobQueue, Arc<InMemoryJobStore>, Arc<MetricsCollector>) {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = Arc::new(InMemoryJobStore::new());
        let metrics = Arc::new(MetricsCollector::new(chrono::Duration::minutes(15), clock.clone()));
        let config = QueueConfig {
            concurrency,
            retry: RetryPolicy::exponential(max_attempts, Duration::from_millis(base_ms)),
            job_timeout: None,
        };
        let queue = JobQueue::new(config, store.clone(), metrics.clone(), clock);
        (queue, store, metrics)
    }

    async fn idle(queue: &JobQueue) {
        tokio::time::timeout(Duration::from_secs(10), queue.wait_until_idle())
            .await
            .expect("queue did not go idle");
    }

    #[tokio::test]
    async fn runs_job_to_completion() {
        let (queue, store, metrics) = queue_with(2, 3, 10);
        queue.register_worker("echo", FnWorker::new(|job: Job| async move { Ok(job.payload) }));

        let job = queue.enqueue("echo", json!({"n": 1})).await.unwrap();
        idle(&queue).await;

        let stored = store.get(job.id).unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert_eq!(stored.attempt, 1);
        assert_eq!(stored.result, Some(json!({"n": 1})));
        assert!(stored.completed_at.is_some());

        let counters = metrics.counters();
        assert_eq!(counters.submitted, 1);
        assert_eq!(counters.completed, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn running_never_exceeds_concurrency() {
        let (queue, store, _) = queue_with(2, 1, 10);
        let live = Arc::new(AtomicUsize::new(0));
        let max_live = Arc::new(AtomicUsize::new(0));
        let (l, m) = (live.clone(), max_live.clone());
        queue.register_worker(
            "slow",
            FnWorker::new(move |_job: Job| {
                let (live, max_live) = (l.clone(), m.clone());
                async move {
                    let now = live.fetch_add(1, Ordering::SeqCst) + 1;
                    max_live.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    live.fetch_sub(1, Ordering::SeqCst);
                    Ok(Value::Null)
                }
            }),
        );

        for i in 0..8 {
            queue.enqueue("slow", json!({ "i": i })).await.unwrap();
        }
        idle(&queue).await;

        assert!(max_live.load(Ordering::SeqCst) <= 2);
        assert!(queue.peak_running() <= 2);
        assert_eq!(queue.peak_running(), 2);
        assert!(
            store
                .all()
                .unwrap()
                .iter()
                .all(|j| j.status == JobStatus::Completed)
        );
    }

    #[tokio::test]
    async fn admission_is_fifo() {
        let (queue, _, _) = queue_with(1, 1, 10);
        let order = Arc::new(Mutex::new(Vec::new()));
        let seen = order.clone();
        queue.register_worker(
            "record",
            FnWorker::new(move |job: Job| {
                let seen = seen.clone();
                async move {
                    seen.lock().unwrap().push(job.payload["i"].as_i64().unwrap());
                    Ok(Value::Null)
                }
            }),
        );

        for i in 0..5 {
            queue.enqueue("record", json!({ "i": i })).await.unwrap();
        }
        idle(&queue).await;

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn retried_job_rejoins_at_the_back() {
        let (queue, _, _) = queue_with(1, 2, 1);
        let order = Arc::new(Mutex::new(Vec::new()));
        let seen = order.clone();
        queue.register_worker(
            "record",
            FnWorker::new(move |job: Job| {
                let seen = seen.clone();
                async move {
                    let name = job.payload["name"].as_str().unwrap_or_default().to_string();
                    seen.lock().unwrap().push(format!("{name}{}", job.attempt));
                    if name == "a" && job.attempt == 1 {
                        anyhow::bail!("first attempt of a fails");
                    }
                    Ok(Value::Null)
                }
            }),
        );

        for name in ["a", "b", "c"] {
            queue.enqueue("record", json!({ "name": name })).await.unwrap();
        }
        idle(&queue).await;

        assert_eq!(*order.lock().unwrap(), vec!["a1", "b1", "c1", "a2"]);
    }

    async fn store_retrying(
        store: &InMemoryJobStore,
        name: &str,
        retry_in: chrono::Duration,
    ) -> Job {
        let now = chrono::Utc::now();
        let mut job = Job::new("record", json!({ "name": name }), 3, now);
        job.mark_running(now).unwrap();
        job.mark_failed("before restart", &RetryPolicy::default(), now).unwrap();
        job.next_retry_at = Some(now + retry_in);
        store.save(&job).await.unwrap();
        job
    }

    #[tokio::test]
    async fn recover_reschedules_retrying_jobs_for_remaining_delay() {
        let (queue, store, _) = queue_with(1, 3, 5);
        let due = store_retrying(&store, "due", chrono::Duration::seconds(-1)).await;
        let later = store_retrying(&store, "later", chrono::Duration::milliseconds(200)).await;

        let order = Arc::new(Mutex::new(Vec::new()));
        let seen = order.clone();
        queue.register_worker(
            "record",
            FnWorker::new(move |job: Job| {
                let seen = seen.clone();
                async move {
                    let name = job.payload["name"].as_str().unwrap_or_default().to_string();
                    seen.lock().unwrap().push(name);
                    Ok(Value::Null)
                }
            }),
        );

        let report = queue.recover().await.unwrap();
        assert_eq!(
            report,
            RecoveryReport {
                requeued: 0,
                rescheduled: 2,
                interrupted: 0
            }
        );
        assert_eq!(queue.scheduled_retries(), 2);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*order.lock().unwrap(), vec!["due"]);
        assert_eq!(store.get(later.id).unwrap().unwrap().status, JobStatus::Retrying);

        idle(&queue).await;
        assert_eq!(*order.lock().unwrap(), vec!["due", "later"]);
        for id in [due.id, later.id] {
            let job = store.get(id).unwrap().unwrap();
            assert_eq!(job.status, JobStatus::Completed);
            assert_eq!(job.attempt, 2);
            assert_eq!(job.error_history[0].message, "before restart");
        }
    }

    #[tokio::test]
    async fn failed_attempt_is_retried_then_completes() {
        let (queue, store, metrics) = queue_with(1, 3, 20);
        queue.register_worker(
            "flaky",
            FnWorker::new(|job: Job| async move {
                if job.attempt == 1 {
                    anyhow::bail!("transient");
                }
                Ok(json!({"attempt": job.attempt}))
            }),
        );

        let job = queue.enqueue("flaky", Value::Null).await.unwrap();
        idle(&queue).await;

        let stored = store.get(job.id).unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert_eq!(stored.attempt, 2);
        assert_eq!(stored.error_history.len(), 1);
        assert_eq!(stored.error_history[0].message, "transient");
        assert_eq!(metrics.counters().retried, 1);
    }

    #[tokio::test]
    async fn exhausted_job_is_terminal() {
        let (queue, store, metrics) = queue_with(1, 3, 5);
        queue.register_worker(
            "broken",
            FnWorker::new(|_job: Job| async move { Err(anyhow::anyhow!("always fails")) }),
        );

        let job = queue.enqueue("broken", Value::Null).await.unwrap();
        idle(&queue).await;

        let stored = store.get(job.id).unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.attempt, 3);
        let attempts: Vec<u32> = stored.error_history.iter().map(|e| e.attempt).collect();
        assert_eq!(attempts, vec![1, 2, 3]);
        assert!(stored.next_retry_at.is_none());

        let counters = metrics.counters();
        assert_eq!(counters.retried, 2);
        assert_eq!(counters.failed, 1);
    }

    #[tokio::test]
    async fn panicking_worker_fails_the_attempt() {
        let (queue, store, _) = queue_with(1, 1, 5);
        queue.register_worker(
            "panics",
            FnWorker::new(|_job: Job| async move {
                if true {
                    panic!("worker blew up");
                }
                Ok(Value::Null)
            }),
        );

        let job = queue.enqueue("panics", Value::Null).await.unwrap();
        idle(&queue).await;

        let stored = store.get(job.id).unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert!(stored.error_history[0].message.contains("worker blew up"));
        assert_eq!(queue.snapshot().running, 0);
    }

    #[tokio::test]
    async fn slow_worker_times_out() {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = Arc::new(InMemoryJobStore::new());
        let metrics = Arc::new(MetricsCollector::new(chrono::Duration::minutes(15), clock.clone()));
        let config = QueueConfig {
            concurrency: 1,
            retry: RetryPolicy::exponential(1, Duration::from_millis(5)),
            job_timeout: Some(Duration::from_millis(20)),
        };
        let queue = JobQueue::new(config, store.clone(), metrics, clock);
        queue.register_worker(
            "hang",
            FnWorker::new(|_job: Job| async move {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(Value::Null)
            }),
        );

        let job = queue.enqueue("hang", Value::Null).await.unwrap();
        idle(&queue).await;

        let stored = store.get(job.id).unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert!(stored.error_history[0].message.contains("timed out"));
    }

    #[tokio::test]
    async fn unknown_job_type_fails_normally() {
        let (queue, store, _) = queue_with(1, 1, 5);
        let job = queue.enqueue("mystery", Value::Null).await.unwrap();
        idle(&queue).await;

        let stored = store.get(job.id).unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert!(stored.error_history[0].message.contains("no worker registered"));
    }

    #[tokio::test]
    async fn worker_routing_prefers_exact_then_prefix_then_wildcard() {
        let (queue, store, _) = queue_with(1, 1, 5);
        queue.register_worker(
            "bench.render",
            FnWorker::new(|_j: Job| async { Ok(json!("exact")) }),
        );
        queue.register_worker(
            "bench.*",
            FnWorker::new(|_j: Job| async { Ok(json!("prefix")) }),
        );
        queue.register_worker(
            "*",
            FnWorker::new(|_j: Job| async { Ok(json!("wildcard")) }),
        );

        let exact = queue.enqueue("bench.render", Value::Null).await.unwrap();
        let prefix = queue.enqueue("bench.scan", Value::Null).await.unwrap();
        let other = queue.enqueue("benchmark", Value::Null).await.unwrap();
        idle(&queue).await;

        let result = |id| store.get(id).unwrap().unwrap().result.unwrap();
        assert_eq!(result(exact.id), json!("exact"));
        assert_eq!(result(prefix.id), json!("prefix"));
        assert_eq!(result(other.id), json!("wildcard"));
    }

    #[tokio::test]
    async fn recover_readmits_persisted_jobs() {
        let (queue, store, _) = queue_with(2, 3, 5);
        let now = chrono::Utc::now();

        let queued = Job::new("echo", json!(1), 3, now);
        let mut interrupted = Job::new("echo", json!(2), 3, now);
        interrupted.mark_running(now).unwrap();
        let mut done = Job::new("echo", json!(3), 3, now);
        done.mark_running(now).unwrap();
        done.mark_completed(Value::Null, now).unwrap();
        for job in [&queued, &interrupted, &done] {
            store.save(job).await.unwrap();
        }

        queue.register_worker("echo", FnWorker::new(|job: Job| async move { Ok(job.payload) }));
        let report = queue.recover().await.unwrap();
        assert_eq!(
            report,
            RecoveryReport {
                requeued: 1,
                rescheduled: 0,
                interrupted: 1
            }
        );
        idle(&queue).await;

        let recovered = store.get(interrupted.id).unwrap().unwrap();
        assert_eq!(recovered.status, JobStatus::Completed);
        assert_eq!(recovered.attempt, 2);
        assert_eq!(recovered.error_history[0].message, INTERRUPTED_MESSAGE);
        assert_eq!(store.get(queued.id).unwrap().unwrap().status, JobStatus::Completed);
        assert_eq!(store.get(done.id).unwrap().unwrap(), done);
    }

    #[tokio::test]
    async fn shutdown_cancels_pending_retries() {
        let (queue, store, _) = queue_with(1, 3, 60_000);
        queue.register_worker(
            "broken",
            FnWorker::new(|_job: Job| async move { Err(anyhow::anyhow!("nope")) }),
        );

        let job = queue.enqueue("broken", Value::Null).await.unwrap();
        for _ in 0..200 {
            if queue.scheduled_retries() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(queue.scheduled_retries(), 1);

        queue.shutdown();
        idle(&queue).await;

        let stored = store.get(job.id).unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Retrying);
        assert!(stored.next_retry_at.is_some());
    }
}
