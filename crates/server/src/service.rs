//! The ops context: one owner for the store, queue, metrics, alerts and
//! manifest cache, handed around by `Arc`.

use std::sync::Arc;

use anyhow::Context;
use serde_json::Value;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use benchops_core::{Clock, JobId, SystemClock};
use benchops_infra::OpsConfig;
use benchops_infra::jobs::{
    FileJobStore, Job, JobQueue, JobStore, JobStoreError, JobWorker, QueueError, RecoveryReport,
};
use benchops_infra::workers::SupervisorStats;
use benchops_observability::metrics::render_text;
use benchops_observability::{
    Alert, AlertManager, AlertTransitions, MetricsCollector, MetricsSummary, QueueSnapshot,
    SloEvaluation, evaluate_slo,
};
use benchops_pipeline::{BenchmarkPipeline, ManifestCache};

use crate::worker::{BENCHMARK_JOB_TYPE, BenchmarkWorker};

pub struct OpsService {
    config: OpsConfig,
    store: Arc<FileJobStore>,
    metrics: Arc<MetricsCollector>,
    queue: JobQueue,
    alerts: AlertManager,
    manifest: Arc<ManifestCache>,
    shutdown: Arc<Notify>,
}

impl std::fmt::Debug for OpsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpsService")
            .field("data_dir", &self.config.data_dir)
            .field("manifest", &self.manifest.path())
            .field("queue", &self.queue.snapshot())
            .finish()
    }
}

impl OpsService {
    /// Open the job store, wire the benchmark worker and recover persisted jobs.
    pub async fn start(config: OpsConfig) -> anyhow::Result<Self> {
        Self::start_with_clock(config, Arc::new(SystemClock)).await
    }

    pub async fn start_with_clock(
        config: OpsConfig,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        let jobs_dir = config.jobs_dir();
        let store = Arc::new(
            FileJobStore::open(&jobs_dir)
                .await
                .with_context(|| format!("opening job store at {}", jobs_dir.display()))?,
        );

        let window = chrono::Duration::from_std(config.metrics_window)
            .context("metrics window out of range")?;
        let metrics = Arc::new(MetricsCollector::new(window, clock.clone()));

        let queue = JobQueue::new(
            config.queue.clone(),
            store.clone(),
            metrics.clone(),
            clock.clone(),
        );

        let manifest = Arc::new(ManifestCache::new(config.manifest_path.clone()));
        queue.register_worker(
            BENCHMARK_JOB_TYPE,
            BenchmarkWorker::new(BenchmarkPipeline::new(manifest.clone())),
        );

        let alerts = AlertManager::new(clock).with_history_limit(config.alert_history_limit);

        let service = Self {
            config,
            store,
            metrics,
            queue,
            alerts,
            manifest,
            shutdown: Arc::new(Notify::new()),
        };

        let report: RecoveryReport = service
            .queue
            .recover()
            .await
            .context("recovering persisted jobs")?;
        info!(
            data_dir = %service.config.data_dir.display(),
            manifest = %service.manifest.path().display(),
            concurrency = service.config.queue.concurrency,
            requeued = report.requeued,
            rescheduled = report.rescheduled,
            interrupted = report.interrupted,
            "ops service started"
        );
        Ok(service)
    }

    pub fn config(&self) -> &OpsConfig {
        &self.config
    }

    /// Register an additional worker (see [`JobQueue::register_worker`]).
    pub fn register_worker<W: JobWorker>(&self, pattern: impl Into<String>, worker: W) {
        self.queue.register_worker(pattern, worker);
    }

    pub async fn enqueue(&self, job_type: &str, payload: Value) -> Result<Job, QueueError> {
        self.queue.enqueue(job_type, payload).await
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        self.queue.snapshot()
    }

    pub fn get(&self, id: JobId) -> Result<Option<Job>, JobStoreError> {
        self.store.get(id)
    }

    pub fn list(&self, limit: usize) -> Result<Vec<Job>, JobStoreError> {
        self.store.list(limit)
    }

    pub fn record_api_request(&self, latency_ms: f64, is_error: bool) {
        self.metrics.record_api_request(latency_ms, is_error);
    }

    pub fn build_summary(&self) -> MetricsSummary {
        self.metrics.build_summary(self.queue.snapshot())
    }

    pub fn evaluate_slo(&self) -> SloEvaluation {
        evaluate_slo(&self.build_summary(), &self.config.slo)
    }

    /// Evaluate the SLOs now and fold the result into the alert set.
    pub fn reconcile_alerts(&self) -> AlertTransitions {
        let evaluation = self.evaluate_slo();
        self.alerts.reconcile(&evaluation)
    }

    pub fn active_alerts(&self) -> Vec<Alert> {
        self.alerts.active()
    }

    pub fn alert_history(&self, limit: usize) -> Vec<Alert> {
        self.alerts.history(limit)
    }

    pub fn metrics_text(&self) -> String {
        render_text(&self.build_summary())
    }

    pub fn supervisor_stats(&self) -> SupervisorStats {
        self.queue.supervisor().stats()
    }

    pub async fn wait_until_idle(&self) {
        self.queue.wait_until_idle().await;
    }

    /// Periodically evaluate SLOs and reconcile alerts until [`OpsService::shutdown`].
    pub fn spawn_slo_monitor(self: &Arc<Self>) -> JoinHandle<()> {
        let service = self.clone();
        let shutdown = self.shutdown.clone();
        let period = self.config.slo_interval;

        tokio::spawn(async move {
            info!(interval_ms = period.as_millis() as u64, "slo monitor started");

            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown.notified() => {
                        info!("slo monitor received shutdown signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        let transitions = service.reconcile_alerts();
                        if transitions.is_empty() {
                            debug!(active = service.alerts.active().len(), "slo check complete");
                        } else {
                            warn!(
                                opened = ?transitions.opened,
                                resolved = ?transitions.resolved,
                                dropped = ?transitions.dropped,
                                "alert set changed"
                            );
                        }
                    }
                }
            }
        })
    }

    /// Stop the SLO monitor and cancel scheduled retries. Jobs already running
    /// finish on their own; interrupted ones are recovered on the next start.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
        self.queue.shutdown();
        info!("ops service shutting down");
    }
}
