//! Sharded benchmark run.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::budget::{Budgets, EntryStatus};
use crate::manifest::{CatalogEntry, Category, Manifest, ManifestCache};
use crate::request::{BenchmarkRequest, DEFAULT_SHARDS, RunContext};
use crate::result::{EntryScore, PipelineError, PipelineReport, ShardSummary};

/// Number of entries reported as worst offenders.
pub const WORST_OFFENDERS: usize = 5;

/// Runs benchmark requests against a shared manifest cache.
#[derive(Debug, Clone)]
pub struct BenchmarkPipeline {
    manifest: Arc<ManifestCache>,
    budgets: Budgets,
}

impl BenchmarkPipeline {
    pub fn new(manifest: Arc<ManifestCache>) -> Self {
        Self {
            manifest,
            budgets: Budgets::default(),
        }
    }

    pub fn with_budgets(mut self, budgets: Budgets) -> Self {
        self.budgets = budgets;
        self
    }

    pub fn budgets(&self) -> &Budgets {
        &self.budgets
    }

    /// Execute one run. Errors are never swallowed so the caller can retry.
    pub async fn run(
        &self,
        request: &BenchmarkRequest,
        ctx: RunContext,
    ) -> Result<PipelineReport, PipelineError> {
        let started = Instant::now();
        let manifest = self.manifest.load().await?;

        if request.inject_transient_failure && ctx.attempt == 1 {
            warn!(job_id = %ctx.job_id, attempt = ctx.attempt, "injecting transient failure");
            return Err(PipelineError::InjectedFailure {
                attempt: ctx.attempt,
            });
        }

        let categories = request.selected_categories();
        let selected = select_entries(&manifest, &categories, request.max_models);
        if selected.is_empty() {
            return Err(PipelineError::EmptySelection(categories));
        }

        let shards = partition_round_robin(selected, request.shards.unwrap_or(DEFAULT_SHARDS));
        let shard_count = shards.len();
        let delay = Duration::from_millis(request.per_model_delay_ms.unwrap_or(0));

        info!(
            job_id = %ctx.job_id,
            attempt = ctx.attempt,
            shards = shard_count,
            "benchmark run started"
        );

        let mut set = JoinSet::new();
        for (index, shard) in shards.into_iter().enumerate() {
            let budgets = self.budgets;
            set.spawn(async move {
                let mut scored = Vec::with_capacity(shard.len());
                for (category, entry) in &shard {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    scored.push(score_entry(&budgets, *category, entry, index));
                }
                (index, scored)
            });
        }

        let mut results = Vec::new();
        let mut shard_summaries = Vec::with_capacity(shard_count);
        while let Some(joined) = set.join_next().await {
            let (index, scored) = joined.map_err(|e| PipelineError::ShardFailed(e.to_string()))?;
            debug!(job_id = %ctx.job_id, shard = index, entries = scored.len(), "shard finished");
            shard_summaries.push(ShardSummary {
                index,
                entries: scored.len(),
            });
            results.extend(scored);
        }
        shard_summaries.sort_by_key(|s| s.index);

        let report = summarize(
            ctx,
            categories,
            shard_summaries,
            results,
            started.elapsed().as_millis() as u64,
        );

        info!(
            job_id = %ctx.job_id,
            attempt = ctx.attempt,
            total = report.total,
            pass = report.pass,
            warn = report.warn,
            fail = report.fail,
            average_score = report.average_score,
            elapsed_ms = report.elapsed_ms,
            "benchmark run finished"
        );

        Ok(report)
    }
}

/// Entries of `categories` in order, truncated to `max_models` clamped to
/// `[1, available]`.
pub fn select_entries(
    manifest: &Manifest,
    categories: &[Category],
    max_models: Option<usize>,
) -> Vec<(Category, CatalogEntry)> {
    let mut selected: Vec<(Category, CatalogEntry)> = categories
        .iter()
        .flat_map(|c| manifest.entries(*c).iter().map(move |e| (*c, e.clone())))
        .collect();

    let available = selected.len();
    if available == 0 {
        return selected;
    }
    let limit = max_models.unwrap_or(available).clamp(1, available);
    selected.truncate(limit);
    selected
}

/// Deal `items` round-robin into `requested` shards, clamped to
/// `[1, min(requested, items.len())]`. No shard is empty unless `items` is.
pub fn partition_round_robin<T>(items: Vec<T>, requested: usize) -> Vec<Vec<T>> {
    let count = requested.min(items.len()).max(1);
    let mut shards: Vec<Vec<T>> = (0..count).map(|_| Vec::new()).collect();
    for (i, item) in items.into_iter().enumerate() {
        shards[i % count].push(item);
    }
    shards
}

/// Classify one entry and compute its score.
pub fn score_entry(
    budgets: &Budgets,
    category: Category,
    entry: &CatalogEntry,
    shard: usize,
) -> EntryScore {
    let checks = budgets.classify(entry);
    EntryScore {
        id: entry.id.clone(),
        name: entry.name.clone(),
        category,
        shard,
        triangles: entry.triangles(),
        vertices: entry.total_vertices,
        joints: entry.joints(),
        gpu_memory_kb: entry.total_gpu_memory_kb,
        status: checks.status(),
        score: checks.score(),
        checks,
    }
}

fn summarize(
    ctx: RunContext,
    categories: Vec<Category>,
    shards: Vec<ShardSummary>,
    results: Vec<EntryScore>,
    elapsed_ms: u64,
) -> PipelineReport {
    let count = |status: EntryStatus| results.iter().filter(|r| r.status == status).count();
    let total = results.len();
    let average_score = if total == 0 {
        0.0
    } else {
        results.iter().map(|r| f64::from(r.score)).sum::<f64>() / total as f64
    };

    let mut worst = results.clone();
    worst.sort_by(|a, b| a.score.cmp(&b.score).then_with(|| b.triangles.cmp(&a.triangles)));
    worst.truncate(WORST_OFFENDERS);

    PipelineReport {
        job_id: ctx.job_id.to_string(),
        attempt: ctx.attempt,
        categories,
        shard_count: shards.len(),
        shards,
        total,
        pass: count(EntryStatus::Pass),
        warn: count(EntryStatus::Warn),
        fail: count(EntryStatus::Fail),
        average_score,
        worst_offenders: worst,
        results,
        elapsed_ms,
    }
}
