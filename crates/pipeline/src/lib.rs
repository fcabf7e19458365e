//! `benchops-pipeline`
//!
//! **Responsibility:** the unit of work behind a `benchmark` job.
//!
//! - Loads the asset manifest (cached by modification time)
//! - Selects and shards catalog entries
//! - Scores each entry against fixed budgets, concurrently per shard
//! - Aggregates a report
//!
//! Every failure is returned to the caller; retry decisions belong to the queue.

pub mod budget;
pub mod manifest;
pub mod pipeline;
pub mod request;
pub mod result;

pub use budget::{BudgetChecks, BudgetLevel, Budgets, EntryStatus, Threshold, budget_score};
pub use manifest::{CatalogEntry, Category, Manifest, ManifestCache};
pub use pipeline::{BenchmarkPipeline, partition_round_robin, score_entry, select_entries};
pub use request::{BenchmarkRequest, RunContext};
pub use result::{EntryScore, PipelineError, PipelineReport, ShardSummary};
