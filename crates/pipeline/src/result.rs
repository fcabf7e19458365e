use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::budget::{BudgetChecks, EntryStatus};
use crate::manifest::Category;

/// Score of one catalog entry against the budgets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryScore {
    pub id: String,
    pub name: String,
    pub category: Category,
    pub shard: usize,
    pub triangles: u64,
    pub vertices: u64,
    pub joints: u64,
    pub gpu_memory_kb: f64,
    pub checks: BudgetChecks,
    pub status: EntryStatus,
    pub score: u32,
}

/// How many entries a shard processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardSummary {
    pub index: usize,
    pub entries: usize,
}

/// Aggregated output of one benchmark run.
///
/// This is stored verbatim as the job result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub job_id: String,
    pub attempt: u32,
    pub categories: Vec<Category>,
    pub shard_count: usize,
    pub shards: Vec<ShardSummary>,
    pub total: usize,
    pub pass: usize,
    pub warn: usize,
    pub fail: usize,
    pub average_score: f64,
    /// Five lowest scores, ties broken by higher triangle count.
    pub worst_offenders: Vec<EntryScore>,
    /// Shard outputs concatenated in completion order.
    pub results: Vec<EntryScore>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("manifest not found: {}", .0.display())]
    ManifestMissing(PathBuf),

    #[error("failed to read manifest {}: {source}", .path.display())]
    ManifestRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed manifest {}: {source}", .path.display())]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid benchmark request: {0}")]
    InvalidRequest(String),

    #[error("no catalog entries match categories {0:?}")]
    EmptySelection(Vec<Category>),

    #[error("injected transient failure on attempt {attempt}")]
    InjectedFailure { attempt: u32 },

    #[error("shard task failed: {0}")]
    ShardFailed(String),
}
