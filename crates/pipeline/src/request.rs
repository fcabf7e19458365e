//! Benchmark job input.

use serde::{Deserialize, Serialize};

use benchops_core::JobId;

use crate::manifest::Category;
use crate::result::PipelineError;

/// Shard count used when the request does not ask for one.
pub const DEFAULT_SHARDS: usize = 4;

/// Parameters of one benchmark run, parsed from the job payload.
///
/// Keys are camelCase in the payload; snake_case aliases are accepted too.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkRequest {
    /// Categories to include; `None` or empty means all of them.
    #[serde(default)]
    pub categories: Option<Vec<Category>>,
    #[serde(default, alias = "max_models")]
    pub max_models: Option<usize>,
    #[serde(default)]
    pub shards: Option<usize>,
    #[serde(default, alias = "per_model_delay_ms")]
    pub per_model_delay_ms: Option<u64>,
    /// Fail the first attempt unconditionally.
    #[serde(default, alias = "inject_transient_failure")]
    pub inject_transient_failure: bool,
}

impl BenchmarkRequest {
    /// Parse a job payload. `null` is treated as an empty request.
    pub fn from_payload(payload: &serde_json::Value) -> Result<Self, PipelineError> {
        if payload.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(payload.clone())
            .map_err(|e| PipelineError::InvalidRequest(e.to_string()))
    }

    /// Requested categories in canonical order, deduplicated.
    pub fn selected_categories(&self) -> Vec<Category> {
        match &self.categories {
            Some(requested) if !requested.is_empty() => Category::ALL
                .into_iter()
                .filter(|c| requested.contains(c))
                .collect(),
            _ => Category::ALL.to_vec(),
        }
    }
}

/// Which job and attempt a run belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunContext {
    pub job_id: JobId,
    /// 1-based attempt number.
    pub attempt: u32,
}
