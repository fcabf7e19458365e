//! SLO evaluation against a metrics summary.
//!
//! Stateless: the same summary and targets always produce the same evaluation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metrics::MetricsSummary;

pub const CHECK_API_AVAILABILITY: &str = "api_availability";
pub const CHECK_API_LATENCY_P95: &str = "api_latency_p95";
pub const CHECK_JOB_SUCCESS_RATE: &str = "job_success_rate";
pub const CHECK_QUEUE_WAIT_P95: &str = "queue_wait_p95";

/// Target table for the four service objectives.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SloTargets {
    /// Observed availability must be at least this percentage.
    pub api_availability_pct: f64,
    /// Observed p95 API latency must be at most this many milliseconds.
    pub api_latency_p95_ms: f64,
    /// Observed job success rate must be at least this percentage.
    pub job_success_rate_pct: f64,
    /// Observed p95 queue wait must be at most this many milliseconds.
    pub queue_wait_p95_ms: f64,
}

impl Default for SloTargets {
    fn default() -> Self {
        Self {
            api_availability_pct: 99.0,
            api_latency_p95_ms: 500.0,
            job_success_rate_pct: 95.0,
            queue_wait_p95_ms: 30_000.0,
        }
    }
}

/// Direction of an objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    /// observed >= target
    AtLeast,
    /// observed <= target
    AtMost,
}

impl Comparator {
    pub fn symbol(self) -> &'static str {
        match self {
            Comparator::AtLeast => ">=",
            Comparator::AtMost => "<=",
        }
    }

    pub fn holds(self, observed: f64, target: f64) -> bool {
        match self {
            Comparator::AtLeast => observed >= target,
            Comparator::AtMost => observed <= target,
        }
    }
}

/// Outcome of one objective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SloCheck {
    pub id: String,
    pub metric: String,
    pub comparator: Comparator,
    pub target: f64,
    pub observed: f64,
    pub passed: bool,
    pub message: String,
}

/// All checks for one summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SloEvaluation {
    pub healthy: bool,
    pub checks: Vec<SloCheck>,
    pub evaluated_at: DateTime<Utc>,
}

impl SloEvaluation {
    pub fn failing(&self) -> impl Iterator<Item = &SloCheck> {
        self.checks.iter().filter(|c| !c.passed)
    }
}

fn check(id: &str, metric: &str, comparator: Comparator, target: f64, observed: f64) -> SloCheck {
    let passed = comparator.holds(observed, target);
    let verdict = if passed { "ok" } else { "breached" };
    SloCheck {
        id: id.to_string(),
        metric: metric.to_string(),
        comparator,
        target,
        observed,
        passed,
        message: format!(
            "{metric} {verdict}: observed {observed:.2}, target {} {target:.2}",
            comparator.symbol()
        ),
    }
}

/// Compare `summary` against `targets`, one check per objective.
pub fn evaluate_slo(summary: &MetricsSummary, targets: &SloTargets) -> SloEvaluation {
    let checks = vec![
        check(
            CHECK_API_AVAILABILITY,
            "api_availability_pct",
            Comparator::AtLeast,
            targets.api_availability_pct,
            summary.api.availability_pct,
        ),
        check(
            CHECK_API_LATENCY_P95,
            "api_latency_p95_ms",
            Comparator::AtMost,
            targets.api_latency_p95_ms,
            summary.api.latency_p95_ms,
        ),
        check(
            CHECK_JOB_SUCCESS_RATE,
            "job_success_rate_pct",
            Comparator::AtLeast,
            targets.job_success_rate_pct,
            summary.jobs.success_rate_pct,
        ),
        check(
            CHECK_QUEUE_WAIT_P95,
            "queue_wait_p95_ms",
            Comparator::AtMost,
            targets.queue_wait_p95_ms,
            summary.jobs.queue_wait_p95_ms,
        ),
    ];

    SloEvaluation {
        healthy: checks.iter().all(|c| c.passed),
        checks,
        evaluated_at: summary.generated_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{MetricsCollector, QueueSnapshot};

    #[test]
    fn fresh_collector_is_healthy() {
        let summary = MetricsCollector::default().build_summary(QueueSnapshot::default());
        let eval = evaluate_slo(&summary, &SloTargets::default());

        assert!(eval.healthy);
        assert_eq!(eval.checks.len(), 4);
        assert_eq!(eval.failing().count(), 0);
    }

    #[test]
    fn breaches_are_reported_per_check() {
        let metrics = MetricsCollector::default();
        metrics.record_api_request(900.0, true);
        metrics.record_api_request(20.0, false);
        metrics.record_job_failed();

        let summary = metrics.build_summary(QueueSnapshot::default());
        let eval = evaluate_slo(&summary, &SloTargets::default());

        assert!(!eval.healthy);
        let failing: Vec<&str> = eval.failing().map(|c| c.id.as_str()).collect();
        assert_eq!(
            failing,
            vec![CHECK_API_AVAILABILITY, CHECK_API_LATENCY_P95, CHECK_JOB_SUCCESS_RATE]
        );

        let latency = &eval.checks[1];
        assert_eq!(latency.comparator, Comparator::AtMost);
        assert_eq!(latency.observed, 900.0);
        assert!(latency.message.contains("breached"));
    }

    #[test]
    fn boundaries_are_inclusive() {
        assert!(Comparator::AtLeast.holds(99.0, 99.0));
        assert!(Comparator::AtMost.holds(500.0, 500.0));
        assert!(!Comparator::AtMost.holds(500.01, 500.0));
    }

    #[test]
    fn evaluation_is_repeatable() {
        let summary = MetricsCollector::default().build_summary(QueueSnapshot::default());
        let targets = SloTargets::default();
        assert_eq!(evaluate_slo(&summary, &targets), evaluate_slo(&summary, &targets));
    }
}
