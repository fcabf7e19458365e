//! Flat text export of counters and derived gauges.

use std::fmt::Write;

use super::summary::MetricsSummary;

const PREFIX: &str = "benchops";

/// Render `summary` as one `name value` pair per line.
///
/// Counters carry a `_total` suffix; gauges are rendered with two decimals.
pub fn render_text(summary: &MetricsSummary) -> String {
    let c = &summary.counters;
    let counters: [(&str, u64); 6] = [
        ("api_requests_total", c.requests),
        ("api_errors_total", c.errors),
        ("jobs_submitted_total", c.submitted),
        ("jobs_completed_total", c.completed),
        ("jobs_failed_total", c.failed),
        ("jobs_retried_total", c.retried),
    ];

    let gauges: [(&str, f64); 11] = [
        ("api_window_requests", summary.api.requests as f64),
        ("api_window_errors", summary.api.errors as f64),
        ("api_availability_pct", summary.api.availability_pct),
        ("api_latency_p95_ms", summary.api.latency_p95_ms),
        ("job_success_rate_pct", summary.jobs.success_rate_pct),
        ("job_duration_p95_ms", summary.jobs.duration_p95_ms),
        ("queue_wait_p95_ms", summary.jobs.queue_wait_p95_ms),
        ("queue_pending", summary.queue.pending as f64),
        ("queue_running", summary.queue.running as f64),
        ("queue_concurrency", summary.queue.concurrency as f64),
        ("metrics_window_seconds", summary.window_secs as f64),
    ];

    let mut out = String::new();
    for (name, value) in counters {
        let _ = writeln!(out, "{PREFIX}_{name} {value}");
    }
    for (name, value) in gauges {
        let _ = writeln!(out, "{PREFIX}_{name} {value:.2}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{MetricsCollector, QueueSnapshot};

    #[test]
    fn renders_counters_and_gauges() {
        let metrics = MetricsCollector::default();
        metrics.record_job_submitted();
        metrics.record_job_completed(120.0);
        metrics.record_api_request(8.0, false);

        let summary = metrics.build_summary(QueueSnapshot {
            pending: 4,
            running: 1,
            concurrency: 2,
            max_attempts: 3,
            base_retry_ms: 500,
        });
        let text = render_text(&summary);

        assert!(text.contains("benchops_jobs_submitted_total 1\n"));
        assert!(text.contains("benchops_jobs_completed_total 1\n"));
        assert!(text.contains("benchops_api_availability_pct 100.00\n"));
        assert!(text.contains("benchops_job_duration_p95_ms 120.00\n"));
        assert!(text.contains("benchops_queue_pending 4.00\n"));
        assert_eq!(text.lines().count(), 17);
        assert!(text.lines().all(|l| l.split(' ').count() == 2));
    }
}
