//! Core job types and policies.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use benchops_core::JobId;

/// Job lifecycle status.
///
/// `queued -> running -> {completed | retrying | failed}`, `retrying -> queued`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting in the pending list
    Queued,
    /// An attempt is executing
    Running,
    /// Failed, waiting out its backoff before re-admission
    Retrying,
    /// Finished successfully
    Completed,
    /// Exhausted its attempts
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether `self -> next` is a legal lifecycle step.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Retrying)
                | (JobStatus::Running, JobStatus::Failed)
                | (JobStatus::Retrying, JobStatus::Queued)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Retrying => "retrying",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Longest wait before a failed job is re-admitted.
pub const MAX_BACKOFF: Duration = Duration::from_secs(36_500 * 24 * 60 * 60);

/// Rejected lifecycle step.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("job {job_id}: illegal transition {from} -> {to}")]
pub struct InvalidTransition {
    pub job_id: JobId,
    pub from: JobStatus,
    pub to: JobStatus,
}

/// Retry policy configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts allowed, including the first (minimum 1)
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1_000),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with exponential backoff.
    pub fn exponential(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Backoff after failed attempt `attempt` (1-indexed): `base * 2^(attempt-1)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_ms = self.base_delay.as_millis().min(u64::MAX as u128) as u64;
        let factor = 2u64.saturating_pow(attempt - 1);
        Duration::from_millis(base_ms.saturating_mul(factor))
    }
}

/// One failed attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub attempt: u32,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// A job record. Persisted in full on every state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,
    /// Routing key for worker lookup
    #[serde(rename = "type")]
    pub job_type: String,
    /// Opaque JSON payload handed to the worker
    pub payload: serde_json::Value,
    pub status: JobStatus,
    /// Attempts started so far (starts at 0)
    pub attempt: u32,
    pub max_attempts: u32,
    pub created_at: DateTime<Utc>,
    /// When the job (re-)entered the pending list
    pub queued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub next_retry_at: Option<DateTime<Utc>>,
    /// One entry per failed attempt, oldest first
    pub error_history: Vec<JobError>,
    /// Worker output, set only on success
    pub result: Option<serde_json::Value>,
}

/// What the queue should do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Re-admit after `delay`.
    Retry { delay: Duration },
    /// Attempts exhausted; the job is now `failed`.
    Exhausted,
}

impl Job {
    /// Create a new queued job.
    pub fn new(
        job_type: impl Into<String>,
        payload: serde_json::Value,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: JobId::new(),
            job_type: job_type.into(),
            payload,
            status: JobStatus::Queued,
            attempt: 0,
            max_attempts: max_attempts.max(1),
            created_at: now,
            queued_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
            next_retry_at: None,
            error_history: Vec::new(),
            result: None,
        }
    }

    fn transition(&mut self, to: JobStatus, now: DateTime<Utc>) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(to) {
            return Err(InvalidTransition {
                job_id: self.id,
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = now;
        Ok(())
    }

    /// Start the next attempt. Returns how long the job waited in the queue.
    pub fn mark_running(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<chrono::Duration, InvalidTransition> {
        if self.attempt >= self.max_attempts {
            return Err(InvalidTransition {
                job_id: self.id,
                from: self.status,
                to: JobStatus::Running,
            });
        }
        self.transition(JobStatus::Running, now)?;
        self.attempt += 1;
        self.started_at = Some(now);
        self.next_retry_at = None;
        Ok(now - self.queued_at)
    }

    /// Mark job as completed with the worker's output.
    pub fn mark_completed(
        &mut self,
        result: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<(), InvalidTransition> {
        self.transition(JobStatus::Completed, now)?;
        self.result = Some(result);
        self.completed_at = Some(now);
        Ok(())
    }

    /// Record a failed attempt and decide between retry and terminal failure.
    pub fn mark_failed(
        &mut self,
        message: impl Into<String>,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
    ) -> Result<FailureOutcome, InvalidTransition> {
        let retry = self.attempt < self.max_attempts;
        let next = if retry {
            JobStatus::Retrying
        } else {
            JobStatus::Failed
        };
        self.transition(next, now)?;

        self.error_history.push(JobError {
            attempt: self.attempt,
            timestamp: now,
            message: message.into(),
        });

        if retry {
            let delay = policy.delay_for_attempt(self.attempt).min(MAX_BACKOFF);
            let retry_at = chrono::Duration::from_std(delay)
                .ok()
                .and_then(|backoff| now.checked_add_signed(backoff))
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            self.next_retry_at = Some(retry_at);
            Ok(FailureOutcome::Retry { delay })
        } else {
            self.next_retry_at = None;
            self.completed_at = Some(now);
            Ok(FailureOutcome::Exhausted)
        }
    }

    /// Put a retrying job back in line.
    pub fn mark_queued(&mut self, now: DateTime<Utc>) -> Result<(), InvalidTransition> {
        self.transition(JobStatus::Queued, now)?;
        self.queued_at = now;
        self.next_retry_at = None;
        Ok(())
    }

    /// Time between the start of the current attempt and `now`.
    pub fn attempt_duration(&self, now: DateTime<Utc>) -> chrono::Duration {
        self.started_at.map_or(chrono::Duration::zero(), |s| now - s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn job(max_attempts: u32) -> Job {
        Job::new("benchmark", json!({"key": "value"}), max_attempts, Utc::now())
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::exponential(max_attempts, Duration::from_millis(100))
    }

    #[test]
    fn exponential_backoff_calculates_correctly() {
        let policy = policy(5);

        assert_eq!(policy.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(800));
    }

    #[test]
    fn backoff_saturates_instead_of_overflowing() {
        let policy = policy(200);
        assert_eq!(policy.delay_for_attempt(200), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn huge_base_delay_is_capped() {
        let policy = RetryPolicy::exponential(3, Duration::from_millis(9_000_000_000_000_000_000));
        let mut job = job(3);
        let now = Utc::now();
        job.mark_running(now).unwrap();

        let outcome = job.mark_failed("slow down", &policy, now).unwrap();
        assert_eq!(outcome, FailureOutcome::Retry { delay: MAX_BACKOFF });
        assert_eq!(job.status, JobStatus::Retrying);
        assert_eq!(job.error_history.len(), 1);
        let retry_at = job.next_retry_at.unwrap();
        assert!(retry_at > now + chrono::Duration::days(36_000));
    }

    #[test]
    fn retry_time_saturates_at_the_latest_timestamp() {
        let late = DateTime::<Utc>::MAX_UTC - chrono::Duration::days(1);
        let policy = RetryPolicy::exponential(3, Duration::from_secs(10 * 24 * 60 * 60));
        let mut job = job(3);
        job.mark_running(late).unwrap();

        let outcome = job.mark_failed("late", &policy, late).unwrap();
        assert!(matches!(outcome, FailureOutcome::Retry { .. }));
        assert_eq!(job.next_retry_at, Some(DateTime::<Utc>::MAX_UTC));
    }

    #[test]
    fn only_lifecycle_edges_are_legal() {
        use JobStatus::*;
        let all = [Queued, Running, Retrying, Completed, Failed];
        let legal = [
            (Queued, Running),
            (Running, Completed),
            (Running, Retrying),
            (Running, Failed),
            (Retrying, Queued),
        ];
        for from in all {
            for to in all {
                assert_eq!(
                    from.can_transition_to(to),
                    legal.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn job_lifecycle() {
        let mut job = job(3);
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.attempt, 0);

        let now = Utc::now();
        job.mark_running(now).unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.attempt, 1);
        assert_eq!(job.started_at, Some(now));

        job.mark_completed(json!({"ok": true}), now).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.result, Some(json!({"ok": true})));
        assert!(job.error_history.is_empty());

        assert!(job.mark_running(now).is_err());
    }

    #[test]
    fn job_failure_and_retry() {
        let policy = policy(2);
        let mut job = job(2);

        let t0 = Utc::now();
        job.mark_running(t0).unwrap();
        let outcome = job.mark_failed("error 1", &policy, t0).unwrap();
        assert_eq!(
            outcome,
            FailureOutcome::Retry {
                delay: Duration::from_millis(100)
            }
        );
        assert_eq!(job.status, JobStatus::Retrying);
        assert_eq!(job.next_retry_at, Some(t0 + chrono::Duration::milliseconds(100)));
        assert_eq!(job.error_history.len(), 1);

        let t1 = t0 + chrono::Duration::milliseconds(150);
        job.mark_queued(t1).unwrap();
        assert_eq!(job.queued_at, t1);
        assert_eq!(job.next_retry_at, None);

        job.mark_running(t1).unwrap();
        let outcome = job.mark_failed("error 2", &policy, t1).unwrap();
        assert_eq!(outcome, FailureOutcome::Exhausted);
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.attempt, job.max_attempts);
        assert_eq!(job.error_history.len(), 2);
        assert_eq!(job.error_history[1].attempt, 2);
    }

    #[test]
    fn illegal_steps_are_rejected() {
        let mut job = job(3);
        let now = Utc::now();
        let err = job.mark_queued(now).unwrap_err();
        assert_eq!(err.from, JobStatus::Queued);
        assert_eq!(err.to, JobStatus::Queued);

        assert!(job.mark_failed("boom", &policy(3), now).is_err());
        assert!(job.error_history.is_empty());
    }

    #[test]
    fn queue_wait_is_measured_from_queued_at() {
        let created = Utc::now();
        let mut job = Job::new("benchmark", json!(null), 3, created);
        let wait = job.mark_running(created + chrono::Duration::milliseconds(250)).unwrap();
        assert_eq!(wait, chrono::Duration::milliseconds(250));
    }

    #[test]
    fn record_serializes_type_field() {
        let job = job(1);
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["type"], "benchmark");
        assert_eq!(value["status"], "queued");
        let back: Job = serde_json::from_value(value).unwrap();
        assert_eq!(back, job);
    }
}
