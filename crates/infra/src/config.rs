//! Runtime configuration loaded from `BENCHOPS_*` environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use benchops_observability::SloTargets;
use benchops_observability::alerts::DEFAULT_HISTORY_LIMIT;
use benchops_observability::logging::LogFormat;
use benchops_observability::metrics::DEFAULT_WINDOW_SECS;

use crate::jobs::{QueueConfig, RetryPolicy};

const PREFIX: &str = "BENCHOPS_";

/// Configuration error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{key}: cannot parse `{value}`: {reason}")]
    Parse {
        key: String,
        value: String,
        reason: String,
    },
    #[error("{key}: {reason}")]
    Invalid { key: String, reason: String },
}

/// Everything the service needs to start.
#[derive(Debug, Clone)]
pub struct OpsConfig {
    pub data_dir: PathBuf,
    pub manifest_path: PathBuf,
    pub queue: QueueConfig,
    pub metrics_window: Duration,
    pub slo_interval: Duration,
    pub alert_history_limit: usize,
    pub slo: SloTargets,
    pub log_format: LogFormat,
}

impl Default for OpsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            manifest_path: PathBuf::from("./manifest.json"),
            queue: QueueConfig::default(),
            metrics_window: Duration::from_secs(DEFAULT_WINDOW_SECS),
            slo_interval: Duration::from_secs(30),
            alert_history_limit: DEFAULT_HISTORY_LIMIT,
            slo: SloTargets::default(),
            log_format: LogFormat::default(),
        }
    }
}

impl OpsConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` to resolve full variable names (`BENCHOPS_...`).
    /// Unset or blank variables fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Lookup(lookup);
        let defaults = Self::default();

        let concurrency: usize = env.parse("CONCURRENCY", defaults.queue.concurrency)?;
        if concurrency == 0 {
            return Err(invalid("CONCURRENCY", "must be at least 1"));
        }
        let max_attempts: u32 = env.parse("MAX_ATTEMPTS", defaults.queue.retry.max_attempts)?;
        if max_attempts == 0 {
            return Err(invalid("MAX_ATTEMPTS", "must be at least 1"));
        }
        let base_retry_ms: u64 = env.parse("BASE_RETRY_MS", 1000)?;
        let timeout_ms: u64 = env.parse("JOB_TIMEOUT_MS", 600_000)?;

        let window_secs: u64 = env.parse("METRICS_WINDOW_SECS", DEFAULT_WINDOW_SECS)?;
        if window_secs == 0 {
            return Err(invalid("METRICS_WINDOW_SECS", "must be at least 1"));
        }
        let slo_interval_secs: u64 = env.parse("SLO_INTERVAL_SECS", 30)?;
        if slo_interval_secs == 0 {
            return Err(invalid("SLO_INTERVAL_SECS", "must be at least 1"));
        }

        let slo = SloTargets {
            api_availability_pct: env.parse_pct(
                "SLO_API_AVAILABILITY_PCT",
                defaults.slo.api_availability_pct,
            )?,
            api_latency_p95_ms: env
                .parse_non_negative("SLO_API_LATENCY_P95_MS", defaults.slo.api_latency_p95_ms)?,
            job_success_rate_pct: env.parse_pct(
                "SLO_JOB_SUCCESS_RATE_PCT",
                defaults.slo.job_success_rate_pct,
            )?,
            queue_wait_p95_ms: env
                .parse_non_negative("SLO_QUEUE_WAIT_P95_MS", defaults.slo.queue_wait_p95_ms)?,
        };

        let log_format = match env.get("LOG_FORMAT") {
            Some(raw) => raw.parse::<LogFormat>().map_err(|reason| ConfigError::Parse {
                key: key("LOG_FORMAT"),
                value: raw.clone(),
                reason,
            })?,
            None => defaults.log_format,
        };

        Ok(Self {
            data_dir: env.get("DATA_DIR").map_or(defaults.data_dir, PathBuf::from),
            manifest_path: env
                .get("MANIFEST")
                .map_or(defaults.manifest_path, PathBuf::from),
            queue: QueueConfig {
                concurrency,
                retry: RetryPolicy::exponential(max_attempts, Duration::from_millis(base_retry_ms)),
                job_timeout: (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms)),
            },
            metrics_window: Duration::from_secs(window_secs),
            slo_interval: Duration::from_secs(slo_interval_secs),
            alert_history_limit: env.parse("ALERT_HISTORY_LIMIT", defaults.alert_history_limit)?,
            slo,
            log_format,
        })
    }

    /// Directory holding one JSON file per job.
    pub fn jobs_dir(&self) -> PathBuf {
        self.data_dir.join("jobs")
    }
}

fn key(name: &str) -> String {
    format!("{PREFIX}{name}")
}

fn invalid(name: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key(name),
        reason: reason.to_string(),
    }
}

struct Lookup<F>(F);

impl<F> Lookup<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, name: &str) -> Option<String> {
        (self.0)(&key(name)).filter(|v| !v.trim().is_empty())
    }

    fn parse<T>(&self, name: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(name) {
            Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Parse {
                key: key(name),
                value: raw.clone(),
                reason: e.to_string(),
            }),
            None => Ok(default),
        }
    }

    fn parse_non_negative(&self, name: &str, default: f64) -> Result<f64, ConfigError> {
        let value: f64 = self.parse(name, default)?;
        if !value.is_finite() || value < 0.0 {
            return Err(invalid(name, "must be a non-negative number"));
        }
        Ok(value)
    }

    fn parse_pct(&self, name: &str, default: f64) -> Result<f64, ConfigError> {
        let value = self.parse_non_negative(name, default)?;
        if value > 100.0 {
            warn!(key = %key(name), value, "percentage target above 100 can never be met");
        }
        Ok(value)
    }
}
