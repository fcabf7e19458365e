//! Logging, metrics, SLO evaluation and alerting (shared setup).

/// Logging configuration (filters, output format).
pub mod logging;

/// Rolling-window metrics collection and text export.
pub mod metrics;

/// Service-level objective evaluation.
pub mod slo;

/// Alert lifecycle driven by SLO evaluations.
pub mod alerts;

pub use alerts::{Alert, AlertManager, AlertStatus, AlertTransitions};
pub use metrics::{MetricsCollector, MetricsSummary, QueueSnapshot};
pub use slo::{Comparator, SloCheck, SloEvaluation, SloTargets, evaluate_slo};
