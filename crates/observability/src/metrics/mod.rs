//! Rolling-window metrics.
//!
//! - `MetricsCollector` keeps windowed samples plus lifetime counters
//! - `MetricsSummary` is derived on demand from a collector and a queue snapshot
//! - `render_text` flattens a summary into `name value` lines

pub mod collector;
pub mod export;
pub mod percentile;
pub mod summary;

pub use collector::{DEFAULT_WINDOW_SECS, LifetimeCounters, MetricsCollector, SampleKind};
pub use export::render_text;
pub use percentile::{p95, percentile};
pub use summary::{ApiSummary, JobSummary, MetricsSummary, QueueSnapshot};
