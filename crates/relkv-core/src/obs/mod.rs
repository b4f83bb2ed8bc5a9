//! Observability: runtime counters and the sink abstraction.
//!
//! Structured logs go through `tracing`; counters go through `MetricsEvent`.
//! This module does not access storage.

pub(crate) mod metrics;
pub(crate) mod sink;

// re-exports
pub use metrics::{EventOps, EventState, RelationCounters};
pub use sink::{MetricsEvent, MetricsSink, metrics_report, metrics_reset_all, with_metrics_sink};
