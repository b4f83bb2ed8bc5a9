//! Metrics sink boundary.
//!
//! Engine code records `MetricsEvent`s only; the global counters in
//! `obs::metrics` are written exclusively from here.

use crate::obs::metrics::{self, EventState, relation_entry};
use relkv_config::RebuildStrategy;
use std::{cell::RefCell, rc::Rc};

thread_local! {
    static SINK_OVERRIDE: RefCell<Option<Rc<dyn MetricsSink>>> = RefCell::new(None);
}

///
/// MetricsEvent
///

#[derive(Clone, Copy, Debug)]
pub enum MetricsEvent<'a> {
    SchemaResolved {
        relation: &'a str,
        version: u32,
        reused: bool,
    },
    SelfHealReset {
        relation: &'a str,
        rows: u64,
    },
    IndexDropped {
        relation: &'a str,
        index: u32,
    },
    IndexRebuilt {
        relation: &'a str,
        index: u32,
        rows: u64,
        strategy: RebuildStrategy,
    },
    RowWrite {
        relation: &'a str,
        created: bool,
    },
    RowDelete {
        relation: &'a str,
        rows: u64,
    },
    CascadeFree {
        relation: &'a str,
        collections: u64,
    },
    CursorReseek,
    IterationInvalidated,
}

///
/// MetricsSink
///

pub trait MetricsSink {
    fn record(&self, event: MetricsEvent<'_>);
}

/// GlobalMetricsSink
/// Default thread-local sink that writes into global metrics state.
/// Acts as the concrete sink when no scoped override is installed.

pub(crate) struct GlobalMetricsSink;

impl MetricsSink for GlobalMetricsSink {
    fn record(&self, event: MetricsEvent<'_>) {
        metrics::with_state_mut(|m| match event {
            MetricsEvent::SchemaResolved {
                relation,
                version,
                reused,
            } => {
                if reused {
                    m.ops.schema_reused = m.ops.schema_reused.saturating_add(1);
                } else {
                    m.ops.schema_persisted = m.ops.schema_persisted.saturating_add(1);
                }
                relation_entry(m, relation).schema_version = version;
            }

            MetricsEvent::SelfHealReset { relation, rows } => {
                m.ops.self_heal_resets = m.ops.self_heal_resets.saturating_add(1);
                m.ops.rows_deleted = m.ops.rows_deleted.saturating_add(rows);
                let entry = relation_entry(m, relation);
                entry.self_heal_resets = entry.self_heal_resets.saturating_add(1);
                entry.rows_deleted = entry.rows_deleted.saturating_add(rows);
            }

            MetricsEvent::IndexDropped { .. } => {
                m.ops.indexes_dropped = m.ops.indexes_dropped.saturating_add(1);
            }

            MetricsEvent::IndexRebuilt {
                relation,
                rows,
                strategy,
                ..
            } => {
                m.ops.indexes_rebuilt = m.ops.indexes_rebuilt.saturating_add(1);
                match strategy {
                    RebuildStrategy::Splice => {
                        m.ops.splice_rebuilds = m.ops.splice_rebuilds.saturating_add(1);
                    }
                    RebuildStrategy::Materialize => {
                        m.ops.materialize_rebuilds = m.ops.materialize_rebuilds.saturating_add(1);
                    }
                }
                m.ops.index_rows_rebuilt = m.ops.index_rows_rebuilt.saturating_add(rows);
                let entry = relation_entry(m, relation);
                entry.index_rows_rebuilt = entry.index_rows_rebuilt.saturating_add(rows);
            }

            MetricsEvent::RowWrite { relation, created } => {
                let entry = relation_entry(m, relation);
                if created {
                    entry.rows_inserted = entry.rows_inserted.saturating_add(1);
                    m.ops.rows_inserted = m.ops.rows_inserted.saturating_add(1);
                } else {
                    entry.rows_updated = entry.rows_updated.saturating_add(1);
                    m.ops.rows_updated = m.ops.rows_updated.saturating_add(1);
                }
            }

            MetricsEvent::RowDelete { relation, rows } => {
                m.ops.rows_deleted = m.ops.rows_deleted.saturating_add(rows);
                let entry = relation_entry(m, relation);
                entry.rows_deleted = entry.rows_deleted.saturating_add(rows);
            }

            MetricsEvent::CascadeFree {
                relation,
                collections,
            } => {
                m.ops.collections_freed = m.ops.collections_freed.saturating_add(collections);
                let entry = relation_entry(m, relation);
                entry.collections_freed = entry.collections_freed.saturating_add(collections);
            }

            MetricsEvent::CursorReseek => {
                m.ops.cursor_reseeks = m.ops.cursor_reseeks.saturating_add(1);
            }

            MetricsEvent::IterationInvalidated => {
                m.ops.iterations_invalidated = m.ops.iterations_invalidated.saturating_add(1);
            }
        });
    }
}

pub(crate) const GLOBAL_METRICS_SINK: GlobalMetricsSink = GlobalMetricsSink;

pub(crate) fn record(event: MetricsEvent<'_>) {
    let override_sink = SINK_OVERRIDE.with(|cell| cell.borrow().clone());
    match override_sink {
        Some(sink) => sink.record(event),
        None => GLOBAL_METRICS_SINK.record(event),
    }
}

/// Snapshot the current metrics state.
#[must_use]
pub fn metrics_report() -> EventState {
    metrics::with_state(Clone::clone)
}

/// Reset all metrics state.
pub fn metrics_reset_all() {
    metrics::reset();
}

/// Run a closure with a temporary metrics sink override.
pub fn with_metrics_sink<T>(sink: Rc<dyn MetricsSink>, f: impl FnOnce() -> T) -> T {
    struct Guard(Option<Rc<dyn MetricsSink>>);

    impl Drop for Guard {
        fn drop(&mut self) {
            let prev = self.0.take();
            SINK_OVERRIDE.with(|cell| {
                *cell.borrow_mut() = prev;
            });
        }
    }

    let prev = SINK_OVERRIDE.with(|cell| cell.borrow_mut().replace(sink));
    let _guard = Guard(prev);

    f()
}

///
/// TESTS
///
