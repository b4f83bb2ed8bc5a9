use serde::{Deserialize, Serialize};
use std::{cell::RefCell, collections::BTreeMap};

///
/// EventState
/// Ephemeral, in-memory counters for engine operations.
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct EventState {
    pub ops: EventOps,
    pub relations: BTreeMap<String, RelationCounters>,
}

///
/// EventOps
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct EventOps {
    // Schema resolution
    pub schema_reused: u64,
    pub schema_persisted: u64,
    pub self_heal_resets: u64,

    // Index maintenance
    pub indexes_dropped: u64,
    pub indexes_rebuilt: u64,
    pub splice_rebuilds: u64,
    pub materialize_rebuilds: u64,
    pub index_rows_rebuilt: u64,

    // Rows touched
    pub rows_inserted: u64,
    pub rows_updated: u64,
    pub rows_deleted: u64,
    pub collections_freed: u64,

    // Scan protocol
    pub cursor_reseeks: u64,
    pub iterations_invalidated: u64,
}

///
/// RelationCounters
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct RelationCounters {
    pub schema_version: u32,
    pub rows_inserted: u64,
    pub rows_updated: u64,
    pub rows_deleted: u64,
    pub index_rows_rebuilt: u64,
    pub collections_freed: u64,
    pub self_heal_resets: u64,
}

thread_local! {
    static EVENT_STATE: RefCell<EventState> = RefCell::new(EventState::default());
}

/// Borrow metrics immutably.
pub(crate) fn with_state<R>(f: impl FnOnce(&EventState) -> R) -> R {
    EVENT_STATE.with(|m| f(&m.borrow()))
}

/// Borrow metrics mutably.
pub(crate) fn with_state_mut<R>(f: impl FnOnce(&mut EventState) -> R) -> R {
    EVENT_STATE.with(|m| f(&mut m.borrow_mut()))
}

/// Reset all counters (useful in tests).
pub(crate) fn reset() {
    with_state_mut(|m| *m = EventState::default());
}

pub(crate) fn relation_entry<'a>(
    state: &'a mut EventState,
    relation: &str,
) -> &'a mut RelationCounters {
    state.relations.entry(relation.to_string()).or_default()
}
