//! Module: db::cursor
//! Responsibility: bounded prefix scans over the shared transaction cursor
//! that survive unrelated repositioning.
//! Does not own: decoding of the keys and values it lands on.
//! Boundary: every multi-row read walks a `PrefixScan`.

#[cfg(test)]
mod tests;

use crate::{
    error::{ErrorClass, ErrorDetail, ErrorOrigin, InternalError},
    kv::{FindResult, KeyValueTransaction},
    obs::sink::{self, MetricsEvent},
};
use std::ops::Bound;
use thiserror::Error as ThisError;
use tracing::trace;

///
/// CursorError
///

#[derive(Debug, ThisError)]
pub enum CursorError {
    #[error("relation was modified during iteration")]
    ModifiedDuringIteration,

    #[error("scan could not reposition to index {index}")]
    ReseekFailed { index: i64 },
}

impl From<CursorError> for InternalError {
    fn from(err: CursorError) -> Self {
        let class = match err {
            CursorError::ModifiedDuringIteration => ErrorClass::IterationInvalidated,
            CursorError::ReseekFailed { .. } => ErrorClass::InvariantViolation,
        };

        Self {
            class,
            origin: ErrorOrigin::Cursor,
            message: err.to_string(),
            detail: Some(ErrorDetail::Cursor(err)),
        }
    }
}

///
/// ScanOrder
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ScanOrder {
    #[default]
    Ascending,
    Descending,
}

///
/// ScanState
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ScanState {
    Unpositioned,
    Positioned { index: i64 },
    Exhausted,
}

///
/// PrefixScan
///
/// Walks the keys under one prefix inside a closed ordinal window.
///
/// The window is resolved on the first step. Afterwards the scan advances the
/// physical cursor while the store epoch is unchanged, and re-seeks by ordinal
/// when another operation moved the cursor in between. A change of the owning
/// relation's modification counter makes ordinals meaningless and fails the
/// scan instead.
///

#[derive(Debug)]
pub(crate) struct PrefixScan {
    prefix: Vec<u8>,
    start: Bound<Vec<u8>>,
    end: Bound<Vec<u8>>,
    order: ScanOrder,
    state: ScanState,

    // resolved window, inclusive
    first: i64,
    last: i64,

    epoch: u64,
    modifications: u64,
}

impl PrefixScan {
    /// Scan every key under `prefix`. Bounds are full keys.
    pub(crate) const fn new(
        prefix: Vec<u8>,
        start: Bound<Vec<u8>>,
        end: Bound<Vec<u8>>,
        order: ScanOrder,
    ) -> Self {
        Self {
            prefix,
            start,
            end,
            order,
            state: ScanState::Unpositioned,
            first: 0,
            last: -1,
            epoch: 0,
            modifications: 0,
        }
    }

    pub(crate) const fn all(prefix: Vec<u8>, order: ScanOrder) -> Self {
        Self::new(prefix, Bound::Unbounded, Bound::Unbounded, order)
    }

    /// A scan that yields nothing.
    pub(crate) fn empty(prefix: Vec<u8>, order: ScanOrder) -> Self {
        let mut scan = Self::all(prefix, order);
        scan.state = ScanState::Exhausted;

        scan
    }

    /// Resolve the inclusive ordinal window without moving onto a key.
    /// Leaves the scan prefix active.
    pub(crate) fn window(&mut self, tr: &mut dyn KeyValueTransaction) -> (i64, i64) {
        if self.state == ScanState::Exhausted {
            return (0, -1);
        }
        tr.set_prefix(&self.prefix);
        self.resolve_window(tr);

        (self.first, self.last)
    }

    /// Move to the next key of the window. On `Ok(true)` the transaction
    /// cursor sits on that key; `modifications` is the owning relation's
    /// current structural modification counter.
    pub(crate) fn advance(
        &mut self,
        tr: &mut dyn KeyValueTransaction,
        modifications: u64,
    ) -> Result<bool, CursorError> {
        match self.state {
            ScanState::Exhausted => Ok(false),

            ScanState::Unpositioned => {
                self.modifications = modifications;
                tr.set_prefix(&self.prefix);
                self.resolve_window(tr);

                let index = match self.order {
                    ScanOrder::Ascending => self.first,
                    ScanOrder::Descending => self.last,
                };
                self.seek(tr, index)
            }

            ScanState::Positioned { index } => {
                let next = match self.order {
                    ScanOrder::Ascending => index + 1,
                    ScanOrder::Descending => index - 1,
                };
                if !self.in_window(next) {
                    self.state = ScanState::Exhausted;
                    return Ok(false);
                }

                if tr.epoch() == self.epoch {
                    let moved = match self.order {
                        ScanOrder::Ascending => tr.find_next(),
                        ScanOrder::Descending => tr.find_previous(),
                    };
                    if !moved {
                        return Err(CursorError::ReseekFailed { index: next });
                    }
                    self.state = ScanState::Positioned { index: next };
                    self.epoch = tr.epoch();

                    return Ok(true);
                }

                if modifications != self.modifications {
                    self.state = ScanState::Exhausted;
                    sink::record(MetricsEvent::IterationInvalidated);
                    return Err(CursorError::ModifiedDuringIteration);
                }

                trace!(index = next, "cursor moved by another operation; reseeking");
                sink::record(MetricsEvent::CursorReseek);
                tr.set_prefix(&self.prefix);
                self.seek(tr, next)
            }
        }
    }

    fn seek(&mut self, tr: &mut dyn KeyValueTransaction, index: i64) -> Result<bool, CursorError> {
        if !self.in_window(index) {
            self.state = ScanState::Exhausted;
            return Ok(false);
        }
        if !tr.set_key_index(index) {
            return Err(CursorError::ReseekFailed { index });
        }

        self.state = ScanState::Positioned { index };
        self.epoch = tr.epoch();

        Ok(true)
    }

    const fn in_window(&self, index: i64) -> bool {
        index >= self.first && index <= self.last
    }

    // Convert the bounds into the inclusive ordinal window [first, last].
    fn resolve_window(&mut self, tr: &mut dyn KeyValueTransaction) {
        self.first = match &self.start {
            Bound::Unbounded => 0,
            Bound::Included(key) | Bound::Excluded(key) => {
                let excluded = matches!(self.start, Bound::Excluded(_));
                match tr.find(key) {
                    FindResult::Exact if excluded => tr.key_index() + 1,
                    FindResult::Exact | FindResult::Next => tr.key_index(),
                    FindResult::Previous => tr.key_index() + 1,
                    FindResult::NotFound => 0,
                }
            }
        };

        self.last = match &self.end {
            Bound::Unbounded => tr.key_value_count() - 1,
            Bound::Included(key) | Bound::Excluded(key) => {
                let excluded = matches!(self.end, Bound::Excluded(_));
                match tr.find(key) {
                    FindResult::Exact if excluded => tr.key_index() - 1,
                    FindResult::Exact | FindResult::Previous => tr.key_index(),
                    FindResult::Next => tr.key_index() - 1,
                    FindResult::NotFound => -1,
                }
            }
        };
    }
}
