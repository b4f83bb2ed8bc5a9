//! Module: kv
//! Responsibility: the ordered key-value transaction contract the engine
//! runs on, plus an in-memory implementation.
//! Does not own: durability or isolation between transactions.
//! Boundary: every engine read and write goes through `KeyValueTransaction`.

mod memory;

pub use memory::MemoryStore;

///
/// FindResult
///
/// Outcome of positioning the cursor on a key inside the active prefix.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FindResult {
    /// Cursor is on the requested key.
    Exact,
    /// Key is absent; cursor is on the nearest smaller key.
    Previous,
    /// Key is absent and nothing smaller exists; cursor is on the nearest larger key.
    Next,
    /// Prefix is empty; cursor is unpositioned.
    NotFound,
}

///
/// KeyValueTransaction
///
/// One ordered byte-key/byte-value transaction with a single shared cursor.
///
/// The active prefix restricts finds, key indexes and counts. Keys passed in
/// and returned are always full keys. Key indexes are relative to the first
/// key of the active prefix.
///
/// `epoch` increases whenever the shared cursor is repositioned or the data
/// changes, so scans can detect that somebody else moved the cursor.
///
/// Structural modification counters live on the transaction, one per key
/// space (a relation's primary prefix or a collection's prefix), so every
/// handle working in the same transaction sees the same count.
///

pub trait KeyValueTransaction {
    fn set_prefix(&mut self, prefix: &[u8]);

    fn prefix(&self) -> &[u8];

    fn find(&mut self, key: &[u8]) -> FindResult;

    fn find_exact(&mut self, key: &[u8]) -> bool {
        self.find(key) == FindResult::Exact
    }

    fn find_first(&mut self) -> bool;

    fn find_last(&mut self) -> bool;

    fn find_next(&mut self) -> bool;

    fn find_previous(&mut self) -> bool;

    /// Index of the current key within the prefix, or -1 when unpositioned.
    fn key_index(&self) -> i64;

    fn set_key_index(&mut self, index: i64) -> bool;

    fn key_value_count(&self) -> i64;

    fn key(&self) -> Option<&[u8]>;

    fn value(&self) -> Option<&[u8]>;

    fn set_value(&mut self, value: &[u8]) -> bool;

    fn erase_current(&mut self) -> bool;

    /// Erase the inclusive index range `[start, end]` within the prefix,
    /// returning how many pairs were removed.
    fn erase_range(&mut self, start: i64, end: i64) -> u64;

    fn erase_all(&mut self) -> u64;

    /// Insert or overwrite one pair. Returns `true` when the key was new.
    fn create_or_update(&mut self, key: &[u8], value: &[u8]) -> bool;

    fn epoch(&self) -> u64;

    /// Structural modifications recorded for `space` in this transaction.
    fn modification_count(&self, space: &[u8]) -> u64;

    /// Record that keys were added to or removed from `space`.
    fn note_modification(&mut self, space: &[u8]);
}

/// Count the keys under `prefix`, leaving that prefix active.
pub(crate) fn count_prefix(tr: &mut dyn KeyValueTransaction, prefix: &[u8]) -> u64 {
    tr.set_prefix(prefix);

    tr.key_value_count().max(0).cast_unsigned()
}

/// Erase every key under `prefix`, leaving that prefix active.
pub(crate) fn erase_prefix(tr: &mut dyn KeyValueTransaction, prefix: &[u8]) -> u64 {
    tr.set_prefix(prefix);

    tr.erase_all()
}
