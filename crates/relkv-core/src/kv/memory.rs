use crate::kv::{FindResult, KeyValueTransaction};
use std::collections::BTreeMap;

///
/// MemoryStore
///
/// Sorted in-memory implementation of [`KeyValueTransaction`].
///

#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
    prefix: Vec<u8>,
    cursor: Option<usize>,
    epoch: u64,
    modifications: BTreeMap<Vec<u8>, u64>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total pairs in the store, ignoring the active prefix.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every pair in key order, ignoring the active prefix.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_slice(), value.as_slice()))
    }

    // Absolute bounds `[lo, hi)` of the active prefix.
    fn window(&self) -> (usize, usize) {
        let prefix = self.prefix.as_slice();
        let lo = self
            .entries
            .partition_point(|(key, _)| key.as_slice() < prefix);
        let hi = self.entries.partition_point(|(key, _)| {
            key.as_slice() < prefix || key.starts_with(prefix)
        });

        (lo, hi)
    }

    const fn bump(&mut self) {
        self.epoch += 1;
    }

    fn current(&self) -> Option<&(Vec<u8>, Vec<u8>)> {
        let (lo, hi) = self.window();

        self.cursor
            .filter(|pos| (lo..hi).contains(pos))
            .and_then(|pos| self.entries.get(pos))
    }
}

impl KeyValueTransaction for MemoryStore {
    fn set_prefix(&mut self, prefix: &[u8]) {
        prefix.clone_into(&mut self.prefix);
        self.cursor = None;
        self.bump();
    }

    fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    fn find(&mut self, key: &[u8]) -> FindResult {
        self.bump();
        let (lo, hi) = self.window();
        if lo == hi {
            self.cursor = None;
            return FindResult::NotFound;
        }

        let window = &self.entries[lo..hi];
        match window.binary_search_by(|(probe, _)| probe.as_slice().cmp(key)) {
            Ok(pos) => {
                self.cursor = Some(lo + pos);
                FindResult::Exact
            }
            Err(0) => {
                self.cursor = Some(lo);
                FindResult::Next
            }
            Err(pos) => {
                self.cursor = Some(lo + pos - 1);
                FindResult::Previous
            }
        }
    }

    fn find_first(&mut self) -> bool {
        self.set_key_index(0)
    }

    fn find_last(&mut self) -> bool {
        let count = self.key_value_count();
        self.set_key_index(count - 1)
    }

    fn find_next(&mut self) -> bool {
        let index = self.key_index();
        if index < 0 {
            return self.find_first();
        }

        self.set_key_index(index + 1)
    }

    fn find_previous(&mut self) -> bool {
        let index = self.key_index();
        if index < 0 {
            return self.find_last();
        }

        self.set_key_index(index - 1)
    }

    fn key_index(&self) -> i64 {
        let (lo, hi) = self.window();
        match self.cursor {
            Some(pos) if (lo..hi).contains(&pos) => i64::try_from(pos - lo).unwrap_or(-1),
            _ => -1,
        }
    }

    fn set_key_index(&mut self, index: i64) -> bool {
        self.bump();
        let (lo, hi) = self.window();
        let target = usize::try_from(index)
            .ok()
            .and_then(|offset| lo.checked_add(offset))
            .filter(|pos| *pos < hi);

        self.cursor = target;
        target.is_some()
    }

    fn key_value_count(&self) -> i64 {
        let (lo, hi) = self.window();

        i64::try_from(hi - lo).unwrap_or(i64::MAX)
    }

    fn key(&self) -> Option<&[u8]> {
        self.current().map(|(key, _)| key.as_slice())
    }

    fn value(&self) -> Option<&[u8]> {
        self.current().map(|(_, value)| value.as_slice())
    }

    fn set_value(&mut self, value: &[u8]) -> bool {
        if self.current().is_none() {
            return false;
        }
        self.bump();
        match self.cursor.and_then(|pos| self.entries.get_mut(pos)) {
            Some((_, stored)) => {
                value.clone_into(stored);
                true
            }
            None => false,
        }
    }

    fn erase_current(&mut self) -> bool {
        if self.current().is_none() {
            return false;
        }
        self.bump();
        if let Some(pos) = self.cursor.take() {
            self.entries.remove(pos);
        }

        true
    }

    fn erase_range(&mut self, start: i64, end: i64) -> u64 {
        self.bump();
        self.cursor = None;

        let (lo, hi) = self.window();
        let count = hi - lo;
        let start = usize::try_from(start.max(0)).unwrap_or(usize::MAX);
        let end = usize::try_from(end).map_or(0, |end| end.saturating_add(1).min(count));
        if start >= end {
            return 0;
        }

        self.entries.drain(lo + start..lo + end);
        (end - start) as u64
    }

    fn erase_all(&mut self) -> u64 {
        self.erase_range(0, self.key_value_count() - 1)
    }

    fn create_or_update(&mut self, key: &[u8], value: &[u8]) -> bool {
        self.bump();
        match self
            .entries
            .binary_search_by(|(probe, _)| probe.as_slice().cmp(key))
        {
            Ok(pos) => {
                value.clone_into(&mut self.entries[pos].1);
                self.cursor = Some(pos);
                false
            }
            Err(pos) => {
                self.entries.insert(pos, (key.to_vec(), value.to_vec()));
                self.cursor = Some(pos);
                true
            }
        }
    }

    fn epoch(&self) -> u64 {
        self.epoch
    }

    fn modification_count(&self, space: &[u8]) -> u64 {
        self.modifications.get(space).copied().unwrap_or(0)
    }

    fn note_modification(&mut self, space: &[u8]) {
        *self.modifications.entry(space.to_vec()).or_default() += 1;
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    fn store(keys: &[&[u8]]) -> MemoryStore {
        let mut store = MemoryStore::new();
        for key in keys {
            store.create_or_update(key, b"v");
        }
        store
    }

    #[test]
    fn find_prefers_previous_over_next() {
        let mut s = store(&[b"a1", b"a3", b"a5", b"b1"]);
        s.set_prefix(b"a");

        assert_eq!(s.find(b"a3"), FindResult::Exact);
        assert_eq!(s.key_index(), 1);
        assert_eq!(s.find(b"a4"), FindResult::Previous);
        assert_eq!(s.key(), Some(&b"a3"[..]));
        assert_eq!(s.find(b"a0"), FindResult::Next);
        assert_eq!(s.key(), Some(&b"a1"[..]));
        assert_eq!(s.find(b"a9"), FindResult::Previous);
        assert_eq!(s.key(), Some(&b"a5"[..]));

        s.set_prefix(b"c");
        assert_eq!(s.find(b"c1"), FindResult::NotFound);
        assert_eq!(s.key(), None);
    }

    #[test]
    fn key_indexes_are_prefix_relative() {
        let mut s = store(&[b"a1", b"b1", b"b2", b"b3", b"c1"]);
        s.set_prefix(b"b");

        assert_eq!(s.key_value_count(), 3);
        assert!(s.set_key_index(2));
        assert_eq!(s.key(), Some(&b"b3"[..]));
        assert!(!s.find_next());
        assert!(!s.set_key_index(3));
        assert!(!s.set_key_index(-1));
        assert!(s.find_last());
        assert!(s.find_previous());
        assert_eq!(s.key(), Some(&b"b2"[..]));
    }

    #[test]
    fn erase_range_is_inclusive_and_clamped() {
        let mut s = store(&[b"a1", b"b1", b"b2", b"b3", b"b4", b"c1"]);
        s.set_prefix(b"b");

        assert_eq!(s.erase_range(1, 2), 2);
        assert_eq!(s.key_value_count(), 2);
        assert_eq!(s.erase_range(1, 100), 1);
        assert_eq!(s.erase_range(3, 1), 0);
        assert_eq!(s.erase_all(), 1);
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn every_reposition_advances_the_epoch() {
        let mut s = store(&[b"a1", b"a2"]);
        let start = s.epoch();

        s.set_prefix(b"a");
        s.find_first();
        s.find_next();
        assert_eq!(s.epoch(), start + 3);

        assert!(!s.create_or_update(b"a2", b"x"));
        assert!(s.set_value(b"y"));
        assert_eq!(s.value(), Some(&b"y"[..]));
        assert!(s.epoch() > start + 3);
    }

    #[test]
    fn modification_counts_are_per_space() {
        let mut s = MemoryStore::new();
        assert_eq!(s.modification_count(b"a"), 0);

        s.note_modification(b"a");
        s.note_modification(b"a");
        s.note_modification(b"b");
        assert_eq!(s.modification_count(b"a"), 2);
        assert_eq!(s.modification_count(b"b"), 1);
        assert_eq!(s.modification_count(b"ab"), 0);
    }

    #[test]
    fn erase_current_unpositions_the_cursor() {
        let mut s = store(&[b"a1", b"a2"]);
        s.set_prefix(b"a");

        assert!(s.find_exact(b"a1"));
        assert!(s.erase_current());
        assert_eq!(s.key(), None);
        assert!(!s.erase_current());
        assert_eq!(s.key_value_count(), 1);
    }
}
