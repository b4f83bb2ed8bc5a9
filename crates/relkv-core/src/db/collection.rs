//! Module: db::collection
//! Responsibility: ordered byte-key/byte-value collections owned by rows.
//! Does not own: lifetime; rows free their collections through cascade free.
//! Boundary: every collection key lives under the nested-collection prefix.

use crate::{
    codec::{ByteReader, ByteWriter},
    db::{
        cursor::{PrefixScan, ScanOrder},
        prefix,
    },
    error::InternalError,
    kv::{self, KeyValueTransaction},
    traits::CollectionId,
};
use std::ops::Bound;
use tracing::debug;

///
/// NestedCollection
///
/// Handle over one nested collection. Scans follow the same repositioning
/// rules as relation scans, driven by the transaction's modification counter
/// for the collection's key space.
///

#[derive(Debug)]
pub struct NestedCollection {
    id: u64,
    base: Vec<u8>,
}

impl NestedCollection {
    /// Allocate a fresh collection id from the persisted counter.
    pub fn create(tr: &mut dyn KeyValueTransaction) -> Result<Self, InternalError> {
        tr.set_prefix(prefix::LAST_COLLECTION_ID);
        let last = if tr.find_exact(prefix::LAST_COLLECTION_ID) {
            ByteReader::new(tr.value().unwrap_or_default()).read_vuint()?
        } else {
            0
        };

        let id = last + 1;
        let mut w = ByteWriter::new();
        w.write_vuint(id);
        tr.create_or_update(prefix::LAST_COLLECTION_ID, &w.into_bytes());
        debug!(collection = id, "nested collection allocated");

        Ok(Self::open(CollectionId(id)))
    }

    #[must_use]
    pub fn open(id: CollectionId) -> Self {
        Self {
            id: id.0,
            base: prefix::collection(id.0),
        }
    }

    #[must_use]
    pub const fn id(&self) -> CollectionId {
        CollectionId(self.id)
    }

    fn key(&self, key: &[u8]) -> Vec<u8> {
        let mut full = self.base.clone();
        full.extend_from_slice(key);
        full
    }

    fn touch(&self, tr: &mut dyn KeyValueTransaction) {
        tr.note_modification(&self.base);
    }

    /// Insert or overwrite. Returns `true` when the key was new.
    pub fn insert(&self, tr: &mut dyn KeyValueTransaction, key: &[u8], value: &[u8]) -> bool {
        let created = tr.create_or_update(&self.key(key), value);
        if created {
            self.touch(tr);
        }

        created
    }

    pub fn get(&self, tr: &mut dyn KeyValueTransaction, key: &[u8]) -> Option<Vec<u8>> {
        tr.set_prefix(&self.base);
        if !tr.find_exact(&self.key(key)) {
            return None;
        }

        tr.value().map(<[u8]>::to_vec)
    }

    pub fn contains(&self, tr: &mut dyn KeyValueTransaction, key: &[u8]) -> bool {
        tr.set_prefix(&self.base);

        tr.find_exact(&self.key(key))
    }

    pub fn remove(&self, tr: &mut dyn KeyValueTransaction, key: &[u8]) -> bool {
        tr.set_prefix(&self.base);
        let removed = tr.find_exact(&self.key(key)) && tr.erase_current();
        if removed {
            self.touch(tr);
        }

        removed
    }

    pub fn clear(&self, tr: &mut dyn KeyValueTransaction) -> u64 {
        let erased = kv::erase_prefix(tr, &self.base);
        if erased > 0 {
            self.touch(tr);
        }

        erased
    }

    pub fn count(&self, tr: &mut dyn KeyValueTransaction) -> u64 {
        kv::count_prefix(tr, &self.base)
    }

    pub fn iter(&self, order: ScanOrder) -> CollectionIter<'_> {
        self.range(Bound::Unbounded, Bound::Unbounded, order)
    }

    /// Entries whose key lies between the bounds; keys are relative to the
    /// collection.
    pub fn range(
        &self,
        start: Bound<&[u8]>,
        end: Bound<&[u8]>,
        order: ScanOrder,
    ) -> CollectionIter<'_> {
        let scan = PrefixScan::new(
            self.base.clone(),
            start.map(|key| self.key(key)),
            end.map(|key| self.key(key)),
            order,
        );

        CollectionIter {
            collection: self,
            scan,
        }
    }

    /// Erase every entry between the bounds. Returns how many were removed.
    pub fn remove_range(
        &self,
        tr: &mut dyn KeyValueTransaction,
        start: Bound<&[u8]>,
        end: Bound<&[u8]>,
    ) -> u64 {
        let mut scan = PrefixScan::new(
            self.base.clone(),
            start.map(|key| self.key(key)),
            end.map(|key| self.key(key)),
            ScanOrder::Ascending,
        );
        let (first, last) = scan.window(tr);
        if first > last {
            return 0;
        }

        let erased = tr.erase_range(first, last);
        if erased > 0 {
            self.touch(tr);
        }

        erased
    }
}

///
/// CollectionIter
///

pub struct CollectionIter<'c> {
    collection: &'c NestedCollection,
    scan: PrefixScan,
}

impl CollectionIter<'_> {
    /// Next entry as (relative key, value).
    pub fn next(
        &mut self,
        tr: &mut dyn KeyValueTransaction,
    ) -> Result<Option<(Vec<u8>, Vec<u8>)>, InternalError> {
        let modifications = tr.modification_count(&self.collection.base);
        if !self.scan.advance(tr, modifications)? {
            return Ok(None);
        }
        let (Some(key), Some(value)) = (tr.key(), tr.value()) else {
            return Err(InternalError::store_invariant("positioned cursor returned no key"));
        };
        let key = key.get(self.collection.base.len()..).unwrap_or_default();

        Ok(Some((key.to_vec(), value.to_vec())))
    }

    pub fn collect(
        mut self,
        tr: &mut dyn KeyValueTransaction,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, InternalError> {
        let mut entries = Vec::new();
        while let Some(entry) = self.next(tr)? {
            entries.push(entry);
        }

        Ok(entries)
    }
}

///
/// TESTS
///
