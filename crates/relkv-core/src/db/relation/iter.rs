use crate::{
    codec::ByteWriter,
    db::{
        cursor::PrefixScan,
        index::{IndexError, splice::SkToPkMerger},
        prefix,
        relation::Relation,
    },
    error::InternalError,
    kv::KeyValueTransaction,
    traits::Record,
};
use std::{marker::PhantomData, sync::Arc};

///
/// RowIter
///
/// Primary-key ordered rows of a relation, read as record type `T`.
/// The transaction is passed to every step so callers may interleave other
/// reads and writes between steps.
///

pub struct RowIter<'r, R: Record, T: Record = R> {
    relation: &'r Relation<R>,
    scan: PrefixScan,
    _marker: PhantomData<fn() -> T>,
}

impl<'r, R: Record, T: Record> RowIter<'r, R, T> {
    pub(crate) const fn new(relation: &'r Relation<R>, scan: PrefixScan) -> Self {
        Self {
            relation,
            scan,
            _marker: PhantomData,
        }
    }

    pub fn next(&mut self, tr: &mut dyn KeyValueTransaction) -> Result<Option<T>, InternalError> {
        let modifications = self.relation.modification_count(tr);
        if !self.scan.advance(tr, modifications)? {
            return Ok(None);
        }
        let (Some(key), Some(value)) = (tr.key(), tr.value()) else {
            return Err(InternalError::store_invariant("positioned cursor returned no key"));
        };
        let (key, value) = (key.to_vec(), value.to_vec());

        self.relation.load_row::<T>(&key, &value).map(Some)
    }

    /// Drain the remaining rows.
    pub fn collect(mut self, tr: &mut dyn KeyValueTransaction) -> Result<Vec<T>, InternalError> {
        let mut rows = Vec::new();
        while let Some(row) = self.next(tr)? {
            rows.push(row);
        }

        Ok(rows)
    }
}

///
/// IndexIter
///
/// Rows in secondary-index order. Each index entry is turned back into its
/// primary key without decoding, then the row is read through the primary
/// partition.
///

pub struct IndexIter<'r, R: Record> {
    relation: &'r Relation<R>,
    scan: PrefixScan,
    merger: Arc<SkToPkMerger>,

    // offsets into each index key: end of the index prefix, end of the
    // caller-supplied values
    base: usize,
    params_end: usize,
    params: usize,
}

impl<'r, R: Record> IndexIter<'r, R> {
    pub(crate) const fn new(
        relation: &'r Relation<R>,
        scan: PrefixScan,
        merger: Arc<SkToPkMerger>,
        base: usize,
        params_end: usize,
        params: usize,
    ) -> Self {
        Self {
            relation,
            scan,
            merger,
            base,
            params_end,
            params,
        }
    }

    pub fn next(&mut self, tr: &mut dyn KeyValueTransaction) -> Result<Option<R>, InternalError> {
        let modifications = self.relation.modification_count(tr);
        if !self.scan.advance(tr, modifications)? {
            return Ok(None);
        }
        let Some(sk_key) = tr.key() else {
            return Err(InternalError::store_invariant("positioned cursor returned no key"));
        };

        let (Some(first), Some(second)) = (
            sk_key.get(self.base..self.params_end),
            sk_key.get(self.params_end..),
        ) else {
            return Err(InternalError::store_corruption("index key shorter than its scan prefix"));
        };
        let mut pk = ByteWriter::with_prefix(&prefix::primary(self.relation.id()));
        self.merger.merge(first, self.params, second, &mut pk)?;
        let pk = pk.into_bytes();

        tr.set_prefix(&prefix::primary(self.relation.id()));
        if !tr.find_exact(&pk) {
            return Err(IndexError::MissingEntry {
                relation: self.relation.name().to_string(),
                index: "primary".to_string(),
            }
            .into());
        }
        let value = tr.value().map(<[u8]>::to_vec).unwrap_or_default();

        self.relation.load_row::<R>(&pk, &value).map(Some)
    }

    /// Drain the remaining rows.
    pub fn collect(mut self, tr: &mut dyn KeyValueTransaction) -> Result<Vec<R>, InternalError> {
        let mut rows = Vec::new();
        while let Some(row) = self.next(tr)? {
            rows.push(row);
        }

        Ok(rows)
    }
}
