//! Module: db::relation
//! Responsibility: the typed handle over one relation's rows and indexes.
//! Does not own: schema resolution, index rebuilds or scan repositioning;
//! it wires those together per operation.
//! Boundary: every row write keeps primary rows, secondary keys and nested
//! collections consistent within the caller's transaction.

mod iter;

#[cfg(test)]
mod tests;

pub use iter::{IndexIter, RowIter};

use crate::{
    codec::ByteWriter,
    db::{
        cursor::{PrefixScan, ScanOrder},
        field::{FieldHandler, WriteCtx},
        free::{self, FreePlan},
        index::{self, IndexContext, IndexError, SpliceCache},
        prefix, registry,
        row::{self, LoaderCache, RowSource},
        schema::{RelationVersion, SecondaryKeyDef, resolve_schema},
    },
    error::{ErrorClass, ErrorDetail, ErrorOrigin, InternalError},
    kv::{self, KeyValueTransaction},
    obs::sink::{self, MetricsEvent},
    traits::{FieldValue, Record},
    value::{Value, format_key},
};
use relkv_config::DbConfig;
use std::{
    marker::PhantomData,
    ops::{Bound, RangeBounds},
    sync::Arc,
};
use thiserror::Error as ThisError;
use tracing::debug;

///
/// RelationError
///

#[derive(Debug, ThisError)]
pub enum RelationError {
    #[error("relation '{relation}' has no row with key {key}")]
    KeyNotFound { relation: String, key: String },

    #[error("relation '{relation}' already has a row with key {key}")]
    Conflict { relation: String, key: String },

    #[error("index '{index}' of relation '{relation}' matched more than one row")]
    Ambiguous { relation: String, index: String },

    #[error("relation '{relation}' has no index named '{index}'")]
    UnknownIndex { relation: String, index: String },

    #[error("relation '{relation}' has no apart field '{field}'")]
    UnknownApartField { relation: String, field: String },

    #[error("apart field '{field}' of relation '{relation}' is not set")]
    ApartFieldNotSet { relation: String, field: String },

    #[error("relation '{relation}' expected at most {expected} key values, got {found}")]
    KeyArity {
        relation: String,
        expected: usize,
        found: usize,
    },
}

impl From<RelationError> for InternalError {
    fn from(err: RelationError) -> Self {
        let class = match err {
            RelationError::KeyNotFound { .. } => ErrorClass::NotFound,
            RelationError::Conflict { .. } | RelationError::Ambiguous { .. } => {
                ErrorClass::Conflict
            }
            RelationError::ApartFieldNotSet { .. } => ErrorClass::InvariantViolation,
            RelationError::UnknownIndex { .. }
            | RelationError::UnknownApartField { .. }
            | RelationError::KeyArity { .. } => ErrorClass::Unsupported,
        };

        Self {
            class,
            origin: ErrorOrigin::Relation,
            message: err.to_string(),
            detail: Some(ErrorDetail::Relation(err)),
        }
    }
}

///
/// WriteMode
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum WriteMode {
    Insert,
    Upsert,
    Update,
}

///
/// Relation
///
/// Handle over the rows of record type `R`. Opening resolves the schema
/// version and synchronizes secondary indexes; the handle then caches
/// loaders, mergers and free routines for its lifetime.
///

#[derive(Debug)]
pub struct Relation<R: Record> {
    id: u64,
    name: String,
    versions: Vec<Arc<RelationVersion>>,
    current: Arc<RelationVersion>,
    apart: Vec<(String, Value)>,
    apart_count: usize,

    loaders: LoaderCache,
    splices: SpliceCache,
    free: FreePlan,

    _marker: PhantomData<fn() -> R>,
}

impl<R: Record> Relation<R> {
    /// Open the relation declared by `R` inside `tr`.
    pub fn open(
        tr: &mut dyn KeyValueTransaction,
        config: &DbConfig,
    ) -> Result<Self, InternalError> {
        let model = R::model();
        let id = registry::resolve_relation_id(tr, &model.name)?;
        let resolved = resolve_schema(tr, id, &model, config)?;
        let current = Arc::clone(resolved.current());

        let splices = SpliceCache::default();
        let ctx = IndexContext {
            relation_id: id,
            relation: &model.name,
            versions: &resolved.versions,
            splices: &splices,
        };
        index::sync_secondary_indexes::<R>(tr, &ctx, &resolved, config)?;

        debug!(relation = %model.name, id, version = current.version(), "relation opened");

        Ok(Self {
            id,
            free: FreePlan::new(resolved.versions.len()),
            versions: resolved.versions,
            current,
            name: model.name,
            apart: Vec::new(),
            apart_count: model.apart_fields.len(),
            loaders: LoaderCache::default(),
            splices,
            _marker: PhantomData,
        })
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Every persisted version, oldest first; the last one is current.
    #[must_use]
    pub fn versions(&self) -> &[Arc<RelationVersion>] {
        &self.versions
    }

    #[must_use]
    pub fn current_version(&self) -> &RelationVersion {
        &self.current
    }

    /// Structural modifications of this relation within `tr`. Every handle
    /// on the relation reads and bumps the same transaction-held counter.
    #[must_use]
    pub fn modification_count(&self, tr: &dyn KeyValueTransaction) -> u64 {
        tr.modification_count(&prefix::primary(self.id))
    }

    fn note_modification(&self, tr: &mut dyn KeyValueTransaction) {
        tr.note_modification(&prefix::primary(self.id));
    }

    /// Set the value this handle injects for an apart field.
    pub fn set_apart_field<V: FieldValue>(
        &mut self,
        field: &str,
        value: V,
    ) -> Result<(), InternalError> {
        let declared = self
            .current
            .primary_key_fields()
            .take(self.apart_count())
            .any(|def| def.name == field);
        if !declared {
            return Err(RelationError::UnknownApartField {
                relation: self.name.clone(),
                field: field.to_string(),
            }
            .into());
        }

        let value = value.to_value();
        match self.apart.iter_mut().find(|(name, _)| name == field) {
            Some((_, slot)) => *slot = value,
            None => self.apart.push((field.to_string(), value)),
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Insert a new row. Fails with a conflict if the key exists.
    pub fn insert(
        &self,
        tr: &mut dyn KeyValueTransaction,
        record: &R,
    ) -> Result<(), InternalError> {
        self.write(tr, record, WriteMode::Insert, false).map(|_| ())
    }

    /// Insert or overwrite a row. Returns `true` when the row was created.
    pub fn upsert(
        &self,
        tr: &mut dyn KeyValueTransaction,
        record: &R,
    ) -> Result<bool, InternalError> {
        self.write(tr, record, WriteMode::Upsert, false)
    }

    /// Overwrite an existing row. Fails with key-not-found otherwise.
    pub fn update(
        &self,
        tr: &mut dyn KeyValueTransaction,
        record: &R,
    ) -> Result<(), InternalError> {
        self.write(tr, record, WriteMode::Update, false).map(|_| ())
    }

    /// `upsert` without freeing nested collections of the old value.
    pub fn shallow_upsert(
        &self,
        tr: &mut dyn KeyValueTransaction,
        record: &R,
    ) -> Result<bool, InternalError> {
        self.write(tr, record, WriteMode::Upsert, true)
    }

    /// `update` without freeing nested collections of the old value.
    pub fn shallow_update(
        &self,
        tr: &mut dyn KeyValueTransaction,
        record: &R,
    ) -> Result<(), InternalError> {
        self.write(tr, record, WriteMode::Update, true).map(|_| ())
    }

    fn write(
        &self,
        tr: &mut dyn KeyValueTransaction,
        record: &R,
        mode: WriteMode,
        shallow: bool,
    ) -> Result<bool, InternalError> {
        self.apart_values()?;
        let source = RowSource::new(&self.apart, record);
        let key = row::primary_key_bytes(self.id, &self.current, &source)?;
        let value = row::value_bytes(&self.current, &source)?;
        let sk_keys = index::row_keys(self.id, &self.current, &source)?;

        tr.set_prefix(&prefix::primary(self.id));
        let old = if tr.find_exact(&key) {
            tr.value().map(<[u8]>::to_vec)
        } else {
            None
        };

        match (mode, &old) {
            (WriteMode::Insert, Some(_)) => {
                return Err(RelationError::Conflict {
                    relation: self.name.clone(),
                    key: self.describe_key(&key),
                }
                .into());
            }
            (WriteMode::Update, None) => {
                return Err(InternalError::key_not_found(&self.name, self.describe_key(&key)));
            }
            _ => {}
        }

        let mut structural = old.is_none();
        match &old {
            Some(old) => {
                let ctx = self.index_ctx();
                for (sk, new_key) in self.current.secondary_keys().iter().zip(&sk_keys) {
                    let old_key = ctx.spliced_key::<R>(sk, &key, old)?;
                    if old_key == *new_key {
                        continue;
                    }
                    self.erase_index_entry(tr, sk, &old_key)?;
                    self.put_index_entry(tr, sk, new_key)?;
                    structural = true;
                }

                if !shallow {
                    let owned = self.free.collections(&self.versions, old)?;
                    let kept = self.free.collections(&self.versions, &value)?;
                    let released: Vec<u64> =
                        owned.into_iter().filter(|id| !kept.contains(id)).collect();
                    self.release(tr, &released);
                }
            }
            None => {
                for (sk, new_key) in self.current.secondary_keys().iter().zip(&sk_keys) {
                    self.put_index_entry(tr, sk, new_key)?;
                }
            }
        }

        tr.create_or_update(&key, &value);
        if structural {
            self.note_modification(tr);
        }

        let created = old.is_none();
        sink::record(MetricsEvent::RowWrite {
            relation: &self.name,
            created,
        });

        Ok(created)
    }

    /// Remove the row with the given key. Returns `false` when absent.
    pub fn remove_by_id(
        &self,
        tr: &mut dyn KeyValueTransaction,
        key: &[Value],
    ) -> Result<bool, InternalError> {
        self.remove_one(tr, key, false)
    }

    /// `remove_by_id` without freeing the row's nested collections.
    pub fn shallow_remove_by_id(
        &self,
        tr: &mut dyn KeyValueTransaction,
        key: &[Value],
    ) -> Result<bool, InternalError> {
        self.remove_one(tr, key, true)
    }

    /// Remove the row with the given key. Fails with key-not-found otherwise.
    pub fn remove_by_id_or_fail(
        &self,
        tr: &mut dyn KeyValueTransaction,
        key: &[Value],
    ) -> Result<(), InternalError> {
        if self.remove_by_id(tr, key)? {
            Ok(())
        } else {
            Err(InternalError::key_not_found(&self.name, format_key(key)))
        }
    }

    fn remove_one(
        &self,
        tr: &mut dyn KeyValueTransaction,
        key: &[Value],
        shallow: bool,
    ) -> Result<bool, InternalError> {
        let key = self.full_key(key)?;

        tr.set_prefix(&prefix::primary(self.id));
        if !tr.find_exact(&key) {
            return Ok(false);
        }
        let value = tr.value().map(<[u8]>::to_vec).unwrap_or_default();
        tr.erase_current();

        self.remove_row_extras(tr, &key, &value, shallow)?;
        self.note_modification(tr);
        sink::record(MetricsEvent::RowDelete {
            relation: &self.name,
            rows: 1,
        });

        Ok(true)
    }

    /// Remove every row whose key starts with `key_prefix`. Returns the
    /// number of rows removed.
    pub fn remove_range_by_id(
        &self,
        tr: &mut dyn KeyValueTransaction,
        key_prefix: &[Value],
    ) -> Result<u64, InternalError> {
        let scan = self.id_scan(key_prefix, .., ScanOrder::Ascending)?;

        self.remove_window(tr, scan, u64::MAX, false)
    }

    /// `remove_range_by_id` without freeing nested collections.
    pub fn shallow_remove_range_by_id(
        &self,
        tr: &mut dyn KeyValueTransaction,
        key_prefix: &[Value],
    ) -> Result<u64, InternalError> {
        let scan = self.id_scan(key_prefix, .., ScanOrder::Ascending)?;

        self.remove_window(tr, scan, u64::MAX, true)
    }

    /// Remove at most `limit` rows whose key starts with `key_prefix`, lowest
    /// keys first. Returns the number of rows removed.
    pub fn remove_by_id_partial(
        &self,
        tr: &mut dyn KeyValueTransaction,
        key_prefix: &[Value],
        limit: u64,
    ) -> Result<u64, InternalError> {
        let scan = self.id_scan(key_prefix, .., ScanOrder::Ascending)?;

        self.remove_window(tr, scan, limit, false)
    }

    /// Remove the rows whose key starts with `key_prefix` and whose next key
    /// field lies in `range`.
    pub fn remove_by_id_range(
        &self,
        tr: &mut dyn KeyValueTransaction,
        key_prefix: &[Value],
        range: impl RangeBounds<Value>,
    ) -> Result<u64, InternalError> {
        let scan = self.id_scan(key_prefix, range, ScanOrder::Ascending)?;

        self.remove_window(tr, scan, u64::MAX, false)
    }

    // Erase the first `limit` rows of a primary-key window.
    fn remove_window(
        &self,
        tr: &mut dyn KeyValueTransaction,
        mut scan: PrefixScan,
        limit: u64,
        shallow: bool,
    ) -> Result<u64, InternalError> {
        let (first, last) = scan.window(tr);
        if limit == 0 || last < first {
            return Ok(0);
        }
        let last = last.min(first.saturating_add(i64::try_from(limit - 1).unwrap_or(i64::MAX)));
        let scan_prefix = tr.prefix().to_vec();

        // Phase 1: secondary keys and nested collections of every doomed row
        let needs_extras = !self.current.secondary_keys().is_empty()
            || (!shallow && self.free.is_needed(&self.versions));
        if needs_extras {
            let mut rows = Vec::new();
            for index in first..=last {
                if !tr.set_key_index(index) {
                    return Err(InternalError::store_invariant("row window shrank mid-remove"));
                }
                if let (Some(key), Some(value)) = (tr.key(), tr.value()) {
                    rows.push((key.to_vec(), value.to_vec()));
                }
            }
            for (key, value) in &rows {
                self.remove_row_extras(tr, key, value, shallow)?;
            }
            tr.set_prefix(&scan_prefix);
        }

        // Phase 2: the primary rows themselves
        let removed = tr.erase_range(first, last);
        if removed > 0 {
            self.note_modification(tr);
            sink::record(MetricsEvent::RowDelete {
                relation: &self.name,
                rows: removed,
            });
        }

        Ok(removed)
    }

    // Secondary keys and nested collections of a row whose primary entry is
    // gone or about to go.
    fn remove_row_extras(
        &self,
        tr: &mut dyn KeyValueTransaction,
        key: &[u8],
        value: &[u8],
        shallow: bool,
    ) -> Result<(), InternalError> {
        let ctx = self.index_ctx();
        for sk in self.current.secondary_keys() {
            let sk_key = ctx.spliced_key::<R>(sk, key, value)?;
            self.erase_index_entry(tr, sk, &sk_key)?;
        }

        if !shallow {
            let owned = self.free.collections(&self.versions, value)?;
            self.release(tr, &owned);
        }

        Ok(())
    }

    fn put_index_entry(
        &self,
        tr: &mut dyn KeyValueTransaction,
        sk: &SecondaryKeyDef,
        sk_key: &[u8],
    ) -> Result<(), InternalError> {
        if tr.create_or_update(sk_key, &[]) {
            return Ok(());
        }

        Err(IndexError::DuplicateKey {
            relation: self.name.clone(),
            index: sk.to_string(),
        }
        .into())
    }

    fn erase_index_entry(
        &self,
        tr: &mut dyn KeyValueTransaction,
        sk: &SecondaryKeyDef,
        sk_key: &[u8],
    ) -> Result<(), InternalError> {
        tr.set_prefix(&prefix::secondary(self.id, sk.id));
        if tr.find_exact(sk_key) && tr.erase_current() {
            return Ok(());
        }

        Err(IndexError::MissingEntry {
            relation: self.name.clone(),
            index: sk.to_string(),
        }
        .into())
    }

    fn release(&self, tr: &mut dyn KeyValueTransaction, collections: &[u64]) {
        if collections.is_empty() {
            return;
        }

        let freed = free::free_collections(tr, collections);
        debug!(relation = %self.name, ?collections, freed, "nested collections freed");
        sink::record(MetricsEvent::CascadeFree {
            relation: &self.name,
            collections: collections.len() as u64,
        });
    }

    // ------------------------------------------------------------------
    // Point reads
    // ------------------------------------------------------------------

    pub fn find_by_id(
        &self,
        tr: &mut dyn KeyValueTransaction,
        key: &[Value],
    ) -> Result<Option<R>, InternalError> {
        let key = self.full_key(key)?;

        tr.set_prefix(&prefix::primary(self.id));
        if !tr.find_exact(&key) {
            return Ok(None);
        }
        let value = tr.value().map(<[u8]>::to_vec).unwrap_or_default();

        self.load_row::<R>(&key, &value).map(Some)
    }

    pub fn find_by_id_or_fail(
        &self,
        tr: &mut dyn KeyValueTransaction,
        key: &[Value],
    ) -> Result<R, InternalError> {
        self.find_by_id(tr, key)?
            .ok_or_else(|| InternalError::key_not_found(&self.name, format_key(key)))
    }

    pub fn contains(
        &self,
        tr: &mut dyn KeyValueTransaction,
        key: &[Value],
    ) -> Result<bool, InternalError> {
        let key = self.full_key(key)?;
        tr.set_prefix(&prefix::primary(self.id));

        Ok(tr.find_exact(&key))
    }

    /// Rows visible through this handle's apart values.
    pub fn count(&self, tr: &mut dyn KeyValueTransaction) -> Result<u64, InternalError> {
        let scan_prefix = self.key_prefix(&[])?;

        Ok(kv::count_prefix(tr, &scan_prefix))
    }

    /// Rows whose key starts with `key_prefix` and whose next key field lies
    /// in `range`. Counted from key ordinals without reading any row.
    pub fn count_by_id(
        &self,
        tr: &mut dyn KeyValueTransaction,
        key_prefix: &[Value],
        range: impl RangeBounds<Value>,
    ) -> Result<u64, InternalError> {
        let mut scan = self.id_scan(key_prefix, range, ScanOrder::Ascending)?;

        Ok(window_len(scan.window(tr)))
    }

    pub fn any_by_id(
        &self,
        tr: &mut dyn KeyValueTransaction,
        key_prefix: &[Value],
        range: impl RangeBounds<Value>,
    ) -> Result<bool, InternalError> {
        Ok(self.count_by_id(tr, key_prefix, range)? > 0)
    }

    // ------------------------------------------------------------------
    // Primary-key scans
    // ------------------------------------------------------------------

    pub fn list(&self) -> Result<RowIter<'_, R>, InternalError> {
        self.list_by_id(&[], .., ScanOrder::Ascending)
    }

    /// Rows whose key starts with `key_prefix` and whose next key field lies
    /// in `range`.
    pub fn list_by_id(
        &self,
        key_prefix: &[Value],
        range: impl RangeBounds<Value>,
        order: ScanOrder,
    ) -> Result<RowIter<'_, R>, InternalError> {
        self.list_by_id_as::<R>(key_prefix, range, order)
    }

    /// Every row read into another record shape.
    pub fn list_as<T: Record>(&self) -> Result<RowIter<'_, R, T>, InternalError> {
        self.list_by_id_as::<T>(&[], .., ScanOrder::Ascending)
    }

    pub fn list_by_id_as<T: Record>(
        &self,
        key_prefix: &[Value],
        range: impl RangeBounds<Value>,
        order: ScanOrder,
    ) -> Result<RowIter<'_, R, T>, InternalError> {
        let scan = self.id_scan(key_prefix, range, order)?;

        Ok(RowIter::new(self, scan))
    }

    // ------------------------------------------------------------------
    // Secondary-key scans
    // ------------------------------------------------------------------

    /// Rows whose `index` fields start with `values` and whose next index
    /// field lies in `range`, in index order.
    pub fn list_by(
        &self,
        index: &str,
        values: &[Value],
        range: impl RangeBounds<Value>,
        order: ScanOrder,
    ) -> Result<IndexIter<'_, R>, InternalError> {
        let sk = self.secondary_key(index)?;
        let (scan, params_end, params) = self.index_scan(sk, values, range, order)?;

        let base = prefix::secondary(self.id, sk.id).len();
        let merger = self.splices.sk_to_pk(&self.current, sk)?;

        Ok(IndexIter::new(self, scan, merger, base, params_end, params))
    }

    /// The single row matching `values`, failing when several match.
    pub fn find_by(
        &self,
        tr: &mut dyn KeyValueTransaction,
        index: &str,
        values: &[Value],
    ) -> Result<Option<R>, InternalError> {
        let mut rows = self.list_by(index, values, .., ScanOrder::Ascending)?;
        let Some(found) = rows.next(tr)? else {
            return Ok(None);
        };
        if rows.next(tr)?.is_some() {
            return Err(RelationError::Ambiguous {
                relation: self.name.clone(),
                index: index.to_string(),
            }
            .into());
        }

        Ok(Some(found))
    }

    pub fn find_by_or_fail(
        &self,
        tr: &mut dyn KeyValueTransaction,
        index: &str,
        values: &[Value],
    ) -> Result<R, InternalError> {
        self.find_by(tr, index, values)?
            .ok_or_else(|| InternalError::key_not_found(&self.name, format_key(values)))
    }

    pub fn count_by(
        &self,
        tr: &mut dyn KeyValueTransaction,
        index: &str,
        values: &[Value],
    ) -> Result<u64, InternalError> {
        let sk = self.secondary_key(index)?;
        let (scan_prefix, _) = self.index_prefix(sk, values)?;

        Ok(kv::count_prefix(tr, &scan_prefix))
    }

    pub fn any_by(
        &self,
        tr: &mut dyn KeyValueTransaction,
        index: &str,
        values: &[Value],
    ) -> Result<bool, InternalError> {
        Ok(self.count_by(tr, index, values)? > 0)
    }

    /// Index entries starting with `values` whose next index field lies in
    /// `range`.
    pub fn count_by_range(
        &self,
        tr: &mut dyn KeyValueTransaction,
        index: &str,
        values: &[Value],
        range: impl RangeBounds<Value>,
    ) -> Result<u64, InternalError> {
        let sk = self.secondary_key(index)?;
        let (mut scan, _, _) = self.index_scan(sk, values, range, ScanOrder::Ascending)?;

        Ok(window_len(scan.window(tr)))
    }

    pub fn any_by_range(
        &self,
        tr: &mut dyn KeyValueTransaction,
        index: &str,
        values: &[Value],
        range: impl RangeBounds<Value>,
    ) -> Result<bool, InternalError> {
        Ok(self.count_by_range(tr, index, values, range)? > 0)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn index_ctx(&self) -> IndexContext<'_> {
        IndexContext {
            relation_id: self.id,
            relation: &self.name,
            versions: &self.versions,
            splices: &self.splices,
        }
    }

    const fn apart_count(&self) -> usize {
        self.apart_count
    }

    fn secondary_key(&self, index: &str) -> Result<&SecondaryKeyDef, InternalError> {
        self.current.secondary_key_by_name(index).ok_or_else(|| {
            RelationError::UnknownIndex {
                relation: self.name.clone(),
                index: index.to_string(),
            }
            .into()
        })
    }

    // Apart values in key order, followed by `values`.
    fn with_apart(&self, values: &[Value], limit: usize) -> Result<Vec<Value>, InternalError> {
        let apart = self.apart_count();
        if apart + values.len() > limit {
            return Err(RelationError::KeyArity {
                relation: self.name.clone(),
                expected: limit.saturating_sub(apart),
                found: values.len(),
            }
            .into());
        }

        let mut all = self.apart_values()?;
        all.extend_from_slice(values);

        Ok(all)
    }

    // Apart values in key order; every apart field must be set.
    fn apart_values(&self) -> Result<Vec<Value>, InternalError> {
        self.current
            .primary_key_fields()
            .take(self.apart_count())
            .map(|def| {
                self.apart
                    .iter()
                    .find(|(name, _)| *name == def.name)
                    .map(|(_, value)| value.clone())
                    .ok_or_else(|| {
                        RelationError::ApartFieldNotSet {
                            relation: self.name.clone(),
                            field: def.name.clone(),
                        }
                        .into()
                    })
            })
            .collect()
    }

    fn key_prefix(&self, values: &[Value]) -> Result<Vec<u8>, InternalError> {
        let all = self.with_apart(values, self.current.primary_key_len())?;

        row::key_prefix_bytes(
            prefix::primary(self.id),
            self.current.primary_key_fields(),
            &all,
        )
    }

    fn full_key(&self, values: &[Value]) -> Result<Vec<u8>, InternalError> {
        let expected = self.current.primary_key_len() - self.apart_count();
        if values.len() != expected {
            return Err(RelationError::KeyArity {
                relation: self.name.clone(),
                expected,
                found: values.len(),
            }
            .into());
        }

        self.key_prefix(values)
    }

    // Primary-key scan over `key_prefix` bounded on the next key field.
    fn id_scan(
        &self,
        key_prefix: &[Value],
        range: impl RangeBounds<Value>,
        order: ScanOrder,
    ) -> Result<PrefixScan, InternalError> {
        let scan_prefix = self.key_prefix(key_prefix)?;
        let next = self
            .current
            .primary_key_field(self.apart_count() + key_prefix.len());

        bounded_scan(scan_prefix, next.map(|def| &def.handler), range, order)
    }

    // Index scan plus the byte length and field count of its fixed prefix.
    fn index_scan(
        &self,
        sk: &SecondaryKeyDef,
        values: &[Value],
        range: impl RangeBounds<Value>,
        order: ScanOrder,
    ) -> Result<(PrefixScan, usize, usize), InternalError> {
        let (scan_prefix, params) = self.index_prefix(sk, values)?;
        let params_end = scan_prefix.len();
        let next = sk
            .fields
            .get(params)
            .and_then(|field_ref| self.current.referenced_field(field_ref));
        let scan = bounded_scan(scan_prefix, next.map(|def| &def.handler), range, order)?;

        Ok((scan, params_end, params))
    }

    // Scan prefix for an index plus how many index fields it fixes.
    fn index_prefix(
        &self,
        sk: &SecondaryKeyDef,
        values: &[Value],
    ) -> Result<(Vec<u8>, usize), InternalError> {
        let all = self.with_apart(values, sk.fields.len())?;
        let defs = sk
            .fields
            .iter()
            .filter_map(|field_ref| self.current.referenced_field(field_ref));
        let bytes = row::key_prefix_bytes(prefix::secondary(self.id, sk.id), defs, &all)?;

        Ok((bytes, all.len()))
    }

    fn describe_key(&self, key: &[u8]) -> String {
        let pk_len = prefix::primary(self.id).len();
        key.get(pk_len..)
            .and_then(|fields| row::primary_key_values(&self.current, fields).ok())
            .map_or_else(|| format!("{key:?}"), |values| format_key(&values))
    }

    pub(crate) fn load_row<T: Record>(&self, key: &[u8], value: &[u8]) -> Result<T, InternalError> {
        let pk_len = prefix::primary(self.id).len();
        let pk_fields = key
            .get(pk_len..)
            .ok_or_else(|| InternalError::store_corruption("primary key shorter than its prefix"))?;

        let mut record = T::default();
        row::load_primary_key(&self.current, pk_fields, &mut record)?;

        let (version, mut values) = row::split_value(value)?;
        let stored = version
            .checked_sub(1)
            .and_then(|index| self.versions.get(index as usize))
            .ok_or_else(|| {
                InternalError::store_corruption(format!(
                    "row of relation '{}' references unknown version {version}",
                    self.name
                ))
            })?;
        self.loaders
            .get_or_build::<T>(stored)
            .load(&mut values, &mut record)?;

        Ok(record)
    }
}

const fn window_len((first, last): (i64, i64)) -> u64 {
    if last < first {
        0
    } else {
        (last - first + 1).cast_unsigned()
    }
}

// Resolve a prefix plus a range over the next key field into full-key bounds.
fn bounded_scan(
    scan_prefix: Vec<u8>,
    next: Option<&Arc<dyn FieldHandler>>,
    range: impl RangeBounds<Value>,
    order: ScanOrder,
) -> Result<PrefixScan, InternalError> {
    let encode = |value: &Value| -> Result<Vec<u8>, InternalError> {
        let handler = next.ok_or_else(|| {
            InternalError::new(
                ErrorClass::Unsupported,
                ErrorOrigin::Relation,
                "range bound given but the key has no further field",
            )
        })?;
        let mut w = ByteWriter::with_prefix(&scan_prefix);
        handler.save(value, &mut w, &mut WriteCtx::default())?;

        Ok(w.into_bytes())
    };

    let start = match range.start_bound() {
        Bound::Unbounded => Bound::Unbounded,
        Bound::Included(value) => Bound::Included(encode(value)?),
        // skip every key that starts with the excluded value
        Bound::Excluded(value) => match prefix::successor(&encode(value)?) {
            Some(after) => Bound::Included(after),
            None => return Ok(PrefixScan::empty(scan_prefix.clone(), order)),
        },
    };
    let end = match range.end_bound() {
        Bound::Unbounded => Bound::Unbounded,
        Bound::Excluded(value) => Bound::Excluded(encode(value)?),
        Bound::Included(value) => match prefix::successor(&encode(value)?) {
            Some(after) => Bound::Excluded(after),
            None => Bound::Unbounded,
        },
    };

    Ok(PrefixScan::new(scan_prefix, start, end, order))
}
