//! Module: db::index
//! Responsibility: keeping secondary indexes in step with primary rows
//! across schema versions.
//! Does not own: schema resolution or per-row writes.
//! Boundary: runs once per relation open, after the current version is known.

pub(crate) mod splice;


use crate::{
    codec::ByteWriter,
    db::{
        cursor::{PrefixScan, ScanOrder},
        prefix,
        row::{self, FieldSource, RowSource, ValueLoader},
        schema::{RelationVersion, ResolveOutcome, ResolvedSchema, SecondaryKeyDef},
    },
    error::{ErrorClass, ErrorDetail, ErrorOrigin, InternalError},
    kv::{self, KeyValueTransaction},
    obs::sink::{self, MetricsEvent},
    traits::Record,
    value::Value,
};
use parking_lot::RwLock;
use relkv_config::{DbConfig, RebuildStrategy};
use splice::{PkToSkMerger, SkToPkMerger};
use std::{collections::HashMap, sync::Arc};
use thiserror::Error as ThisError;
use tracing::{debug, info};

///
/// IndexError
///

#[derive(Debug, ThisError)]
pub enum IndexError {
    #[error("index {index} of relation '{relation}' already holds an entry for another row")]
    DuplicateKey { relation: String, index: String },

    #[error("index {index} of relation '{relation}' holds {found} entries for {expected} rows")]
    CountMismatch {
        relation: String,
        index: String,
        expected: u64,
        found: u64,
    },

    #[error("index {index} of relation '{relation}' has no entry for an existing row")]
    MissingEntry { relation: String, index: String },
}

impl From<IndexError> for InternalError {
    fn from(err: IndexError) -> Self {
        Self {
            class: ErrorClass::IndexConsistency,
            origin: ErrorOrigin::Index,
            message: err.to_string(),
            detail: Some(ErrorDetail::Index(err)),
        }
    }
}

///
/// IndexContext
///
/// What index maintenance needs to know about one relation.
///

pub(crate) struct IndexContext<'a> {
    pub relation_id: u64,
    pub relation: &'a str,
    pub versions: &'a [Arc<RelationVersion>],
    pub splices: &'a SpliceCache,
}

impl IndexContext<'_> {
    fn current(&self) -> Result<&Arc<RelationVersion>, InternalError> {
        self.versions
            .last()
            .ok_or_else(|| InternalError::store_invariant("relation has no schema version"))
    }

    fn stored(&self, version: u32) -> Result<&Arc<RelationVersion>, InternalError> {
        version
            .checked_sub(1)
            .and_then(|index| self.versions.get(index as usize))
            .ok_or_else(|| {
                InternalError::store_corruption(format!(
                    "row of relation '{}' references unknown version {version}",
                    self.relation
                ))
            })
    }

    /// Secondary-key bytes of a stored row, spliced from its raw bytes.
    pub(crate) fn spliced_key<R: Record>(
        &self,
        sk: &SecondaryKeyDef,
        key: &[u8],
        value: &[u8],
    ) -> Result<Vec<u8>, InternalError> {
        let (version, values) = row::split_value(value)?;
        let stored = self.stored(version)?;
        let merger = self.splices.pk_to_sk::<R>(stored, self.current()?, sk)?;

        let pk_len = prefix::primary(self.relation_id).len();
        let pk_fields = key
            .get(pk_len..)
            .ok_or_else(|| InternalError::store_corruption("primary key shorter than its prefix"))?;

        let mut out = ByteWriter::with_prefix(&prefix::secondary(self.relation_id, sk.id));
        merger.merge(pk_fields, values.rest(), &mut out)?;

        Ok(out.into_bytes())
    }

    /// Secondary-key bytes of a stored row, built from the decoded record.
    pub(crate) fn materialized_key<R: Record>(
        &self,
        sk: &SecondaryKeyDef,
        key: &[u8],
        value: &[u8],
        loaders: &mut HashMap<u32, ValueLoader>,
    ) -> Result<Vec<u8>, InternalError> {
        let current = self.current()?;
        let pk_len = prefix::primary(self.relation_id).len();
        let pk_fields = key
            .get(pk_len..)
            .ok_or_else(|| InternalError::store_corruption("primary key shorter than its prefix"))?;

        let mut record = R::default();
        row::load_primary_key(current, pk_fields, &mut record)?;
        let pk_values: Vec<(String, Value)> = current
            .primary_key_fields()
            .map(|def| def.name.clone())
            .zip(row::primary_key_values(current, pk_fields)?)
            .collect();

        let (version, mut values) = row::split_value(value)?;
        if !loaders.contains_key(&version) {
            let stored = self.stored(version)?;
            loaders.insert(version, ValueLoader::new(stored, &R::model()));
        }
        if let Some(loader) = loaders.get(&version) {
            loader.load(&mut values, &mut record)?;
        }

        row::secondary_key_bytes(
            self.relation_id,
            current,
            sk,
            &RowSource::new(&pk_values, &record),
        )
    }
}

// ----------------------------------------------------------------------
// Splice cache
// ----------------------------------------------------------------------

///
/// SpliceCache
///
/// Mergers per (stored version, index id) and per index id. Built lazily;
/// racing builders produce identical mergers and the first insert wins.
///

#[derive(Debug, Default)]
pub(crate) struct SpliceCache {
    pk_to_sk: RwLock<HashMap<(u32, u32), Arc<PkToSkMerger>>>,
    sk_to_pk: RwLock<HashMap<u32, Arc<SkToPkMerger>>>,
}

impl SpliceCache {
    pub(crate) fn pk_to_sk<R: Record>(
        &self,
        stored: &RelationVersion,
        current: &RelationVersion,
        sk: &SecondaryKeyDef,
    ) -> Result<Arc<PkToSkMerger>, InternalError> {
        let key = (stored.version(), sk.id);
        if let Some(merger) = self.pk_to_sk.read().get(&key) {
            return Ok(Arc::clone(merger));
        }

        let defaults = R::default();
        let built = Arc::new(PkToSkMerger::new(
            stored,
            current,
            sk,
            &RowSource::new(&[], &defaults),
        )?);

        Ok(Arc::clone(self.pk_to_sk.write().entry(key).or_insert(built)))
    }

    pub(crate) fn sk_to_pk(
        &self,
        current: &RelationVersion,
        sk: &SecondaryKeyDef,
    ) -> Result<Arc<SkToPkMerger>, InternalError> {
        if let Some(merger) = self.sk_to_pk.read().get(&sk.id) {
            return Ok(Arc::clone(merger));
        }

        let built = Arc::new(SkToPkMerger::new(current, sk)?);

        Ok(Arc::clone(self.sk_to_pk.write().entry(sk.id).or_insert(built)))
    }
}

// ----------------------------------------------------------------------
// Synchronization
// ----------------------------------------------------------------------

/// Bring every secondary index of the current version in line with the
/// primary rows: drop indexes the version no longer declares, then rebuild
/// new ones and those whose entry count disagrees with the row count.
pub(crate) fn sync_secondary_indexes<R: Record>(
    tr: &mut dyn KeyValueTransaction,
    ctx: &IndexContext<'_>,
    resolved: &ResolvedSchema,
    config: &DbConfig,
) -> Result<(), InternalError> {
    let current = ctx.current()?;
    let rows = kv::count_prefix(tr, &prefix::primary(ctx.relation_id));

    // Phase 1: drop indexes absent from the current version.
    if let Some(previous) = &resolved.previous {
        for old in previous.secondary_keys() {
            if current.secondary_key(old.id).is_some() {
                continue;
            }
            let erased = kv::erase_prefix(tr, &prefix::secondary(ctx.relation_id, old.id));
            info!(relation = ctx.relation, index = %old, erased, "secondary index dropped");
            sink::record(MetricsEvent::IndexDropped {
                relation: ctx.relation,
                index: old.id,
            });
        }
    }

    // Phase 2: mark stale indexes.
    let check_counts = resolved.outcome != ResolveOutcome::Reused || config.verify_index_counts;
    let mut stale = Vec::new();
    for sk in current.secondary_keys() {
        let is_new = resolved
            .previous
            .as_ref()
            .is_some_and(|previous| previous.secondary_key(sk.id).is_none());
        if is_new {
            stale.push(sk);
            continue;
        }
        if check_counts {
            let entries = kv::count_prefix(tr, &prefix::secondary(ctx.relation_id, sk.id));
            if entries != rows {
                debug!(relation = ctx.relation, index = %sk, entries, rows, "index count mismatch");
                stale.push(sk);
            }
        }
    }

    if stale.is_empty() {
        return Ok(());
    }

    // Phase 3: erase and rebuild.
    for sk in &stale {
        kv::erase_prefix(tr, &prefix::secondary(ctx.relation_id, sk.id));
    }
    rebuild::<R>(tr, ctx, &stale, config.rebuild_strategy)?;

    // Phase 4: verify.
    for sk in &stale {
        let entries = kv::count_prefix(tr, &prefix::secondary(ctx.relation_id, sk.id));
        if entries != rows {
            return Err(IndexError::CountMismatch {
                relation: ctx.relation.to_string(),
                index: sk.to_string(),
                expected: rows,
                found: entries,
            }
            .into());
        }
        info!(
            relation = ctx.relation,
            index = %sk,
            rows,
            strategy = config.rebuild_strategy.as_str(),
            "secondary index rebuilt"
        );
        sink::record(MetricsEvent::IndexRebuilt {
            relation: ctx.relation,
            index: sk.id,
            rows,
            strategy: config.rebuild_strategy,
        });
    }

    Ok(())
}

// One pass over the primary rows writes every stale index.
fn rebuild<R: Record>(
    tr: &mut dyn KeyValueTransaction,
    ctx: &IndexContext<'_>,
    stale: &[&SecondaryKeyDef],
    strategy: RebuildStrategy,
) -> Result<(), InternalError> {
    let mut scan = PrefixScan::all(prefix::primary(ctx.relation_id), ScanOrder::Ascending);
    let mut loaders = HashMap::new();

    // index writes move the shared cursor; the scan re-seeks by ordinal
    while scan.advance(tr, 0)? {
        let (Some(key), Some(value)) = (tr.key(), tr.value()) else {
            return Err(InternalError::store_invariant("positioned cursor returned no key"));
        };
        let (key, value) = (key.to_vec(), value.to_vec());

        for sk in stale {
            let sk_key = match strategy {
                RebuildStrategy::Splice => ctx.spliced_key::<R>(sk, &key, &value)?,
                RebuildStrategy::Materialize => {
                    ctx.materialized_key::<R>(sk, &key, &value, &mut loaders)?
                }
            };
            if !tr.create_or_update(&sk_key, &[]) {
                return Err(IndexError::DuplicateKey {
                    relation: ctx.relation.to_string(),
                    index: sk.to_string(),
                }
                .into());
            }
        }
    }

    Ok(())
}

/// Erase every row and index entry of a relation. Returns the number of
/// rows removed.
pub(crate) fn clear_relation_data(tr: &mut dyn KeyValueTransaction, relation_id: u64) -> u64 {
    let mut indexes = ByteWriter::with_prefix(prefix::SECONDARY);
    indexes.write_vuint(relation_id);
    kv::erase_prefix(tr, &indexes);

    let erased = kv::erase_prefix(tr, &prefix::primary(relation_id));
    tr.note_modification(&prefix::primary(relation_id));

    erased
}

/// Build secondary-key bytes for a row about to be written.
pub(crate) fn row_keys(
    relation_id: u64,
    current: &RelationVersion,
    source: &dyn FieldSource,
) -> Result<Vec<Vec<u8>>, InternalError> {
    current
        .secondary_keys()
        .iter()
        .map(|sk| row::secondary_key_bytes(relation_id, current, sk, source))
        .collect()
}
