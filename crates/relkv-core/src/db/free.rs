//! Cascade free of nested collections owned by rows.
//!
//! A version only needs a free routine when one of its value fields may own
//! a nested collection; the routine stops after the last such field.

use crate::{
    codec::ByteReader,
    db::{
        field::{FieldHandler, FreeCtx},
        prefix,
        row,
        schema::RelationVersion,
    },
    error::InternalError,
    kv::{self, KeyValueTransaction},
};
use std::sync::{Arc, OnceLock};

///
/// FreeRoutine
///

#[derive(Debug)]
pub(crate) struct FreeRoutine {
    steps: Vec<(Arc<dyn FieldHandler>, bool)>,
}

impl FreeRoutine {
    /// `None` when no value field of `version` can own a nested collection.
    pub(crate) fn for_version(version: &RelationVersion) -> Option<Self> {
        let fields: Vec<_> = version.value_fields().collect();
        let last = fields.iter().rposition(|def| def.handler.may_free_content())?;

        let steps = fields[..=last]
            .iter()
            .map(|def| (Arc::clone(&def.handler), def.handler.may_free_content()))
            .collect();

        Some(Self { steps })
    }

    /// Nested-collection ids referenced by one value, without duplicates.
    pub(crate) fn collect(&self, r: &mut ByteReader<'_>) -> Result<Vec<u64>, InternalError> {
        let mut ctx = FreeCtx::default();
        for (handler, frees) in &self.steps {
            if *frees {
                handler.free_content(r, &mut ctx)?;
            } else {
                handler.skip(r, &mut ctx.read)?;
            }
        }

        let mut ids = ctx.into_collections();
        ids.sort_unstable();
        ids.dedup();

        Ok(ids)
    }
}

///
/// FreePlan
///
/// Lazily built free routines, one slot per version, plus the cached answer
/// to whether any version needs freeing at all.
///

#[derive(Debug)]
pub(crate) struct FreePlan {
    routines: Vec<OnceLock<Option<FreeRoutine>>>,
    needed: OnceLock<bool>,
}

impl FreePlan {
    pub(crate) fn new(versions: usize) -> Self {
        Self {
            routines: (0..versions).map(|_| OnceLock::new()).collect(),
            needed: OnceLock::new(),
        }
    }

    pub(crate) fn is_needed(&self, versions: &[Arc<RelationVersion>]) -> bool {
        *self.needed.get_or_init(|| {
            versions
                .iter()
                .any(|version| version.value_fields().any(|def| def.handler.may_free_content()))
        })
    }

    fn routine(
        &self,
        versions: &[Arc<RelationVersion>],
        version: u32,
    ) -> Result<Option<&FreeRoutine>, InternalError> {
        let index = version
            .checked_sub(1)
            .map(|v| v as usize)
            .filter(|index| *index < versions.len() && *index < self.routines.len())
            .ok_or_else(|| {
                InternalError::store_corruption(format!("row references unknown version {version}"))
            })?;

        Ok(self.routines[index]
            .get_or_init(|| FreeRoutine::for_version(&versions[index]))
            .as_ref())
    }

    /// Nested collections owned by a stored value.
    pub(crate) fn collections(
        &self,
        versions: &[Arc<RelationVersion>],
        value: &[u8],
    ) -> Result<Vec<u64>, InternalError> {
        if !self.is_needed(versions) {
            return Ok(Vec::new());
        }

        let (version, mut r) = row::split_value(value)?;
        match self.routine(versions, version)? {
            Some(routine) => routine.collect(&mut r),
            None => Ok(Vec::new()),
        }
    }
}

/// Erase the given nested collections. Returns how many held any entries.
pub(crate) fn free_collections(tr: &mut dyn KeyValueTransaction, ids: &[u64]) -> u64 {
    let mut freed = 0;
    for id in ids {
        let space = prefix::collection(*id);
        if kv::erase_prefix(tr, &space) > 0 {
            tr.note_modification(&space);
            freed += 1;
        }
    }

    freed
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::{field::FieldKind, row::RowSource},
        kv::MemoryStore,
        model::RelationModel,
        traits::CollectionId,
    };

    crate::record! {
        struct Owner in "Owner" {
            id: u64,
            first: CollectionId,
            label: String,
            second: Option<CollectionId>,
            trailing: Vec<String>,
        }
        primary_key(id);
    }

    fn versions(model: &RelationModel) -> Vec<Arc<RelationVersion>> {
        vec![Arc::new(
            RelationVersion::from_model(model, 1, None).expect("valid model"),
        )]
    }

    #[test]
    fn routine_stops_after_last_freeing_field() {
        let versions = versions(&<Owner as crate::traits::Record>::model());
        let routine = FreeRoutine::for_version(&versions[0]).expect("routine");

        // first, label, second; trailing is never visited
        assert_eq!(routine.steps.len(), 3);
    }

    #[test]
    fn collections_are_reported_once() {
        let versions = versions(&<Owner as crate::traits::Record>::model());
        let plan = FreePlan::new(versions.len());
        let row = Owner {
            id: 1,
            first: CollectionId(7),
            label: "x".into(),
            second: Some(CollectionId(7)),
            trailing: vec!["t".into()],
        };
        let value = row::value_bytes(&versions[0], &RowSource::new(&[], &row)).expect("value");

        assert!(plan.is_needed(&versions));
        assert_eq!(plan.collections(&versions, &value).expect("collect"), vec![7]);
    }

    #[test]
    fn relations_without_collections_skip_freeing() {
        let model = RelationModel::new("Plain")
            .field("id", FieldKind::Uint)
            .field("name", FieldKind::Text)
            .primary_key(&["id"]);
        let versions = versions(&model);
        let plan = FreePlan::new(versions.len());

        assert!(!plan.is_needed(&versions));
        assert!(FreeRoutine::for_version(&versions[0]).is_none());
        assert!(plan.collections(&versions, &[1, 0]).expect("skip").is_empty());
    }

    #[test]
    fn freeing_erases_collection_ranges() {
        let mut store = MemoryStore::new();
        for id in [3u64, 4] {
            let mut key = prefix::collection(id);
            key.push(1);
            store.create_or_update(&key, b"v");
        }

        assert_eq!(free_collections(&mut store, &[3, 9]), 1);
        assert_eq!(store.len(), 1);
    }
}
