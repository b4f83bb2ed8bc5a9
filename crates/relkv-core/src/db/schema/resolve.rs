//! Version resolution on relation open.
//!
//! Loads the persisted descriptor history, compares the declared model with
//! the newest version, and either reuses it or persists a new one.

use crate::{
    codec::ByteReader,
    db::{index, prefix, schema::{RelationVersion, SchemaError}},
    error::InternalError,
    kv::KeyValueTransaction,
    model::RelationModel,
    obs::sink::{self, MetricsEvent},
};
use relkv_config::DbConfig;
use std::sync::Arc;
use tracing::{debug, info, warn};

///
/// ResolveOutcome
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum ResolveOutcome {
    /// Declared model matches the newest persisted version.
    Reused,
    /// First version of a relation without history.
    Created,
    /// New version persisted on top of compatible history.
    Migrated,
    /// Primary key was incompatible; existing rows were dropped first.
    Healed,
}

///
/// ResolvedSchema
///
/// Every persisted version (index `i` holds version `i + 1`) plus what the
/// index synchronizer needs to know about the transition.
///

#[derive(Debug)]
pub(crate) struct ResolvedSchema {
    pub versions: Vec<Arc<RelationVersion>>,
    pub previous: Option<Arc<RelationVersion>>,
    pub outcome: ResolveOutcome,
}

impl ResolvedSchema {
    pub(crate) fn current(&self) -> &Arc<RelationVersion> {
        // resolve_schema never returns an empty history
        &self.versions[self.versions.len() - 1]
    }
}

/// Resolve the current version of `model`, persisting a new descriptor when
/// the declaration changed.
pub(crate) fn resolve_schema(
    tr: &mut dyn KeyValueTransaction,
    relation_id: u64,
    model: &RelationModel,
    config: &DbConfig,
) -> Result<ResolvedSchema, InternalError> {
    // Phase 1: persisted history.
    let mut versions = load_versions(tr, relation_id, &model.name)?;
    let last = versions.last().cloned();

    // Phase 2: declared layout, keeping index ids stable against the newest version.
    let next_version = last.as_ref().map_or(1, |version| version.version() + 1);
    let client = RelationVersion::from_model(model, next_version, last.as_deref())?;

    if let Some(last) = &last
        && last.same_layout(&client)
    {
        debug!(relation = %model.name, version = last.version(), "schema version reused");
        sink::record(MetricsEvent::SchemaResolved {
            relation: &model.name,
            version: last.version(),
            reused: true,
        });

        return Ok(ResolvedSchema {
            versions,
            previous: None,
            outcome: ResolveOutcome::Reused,
        });
    }

    // Phase 3: primary-key compatibility, checked before anything is written.
    let mut outcome = if last.is_some() {
        ResolveOutcome::Migrated
    } else {
        ResolveOutcome::Created
    };
    let mut previous = last.clone();

    if let Some(last) = &last
        && let Err(err) = client.check_primary_key_compatible(last, &model.name)
    {
        if !config.self_healing {
            return Err(err.into());
        }

        let rows = index::clear_relation_data(tr, relation_id);
        warn!(
            relation = %model.name,
            rows,
            error = %err,
            "incompatible primary key; relation data cleared"
        );
        sink::record(MetricsEvent::SelfHealReset {
            relation: &model.name,
            rows,
        });

        outcome = ResolveOutcome::Healed;
        previous = None;
    }

    // Phase 4: persist.
    tr.set_prefix(&[]);
    tr.create_or_update(&prefix::version_key(relation_id, next_version), &client.save());

    info!(relation = %model.name, version = next_version, ?outcome, "schema version persisted");
    sink::record(MetricsEvent::SchemaResolved {
        relation: &model.name,
        version: next_version,
        reused: false,
    });

    versions.push(Arc::new(client));

    Ok(ResolvedSchema {
        versions,
        previous,
        outcome,
    })
}

/// Load every persisted descriptor of a relation, requiring versions to be
/// dense from 1.
pub(crate) fn load_versions(
    tr: &mut dyn KeyValueTransaction,
    relation_id: u64,
    relation: &str,
) -> Result<Vec<Arc<RelationVersion>>, InternalError> {
    let prefix = prefix::versions(relation_id);
    tr.set_prefix(&prefix);

    let mut raw = Vec::new();
    let mut more = tr.find_first();
    while more {
        let (Some(key), Some(value)) = (tr.key(), tr.value()) else {
            return Err(InternalError::store_invariant(
                "positioned cursor returned no key",
            ));
        };
        raw.push((key.to_vec(), value.to_vec()));
        more = tr.find_next();
    }

    let mut versions = Vec::with_capacity(raw.len());
    for (position, (key, value)) in raw.iter().enumerate() {
        let suffix = key.get(prefix.len()..).unwrap_or_default();
        let mut r = ByteReader::new(suffix);
        let found = r.read_vuint_u32()?;
        if !r.is_empty() {
            return Err(InternalError::store_corruption(format!(
                "relation '{relation}' version key has trailing bytes"
            )));
        }

        let expected = u32::try_from(position + 1).unwrap_or(u32::MAX);
        if found != expected {
            return Err(SchemaError::VersionGap {
                relation: relation.to_string(),
                expected,
                found,
            }
            .into());
        }

        versions.push(Arc::new(RelationVersion::load(relation, found, value)?));
    }

    Ok(versions)
}
