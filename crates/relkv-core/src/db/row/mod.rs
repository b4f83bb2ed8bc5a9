//! Module: db::row
//! Responsibility: per-version savers and loaders for primary keys, values
//! and secondary keys.
//! Does not own: which rows exist or when indexes are rebuilt.
//! Boundary: relation operations and index maintenance encode rows only here.


use crate::{
    codec::{ByteReader, ByteWriter, CodecError},
    db::{
        field::{FieldHandler, ReadCtx, WriteCtx, specialize},
        prefix,
        schema::{FieldDef, RelationVersion, SecondaryKeyDef},
    },
    error::InternalError,
    model::RelationModel,
    traits::Record,
    value::Value,
};
use parking_lot::RwLock;
use std::{any::TypeId, collections::HashMap, sync::Arc};

// ----------------------------------------------------------------------
// Field sources
// ----------------------------------------------------------------------

///
/// FieldSource
///
/// Supplies field values by name to the savers.
///

pub(crate) trait FieldSource {
    fn field_value(&self, name: &str) -> Option<Value>;
}

///
/// RowSource
///
/// A record combined with the apart values of the relation handle.
///

pub(crate) struct RowSource<'a, R> {
    apart: &'a [(String, Value)],
    record: &'a R,
}

impl<'a, R: Record> RowSource<'a, R> {
    pub(crate) const fn new(apart: &'a [(String, Value)], record: &'a R) -> Self {
        Self { apart, record }
    }
}

impl<R: Record> FieldSource for RowSource<'_, R> {
    fn field_value(&self, name: &str) -> Option<Value> {
        self.apart
            .iter()
            .find(|(apart, _)| apart == name)
            .map(|(_, value)| value.clone())
            .or_else(|| self.record.get_value(name))
    }
}

fn save_field(
    def: &FieldDef,
    source: &dyn FieldSource,
    w: &mut ByteWriter,
    ctx: &mut WriteCtx,
) -> Result<(), CodecError> {
    let value = source
        .field_value(&def.name)
        .ok_or_else(|| CodecError::MissingField(def.name.clone()))?;

    def.handler.save(&value, w, ctx)
}

// ----------------------------------------------------------------------
// Savers
// ----------------------------------------------------------------------

/// Full primary-key bytes: partition tag, relation id, key fields.
pub(crate) fn primary_key_bytes(
    relation_id: u64,
    version: &RelationVersion,
    source: &dyn FieldSource,
) -> Result<Vec<u8>, InternalError> {
    let mut w = ByteWriter::with_prefix(&prefix::primary(relation_id));
    let mut ctx = WriteCtx::default();
    for def in version.primary_key_fields() {
        save_field(def, source, &mut w, &mut ctx)?;
    }

    Ok(w.into_bytes())
}

/// Stored value: version tag followed by every value field.
pub(crate) fn value_bytes(
    version: &RelationVersion,
    source: &dyn FieldSource,
) -> Result<Vec<u8>, InternalError> {
    let mut w = ByteWriter::new();
    w.write_vuint(u64::from(version.version()));

    let mut ctx = WriteCtx::default();
    for def in version.value_fields() {
        save_field(def, source, &mut w, &mut ctx)?;
    }

    Ok(w.into_bytes())
}

/// Full secondary-key bytes for one index.
pub(crate) fn secondary_key_bytes(
    relation_id: u64,
    version: &RelationVersion,
    sk: &SecondaryKeyDef,
    source: &dyn FieldSource,
) -> Result<Vec<u8>, InternalError> {
    let mut w = ByteWriter::with_prefix(&prefix::secondary(relation_id, sk.id));
    let mut ctx = WriteCtx::default();
    for field_ref in &sk.fields {
        let def = version
            .referenced_field(field_ref)
            .ok_or_else(|| InternalError::store_invariant(format!("index {sk} lost a field")))?;
        save_field(def, source, &mut w, &mut ctx)?;
    }

    Ok(w.into_bytes())
}

/// Encode leading key fields of `defs` from explicit values onto `base`.
pub(crate) fn key_prefix_bytes<'a>(
    base: Vec<u8>,
    defs: impl Iterator<Item = &'a FieldDef>,
    values: &[Value],
) -> Result<Vec<u8>, InternalError> {
    let mut w = ByteWriter::with_prefix(&base);
    let mut ctx = WriteCtx::default();
    for (def, value) in defs.zip(values) {
        def.handler.save(value, &mut w, &mut ctx)?;
    }

    Ok(w.into_bytes())
}

// ----------------------------------------------------------------------
// Loaders
// ----------------------------------------------------------------------

/// Decode primary-key bytes (after the relation prefix) into `record`.
/// Apart fields are read and dropped.
pub(crate) fn load_primary_key<T: Record>(
    version: &RelationVersion,
    key_fields: &[u8],
    record: &mut T,
) -> Result<(), InternalError> {
    let mut r = ByteReader::new(key_fields);
    let mut ctx = ReadCtx::default();
    for def in version.primary_key_fields() {
        let value = def.handler.load(&mut r, &mut ctx)?;
        record.set_value(&def.name, value)?;
    }

    Ok(())
}

/// Decode primary-key bytes (after the relation prefix) into values.
pub(crate) fn primary_key_values(
    version: &RelationVersion,
    key_fields: &[u8],
) -> Result<Vec<Value>, InternalError> {
    let mut r = ByteReader::new(key_fields);
    let mut ctx = ReadCtx::default();

    version
        .primary_key_fields()
        .map(|def| def.handler.load(&mut r, &mut ctx).map_err(InternalError::from))
        .collect()
}

/// Split a stored value into its version tag and a reader over the fields.
pub(crate) fn split_value(bytes: &[u8]) -> Result<(u32, ByteReader<'_>), InternalError> {
    let mut r = ByteReader::new(bytes);
    let version = r.read_vuint_u32()?;

    Ok((version, r))
}

///
/// LoadStep
///

#[derive(Debug)]
enum LoadStep {
    Assign {
        name: String,
        handler: Arc<dyn FieldHandler>,
    },
    Skip(Arc<dyn FieldHandler>),
}

///
/// ValueLoader
///
/// Reads value bytes of one stored version into one target record shape.
/// Fields the target lacks, or cannot losslessly read, are skipped and keep
/// their default.
///

#[derive(Debug)]
pub(crate) struct ValueLoader {
    steps: Vec<LoadStep>,
}

impl ValueLoader {
    pub(crate) fn new(stored: &RelationVersion, target: &RelationModel) -> Self {
        let steps = stored
            .value_fields()
            .map(|def| {
                let specialized = target
                    .fields
                    .iter()
                    .find(|field| field.name == def.name)
                    .and_then(|field| specialize(&def.handler, &field.kind));

                match specialized {
                    Some(handler) => LoadStep::Assign {
                        name: def.name.clone(),
                        handler,
                    },
                    None => LoadStep::Skip(Arc::clone(&def.handler)),
                }
            })
            .collect();

        Self { steps }
    }

    pub(crate) fn load<T: Record>(
        &self,
        r: &mut ByteReader<'_>,
        record: &mut T,
    ) -> Result<(), InternalError> {
        let mut ctx = ReadCtx::default();
        for step in &self.steps {
            match step {
                LoadStep::Assign { name, handler } => {
                    let value = handler.load(r, &mut ctx)?;
                    record.set_value(name, value)?;
                }
                LoadStep::Skip(handler) => handler.skip(r, &mut ctx)?,
            }
        }

        Ok(())
    }
}

///
/// LoaderCache
///
/// Value loaders keyed by target record type and stored version. Racing
/// builders produce identical loaders; the first insert wins.
///

#[derive(Debug, Default)]
pub(crate) struct LoaderCache {
    loaders: RwLock<HashMap<(TypeId, u32), Arc<ValueLoader>>>,
}

impl LoaderCache {
    pub(crate) fn get_or_build<T: Record>(&self, stored: &RelationVersion) -> Arc<ValueLoader> {
        let key = (TypeId::of::<T>(), stored.version());
        if let Some(loader) = self.loaders.read().get(&key) {
            return Arc::clone(loader);
        }

        let built = Arc::new(ValueLoader::new(stored, &T::model()));
        let mut loaders = self.loaders.write();

        Arc::clone(loaders.entry(key).or_insert(built))
    }
}
