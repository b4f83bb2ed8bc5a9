//! Module: db::schema
//! Responsibility: immutable per-version layout descriptors and their
//! persisted form; resolution of the current version on open.
//! Does not own: row bytes or index maintenance.
//! Boundary: everything downstream reads layouts through `RelationVersion`.

mod resolve;


use crate::{
    codec::{ByteReader, ByteWriter, CodecError},
    db::field::{FieldHandler, FieldKind, is_key_compatible},
    error::{ErrorClass, ErrorDetail, ErrorOrigin, InternalError},
    model::RelationModel,
};
use std::{collections::BTreeSet, fmt, sync::Arc};
use thiserror::Error as ThisError;

pub(crate) use resolve::{ResolveOutcome, ResolvedSchema, resolve_schema};

///
/// SchemaError
///

#[derive(Debug, ThisError)]
pub enum SchemaError {
    #[error("relation '{relation}' declares field '{field}' more than once")]
    DuplicateField { relation: String, field: String },

    #[error("relation '{relation}' references unknown field '{field}'")]
    UnknownField { relation: String, field: String },

    #[error("relation '{relation}' has no primary key")]
    EmptyPrimaryKey { relation: String },

    #[error("relation '{relation}' uses non-orderable field '{field}' ({kind}) in a key")]
    UnorderableKeyField {
        relation: String,
        field: String,
        kind: String,
    },

    #[error("relation '{relation}' apart field '{field}' must be a leading primary-key field")]
    ApartFieldNotLeadingKey { relation: String, field: String },

    #[error("relation '{relation}' declares index '{index}' more than once or with no fields")]
    InvalidIndex { relation: String, index: String },

    #[error("relation '{relation}' changed its primary key: {reason}")]
    PrimaryKeyChanged { relation: String, reason: String },

    #[error("relation '{relation}' version {version} descriptor is malformed: {reason}")]
    MalformedDescriptor {
        relation: String,
        version: u32,
        reason: String,
    },

    #[error("relation '{relation}' version history expected version {expected}, found {found}")]
    VersionGap {
        relation: String,
        expected: u32,
        found: u32,
    },
}

impl From<SchemaError> for InternalError {
    fn from(err: SchemaError) -> Self {
        Self {
            class: ErrorClass::SchemaViolation,
            origin: ErrorOrigin::Schema,
            message: err.to_string(),
            detail: Some(ErrorDetail::Schema(err)),
        }
    }
}

///
/// FieldDef
///
/// One field of a version descriptor with its handler.
///

#[derive(Clone, Debug)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
    pub handler: Arc<dyn FieldHandler>,
}

impl FieldDef {
    fn new(name: &str, kind: FieldKind) -> Self {
        let handler = kind.handler();

        Self {
            name: name.to_string(),
            kind,
            handler,
        }
    }
}

///
/// FieldRef
///
/// Source of one secondary-key field: a primary-key ordinal or a value
/// field name.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FieldRef {
    Primary(usize),
    Value(String),
}

///
/// SecondaryKeyDef
///
/// Byte layout of one secondary index. Always contains every primary-key
/// field, so each entry maps back to exactly one row.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SecondaryKeyDef {
    pub id: u32,
    pub name: String,
    pub fields: Vec<FieldRef>,
}

impl fmt::Display for SecondaryKeyDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.id)
    }
}

///
/// RelationVersion
///
/// Immutable layout of one persisted schema generation.
///

#[derive(Clone, Debug)]
pub struct RelationVersion {
    version: u32,
    fields: Vec<FieldDef>,
    primary_key: Vec<usize>,
    value_fields: Vec<usize>,
    secondary_keys: Vec<SecondaryKeyDef>,
}

impl RelationVersion {
    /// Build the descriptor for a declared model, keeping secondary-index
    /// ids stable against `previous` when an index layout is unchanged.
    pub fn from_model(
        model: &RelationModel,
        version: u32,
        previous: Option<&Self>,
    ) -> Result<Self, SchemaError> {
        let relation = || model.name.clone();

        // Phase 1: fields, apart fields first.
        let mut seen = BTreeSet::new();
        let mut fields = Vec::new();
        for field in model.all_fields() {
            if !seen.insert(field.name.as_str()) {
                return Err(SchemaError::DuplicateField {
                    relation: relation(),
                    field: field.name.clone(),
                });
            }
            fields.push(FieldDef::new(&field.name, field.kind.clone()));
        }

        // Phase 2: primary key.
        if model.primary_key.is_empty() {
            return Err(SchemaError::EmptyPrimaryKey {
                relation: relation(),
            });
        }
        let mut primary_key = Vec::with_capacity(model.primary_key.len());
        for name in &model.primary_key {
            let index = key_field_index(model, &fields, name)?;
            if primary_key.contains(&index) {
                return Err(SchemaError::DuplicateField {
                    relation: relation(),
                    field: name.clone(),
                });
            }
            primary_key.push(index);
        }
        for (position, apart) in model.apart_fields.iter().enumerate() {
            let leading = model.primary_key.get(position) == Some(&apart.name);
            if !leading {
                return Err(SchemaError::ApartFieldNotLeadingKey {
                    relation: relation(),
                    field: apart.name.clone(),
                });
            }
        }

        let value_fields = (0..fields.len())
            .filter(|index| !primary_key.contains(index))
            .collect();

        let mut descriptor = Self {
            version,
            fields,
            primary_key,
            value_fields,
            secondary_keys: Vec::new(),
        };

        // Phase 3: secondary keys.
        let mut next_id = previous
            .and_then(|prev| prev.secondary_keys.iter().map(|sk| sk.id + 1).max())
            .unwrap_or(0);
        let mut names = BTreeSet::new();
        for index in &model.indexes {
            if index.fields.is_empty() || !names.insert(index.name.as_str()) {
                return Err(SchemaError::InvalidIndex {
                    relation: relation(),
                    index: index.name.clone(),
                });
            }

            let refs = descriptor.secondary_key_refs(model, &index.fields)?;
            let reused = previous.and_then(|prev| {
                prev.secondary_keys
                    .iter()
                    .find(|sk| {
                        sk.name == index.name
                            && prev.key_layout(&sk.fields) == descriptor.key_layout(&refs)
                    })
                    .map(|sk| sk.id)
            });
            let id = reused.unwrap_or_else(|| {
                next_id += 1;
                next_id - 1
            });

            descriptor.secondary_keys.push(SecondaryKeyDef {
                id,
                name: index.name.clone(),
                fields: refs,
            });
        }
        descriptor.secondary_keys.sort_by_key(|sk| sk.id);

        Ok(descriptor)
    }

    // Apart fields lead every secondary key so handle-scoped scans stay
    // prefix scans; missing primary-key fields are appended in key order.
    fn secondary_key_refs(
        &self,
        model: &RelationModel,
        names: &[String],
    ) -> Result<Vec<FieldRef>, SchemaError> {
        let mut refs: Vec<FieldRef> = (0..model.apart_fields.len()).map(FieldRef::Primary).collect();

        for name in names {
            let index = key_field_index(model, &self.fields, name)?;
            let field_ref = match self.primary_key.iter().position(|pk| *pk == index) {
                Some(ordinal) => FieldRef::Primary(ordinal),
                None => FieldRef::Value(name.clone()),
            };
            if refs.contains(&field_ref) {
                if model.is_apart(name) {
                    continue;
                }
                return Err(SchemaError::DuplicateField {
                    relation: model.name.clone(),
                    field: name.clone(),
                });
            }
            refs.push(field_ref);
        }

        for ordinal in 0..self.primary_key.len() {
            let field_ref = FieldRef::Primary(ordinal);
            if !refs.contains(&field_ref) {
                refs.push(field_ref);
            }
        }

        Ok(refs)
    }

    // (name, kind) sequence used to decide whether stored index bytes of
    // another version are still valid.
    fn key_layout(&self, refs: &[FieldRef]) -> Vec<Option<(&str, &FieldKind)>> {
        refs.iter()
            .map(|field_ref| {
                self.referenced_field(field_ref)
                    .map(|field| (field.name.as_str(), &field.kind))
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }

    #[must_use]
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Primary-key fields in key order.
    pub fn primary_key_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.primary_key.iter().map(|index| &self.fields[*index])
    }

    #[must_use]
    pub fn primary_key_len(&self) -> usize {
        self.primary_key.len()
    }

    #[must_use]
    pub fn primary_key_field(&self, ordinal: usize) -> Option<&FieldDef> {
        self.primary_key.get(ordinal).map(|index| &self.fields[*index])
    }

    /// Value fields in stored order.
    pub fn value_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.value_fields.iter().map(|index| &self.fields[*index])
    }

    /// Position of a value field within the stored value.
    #[must_use]
    pub fn value_position(&self, name: &str) -> Option<usize> {
        self.value_fields()
            .position(|field| field.name == name)
    }

    #[must_use]
    pub fn value_field(&self, position: usize) -> Option<&FieldDef> {
        self.value_fields.get(position).map(|index| &self.fields[*index])
    }

    #[must_use]
    pub fn secondary_keys(&self) -> &[SecondaryKeyDef] {
        &self.secondary_keys
    }

    #[must_use]
    pub fn secondary_key(&self, id: u32) -> Option<&SecondaryKeyDef> {
        self.secondary_keys.iter().find(|sk| sk.id == id)
    }

    #[must_use]
    pub fn secondary_key_by_name(&self, name: &str) -> Option<&SecondaryKeyDef> {
        self.secondary_keys.iter().find(|sk| sk.name == name)
    }

    #[must_use]
    pub fn referenced_field(&self, field_ref: &FieldRef) -> Option<&FieldDef> {
        match field_ref {
            FieldRef::Primary(ordinal) => self.primary_key_field(*ordinal),
            FieldRef::Value(name) => self
                .value_position(name)
                .and_then(|position| self.value_field(position)),
        }
    }

    /// Field-for-field equality, ignoring the version number.
    #[must_use]
    pub fn same_layout(&self, other: &Self) -> bool {
        self.primary_key == other.primary_key
            && self.secondary_keys == other.secondary_keys
            && self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(&other.fields)
                .all(|(a, b)| a.name == b.name && a.kind == b.kind)
    }

    /// Stored primary-key bytes of `previous` must remain valid for `self`.
    pub fn check_primary_key_compatible(
        &self,
        previous: &Self,
        relation: &str,
    ) -> Result<(), SchemaError> {
        let changed = |reason: String| SchemaError::PrimaryKeyChanged {
            relation: relation.to_string(),
            reason,
        };

        if self.primary_key_len() != previous.primary_key_len() {
            return Err(changed(format!(
                "field count {} -> {}",
                previous.primary_key_len(),
                self.primary_key_len()
            )));
        }

        for (prev, next) in previous.primary_key_fields().zip(self.primary_key_fields()) {
            if !is_key_compatible(&prev.kind, &next.kind) {
                return Err(changed(format!(
                    "field '{}' {} -> '{}' {}",
                    prev.name,
                    prev.kind.describe(),
                    next.name,
                    next.kind.describe()
                )));
            }
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // Persisted form
    // ------------------------------------------------------------------

    #[must_use]
    pub fn save(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();

        w.write_vuint(self.fields.len() as u64);
        for field in &self.fields {
            w.write_str(&field.name);
            field.kind.encode(&mut w);
        }

        w.write_vuint(self.primary_key.len() as u64);
        for index in &self.primary_key {
            w.write_vuint(*index as u64);
        }

        w.write_vuint(self.secondary_keys.len() as u64);
        for sk in &self.secondary_keys {
            w.write_vuint(u64::from(sk.id));
            w.write_str(&sk.name);
            w.write_vuint(sk.fields.len() as u64);
            for field_ref in &sk.fields {
                match field_ref {
                    FieldRef::Primary(ordinal) => {
                        w.write_u8(0);
                        w.write_vuint(*ordinal as u64);
                    }
                    FieldRef::Value(name) => {
                        w.write_u8(1);
                        w.write_str(name);
                    }
                }
            }
        }

        w.into_bytes()
    }

    pub fn load(relation: &str, version: u32, bytes: &[u8]) -> Result<Self, SchemaError> {
        Self::decode(version, bytes).map_err(|err| SchemaError::MalformedDescriptor {
            relation: relation.to_string(),
            version,
            reason: err.to_string(),
        })
    }

    fn decode(version: u32, bytes: &[u8]) -> Result<Self, CodecError> {
        let mut r = ByteReader::new(bytes);

        let field_count = r.read_vuint()?;
        let mut fields = Vec::new();
        for _ in 0..field_count {
            let name = r.read_str()?.to_string();
            let kind = FieldKind::decode(&mut r)?;
            fields.push(FieldDef::new(&name, kind));
        }

        let read_index = |r: &mut ByteReader<'_>, bound: usize| -> Result<usize, CodecError> {
            let index = usize::try_from(r.read_vuint()?)
                .map_err(|_| CodecError::corrupt("field index overflow"))?;
            if index >= bound {
                return Err(CodecError::corrupt(format!("field index {index} out of range")));
            }
            Ok(index)
        };

        let pk_count = r.read_vuint()?;
        let mut primary_key = Vec::new();
        for _ in 0..pk_count {
            primary_key.push(read_index(&mut r, fields.len())?);
        }

        let mut descriptor = Self {
            version,
            value_fields: (0..fields.len())
                .filter(|index| !primary_key.contains(index))
                .collect(),
            fields,
            primary_key,
            secondary_keys: Vec::new(),
        };

        let sk_count = r.read_vuint()?;
        for _ in 0..sk_count {
            let id = r.read_vuint_u32()?;
            let name = r.read_str()?.to_string();
            let ref_count = r.read_vuint()?;
            let mut refs = Vec::new();
            for _ in 0..ref_count {
                let field_ref = match r.read_u8()? {
                    0 => FieldRef::Primary(read_index(&mut r, descriptor.primary_key.len())?),
                    1 => FieldRef::Value(r.read_str()?.to_string()),
                    other => {
                        return Err(CodecError::corrupt(format!("invalid field ref tag {other}")));
                    }
                };
                if descriptor.referenced_field(&field_ref).is_none() {
                    return Err(CodecError::corrupt(format!(
                        "index '{name}' references a missing field"
                    )));
                }
                refs.push(field_ref);
            }
            descriptor.secondary_keys.push(SecondaryKeyDef {
                id,
                name,
                fields: refs,
            });
        }

        if !r.is_empty() {
            return Err(CodecError::corrupt("trailing descriptor bytes"));
        }

        Ok(descriptor)
    }
}

// Resolve a key field by name and require an orderable encoding.
fn key_field_index(
    model: &RelationModel,
    fields: &[FieldDef],
    name: &str,
) -> Result<usize, SchemaError> {
    let index = fields
        .iter()
        .position(|field| field.name == name)
        .ok_or_else(|| SchemaError::UnknownField {
            relation: model.name.clone(),
            field: name.to_string(),
        })?;

    let kind = &fields[index].kind;
    if !kind.is_orderable() {
        return Err(SchemaError::UnorderableKeyField {
            relation: model.name.clone(),
            field: name.to_string(),
            kind: kind.describe(),
        });
    }

    Ok(index)
}
