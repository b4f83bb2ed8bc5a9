//! Module: db::field
//! Responsibility: per-field codecs (save, load, skip, free-content) and the
//! declared field kinds they are built from.
//! Does not own: how fields are arranged into keys or values.
//! Boundary: row codecs only see `Arc<dyn FieldHandler>`.

mod composite;
mod context;
mod convert;
mod handler;

#[cfg(test)]
mod tests;

use crate::codec::{ByteReader, ByteWriter, CodecError};
use relkv_primitives::HandlerKind;
use std::sync::Arc;

pub use context::{FreeCtx, ObjectArena, ReadCtx, WriteCtx};
pub use convert::{can_convert, is_key_compatible, specialize};
pub use handler::FieldHandler;

///
/// FieldKind
///
/// Declared type of one field. Persisted as a handler tag plus
/// handler-specific configuration bytes.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FieldKind {
    Bool,
    Int,
    Uint,
    Float64,
    Text,
    Blob,
    Enum(EnumConfig),
    Optional(Box<FieldKind>),
    List(Box<FieldKind>),
    Dictionary,
    Object(ObjectShape),
}

impl FieldKind {
    #[must_use]
    pub fn optional(inner: Self) -> Self {
        Self::Optional(Box::new(inner))
    }

    #[must_use]
    pub fn list(inner: Self) -> Self {
        Self::List(Box::new(inner))
    }

    #[must_use]
    pub const fn handler_kind(&self) -> HandlerKind {
        match self {
            Self::Bool => HandlerKind::Bool,
            Self::Int => HandlerKind::Int,
            Self::Uint => HandlerKind::Uint,
            Self::Float64 => HandlerKind::Float64,
            Self::Text => HandlerKind::Text,
            Self::Blob => HandlerKind::Blob,
            Self::Enum(_) => HandlerKind::Enum,
            Self::Optional(_) => HandlerKind::Optional,
            Self::List(_) => HandlerKind::List,
            Self::Dictionary => HandlerKind::Dictionary,
            Self::Object(_) => HandlerKind::Object,
        }
    }

    /// Whether byte order of encoded values matches value order.
    #[must_use]
    pub fn is_orderable(&self) -> bool {
        match self {
            Self::Optional(inner) => inner.is_orderable(),
            _ => self.handler_kind().is_orderable(),
        }
    }

    #[must_use]
    pub fn needs_context(&self) -> bool {
        match self {
            Self::Optional(inner) | Self::List(inner) => inner.needs_context(),
            _ => self.handler_kind().needs_context(),
        }
    }

    #[must_use]
    pub fn may_free_content(&self) -> bool {
        match self {
            Self::Optional(inner) | Self::List(inner) => inner.may_free_content(),
            Self::Object(shape) => shape.fields.iter().any(|(_, kind)| kind.may_free_content()),
            _ => self.handler_kind().may_free_content(),
        }
    }

    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Enum(config) => format!("enum({} variants)", config.variants.len()),
            Self::Optional(inner) => format!("optional<{}>", inner.describe()),
            Self::List(inner) => format!("list<{}>", inner.describe()),
            Self::Object(shape) => format!("object<{}>", shape.name),
            _ => self.handler_kind().name().to_string(),
        }
    }

    // ------------------------------------------------------------------
    // Persisted form
    // ------------------------------------------------------------------

    /// Write the handler tag followed by length-prefixed configuration bytes.
    pub fn encode(&self, w: &mut ByteWriter) {
        w.write_u8(self.handler_kind().tag());
        let config = self.config_bytes();
        w.write_vuint(config.len() as u64);
        w.write_bytes(&config);
    }

    pub fn decode(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        let tag = r.read_u8()?;
        let len = r.read_len()?;
        let config = r.read_bytes(len)?;

        Self::from_persisted(tag, config)
    }

    /// Handler-specific configuration; empty for scalar kinds.
    #[must_use]
    pub fn config_bytes(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        match self {
            Self::Enum(config) => {
                w.write_vuint(config.variants.len() as u64);
                for (name, value) in &config.variants {
                    w.write_str(name);
                    w.write_vuint(*value);
                }
            }
            Self::Optional(inner) | Self::List(inner) => inner.encode(&mut w),
            Self::Object(shape) => {
                w.write_str(&shape.name);
                w.write_vuint(shape.fields.len() as u64);
                for (name, kind) in &shape.fields {
                    w.write_str(name);
                    kind.encode(&mut w);
                }
            }
            _ => {}
        }

        w.into_bytes()
    }

    /// Rebuild a kind from its persisted tag and configuration bytes.
    pub fn from_persisted(tag: u8, config: &[u8]) -> Result<Self, CodecError> {
        let kind = HandlerKind::from_tag(tag).ok_or(CodecError::UnknownTag(tag))?;
        let mut r = ByteReader::new(config);

        let decoded = match kind {
            HandlerKind::Bool => Self::Bool,
            HandlerKind::Int => Self::Int,
            HandlerKind::Uint => Self::Uint,
            HandlerKind::Float64 => Self::Float64,
            HandlerKind::Text => Self::Text,
            HandlerKind::Blob => Self::Blob,
            HandlerKind::Dictionary => Self::Dictionary,
            HandlerKind::Enum => {
                let count = r.read_vuint()?;
                let mut variants = Vec::new();
                for _ in 0..count {
                    let name = r.read_str()?.to_string();
                    variants.push((name, r.read_vuint()?));
                }
                Self::Enum(EnumConfig { variants })
            }
            HandlerKind::Optional => Self::optional(Self::decode(&mut r)?),
            HandlerKind::List => Self::list(Self::decode(&mut r)?),
            HandlerKind::Object => {
                let name = r.read_str()?.to_string();
                let count = r.read_vuint()?;
                let mut fields = Vec::new();
                for _ in 0..count {
                    let field = r.read_str()?.to_string();
                    fields.push((field, Self::decode(&mut r)?));
                }
                Self::Object(ObjectShape { name, fields })
            }
        };

        if !r.is_empty() {
            return Err(CodecError::corrupt(format!(
                "trailing configuration bytes for {} handler",
                kind.name()
            )));
        }

        Ok(decoded)
    }

    /// Build the handler for this kind.
    #[must_use]
    pub fn handler(&self) -> Arc<dyn FieldHandler> {
        handler::handler_for(self)
    }
}

///
/// EnumConfig
///
/// Named variants and their stored values.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EnumConfig {
    pub variants: Vec<(String, u64)>,
}

impl EnumConfig {
    #[must_use]
    pub fn new(variants: &[(&str, u64)]) -> Self {
        Self {
            variants: variants
                .iter()
                .map(|(name, value)| ((*name).to_string(), *value))
                .collect(),
        }
    }

    #[must_use]
    pub fn contains_value(&self, value: u64) -> bool {
        self.variants.iter().any(|(_, v)| *v == value)
    }

    /// Every stored value of `self` means the same variant in `other`.
    #[must_use]
    pub fn is_subset_of(&self, other: &Self) -> bool {
        self.variants
            .iter()
            .all(|variant| other.variants.contains(variant))
    }
}

///
/// ObjectShape
///
/// Field list of an embedded sub-record.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ObjectShape {
    pub name: String,
    pub fields: Vec<(String, FieldKind)>,
}

impl ObjectShape {
    #[must_use]
    pub fn new(name: &str, fields: Vec<(&str, FieldKind)>) -> Self {
        Self {
            name: name.to_string(),
            fields: fields
                .into_iter()
                .map(|(field, kind)| (field.to_string(), kind))
                .collect(),
        }
    }
}
