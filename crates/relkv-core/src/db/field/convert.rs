//! Lossless conversions between field kinds, used when a stored field is
//! read through a newer or different declaration.

use crate::{
    codec::{ByteReader, ByteWriter, CodecError},
    db::field::{FieldHandler, FieldKind, FreeCtx, ReadCtx, WriteCtx},
    value::Value,
};
use std::sync::Arc;

/// Whether values stored as `from` can be read as `to` without loss.
#[must_use]
pub fn can_convert(from: &FieldKind, to: &FieldKind) -> bool {
    if from == to {
        return true;
    }

    match (from, to) {
        (FieldKind::Enum(a), FieldKind::Enum(b)) => a.is_subset_of(b),
        (FieldKind::Bool, FieldKind::Int | FieldKind::Uint) => true,
        (FieldKind::Optional(a), FieldKind::Optional(b)) | (FieldKind::List(a), FieldKind::List(b)) => {
            can_convert(a, b)
        }
        (_, FieldKind::Optional(b)) => can_convert(from, b),
        _ => false,
    }
}

/// Whether stored key bytes of `prev` stay valid, byte for byte, as `next`.
///
/// Enum widening is the only change allowed for key fields.
#[must_use]
pub fn is_key_compatible(prev: &FieldKind, next: &FieldKind) -> bool {
    match (prev, next) {
        (FieldKind::Enum(a), FieldKind::Enum(b)) => a.is_subset_of(b),
        (FieldKind::Optional(a), FieldKind::Optional(b)) => is_key_compatible(a, b),
        _ => prev == next,
    }
}

fn convert_value(
    value: Value,
    from: &FieldKind,
    to: &FieldKind,
) -> Result<Value, CodecError> {
    if from == to {
        return Ok(value);
    }

    match (from, to, value) {
        (FieldKind::Enum(_), FieldKind::Enum(_), value @ Value::Enum(_))
        | (FieldKind::Optional(_), FieldKind::Optional(_), value @ Value::Null) => Ok(value),
        (FieldKind::Bool, FieldKind::Int, Value::Bool(v)) => Ok(Value::Int(i64::from(v))),
        (FieldKind::Bool, FieldKind::Uint, Value::Bool(v)) => Ok(Value::Uint(u64::from(v))),
        (FieldKind::Optional(a), FieldKind::Optional(b), value) => convert_value(value, a, b),
        (FieldKind::List(a), FieldKind::List(b), Value::List(items)) => items
            .into_iter()
            .map(|item| convert_value(item, a, b))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        (_, FieldKind::Optional(b), value) => convert_value(value, from, b),
        (_, _, value) => Err(CodecError::Unsupported(format!(
            "cannot read {} value stored as {} as {}",
            value.label(),
            from.describe(),
            to.describe()
        ))),
    }
}

/// Produce a handler that reads bytes written by `source` as `target`
/// values, or `None` when no lossless conversion exists.
#[must_use]
pub fn specialize(
    source: &Arc<dyn FieldHandler>,
    target: &FieldKind,
) -> Option<Arc<dyn FieldHandler>> {
    if source.kind() == target {
        return Some(Arc::clone(source));
    }
    if !can_convert(source.kind(), target) {
        return None;
    }

    Some(Arc::new(ConvertingHandler {
        target: target.clone(),
        source: Arc::clone(source),
    }))
}

///
/// ConvertingHandler
///
/// Read-only view over another handler's bytes.
///

#[derive(Debug)]
struct ConvertingHandler {
    target: FieldKind,
    source: Arc<dyn FieldHandler>,
}

impl FieldHandler for ConvertingHandler {
    fn kind(&self) -> &FieldKind {
        &self.target
    }

    fn save(&self, _: &Value, _: &mut ByteWriter, _: &mut WriteCtx) -> Result<(), CodecError> {
        Err(CodecError::Unsupported(format!(
            "{} bytes are read-only through a {} view",
            self.source.kind().describe(),
            self.target.describe()
        )))
    }

    fn load(&self, r: &mut ByteReader<'_>, ctx: &mut ReadCtx) -> Result<Value, CodecError> {
        let value = self.source.load(r, ctx)?;

        convert_value(value, self.source.kind(), &self.target)
    }

    fn skip(&self, r: &mut ByteReader<'_>, ctx: &mut ReadCtx) -> Result<(), CodecError> {
        self.source.skip(r, ctx)
    }

    fn free_content(&self, r: &mut ByteReader<'_>, ctx: &mut FreeCtx) -> Result<(), CodecError> {
        self.source.free_content(r, ctx)
    }

    fn is_orderable(&self) -> bool {
        self.source.is_orderable() && self.target.is_orderable()
    }

    fn needs_context(&self) -> bool {
        self.source.needs_context()
    }

    fn may_free_content(&self) -> bool {
        self.source.may_free_content()
    }
}
