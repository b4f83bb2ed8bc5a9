use crate::{
    codec::{ByteReader, ByteWriter, CodecError},
    db::field::{
        FieldHandler, FieldKind,
        context::{FreeCtx, ReadCtx, Visit, WriteCtx},
        handler::mismatch,
    },
    value::{ObjectValue, Value},
};
use std::sync::Arc;

static DICTIONARY_KIND: FieldKind = FieldKind::Dictionary;

///
/// OptionalHandler
///
/// `0` for absent, `1` followed by the inner encoding otherwise.
///

#[derive(Debug)]
pub(crate) struct OptionalHandler {
    kind: FieldKind,
    inner: Arc<dyn FieldHandler>,
}

impl OptionalHandler {
    pub(crate) fn new(kind: FieldKind, inner: Arc<dyn FieldHandler>) -> Self {
        Self { kind, inner }
    }

    fn read_flag(r: &mut ByteReader<'_>) -> Result<bool, CodecError> {
        match r.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CodecError::corrupt(format!("invalid optional flag {other}"))),
        }
    }
}

impl FieldHandler for OptionalHandler {
    fn kind(&self) -> &FieldKind {
        &self.kind
    }

    fn save(&self, value: &Value, w: &mut ByteWriter, ctx: &mut WriteCtx) -> Result<(), CodecError> {
        if value.is_null() {
            w.write_u8(0);
            return Ok(());
        }
        w.write_u8(1);

        self.inner.save(value, w, ctx)
    }

    fn load(&self, r: &mut ByteReader<'_>, ctx: &mut ReadCtx) -> Result<Value, CodecError> {
        if Self::read_flag(r)? {
            self.inner.load(r, ctx)
        } else {
            Ok(Value::Null)
        }
    }

    fn skip(&self, r: &mut ByteReader<'_>, ctx: &mut ReadCtx) -> Result<(), CodecError> {
        if Self::read_flag(r)? {
            self.inner.skip(r, ctx)?;
        }

        Ok(())
    }

    fn free_content(&self, r: &mut ByteReader<'_>, ctx: &mut FreeCtx) -> Result<(), CodecError> {
        if Self::read_flag(r)? {
            self.inner.free_content(r, ctx)?;
        }

        Ok(())
    }
}

///
/// ListHandler
///
/// Item count followed by the items.
///

#[derive(Debug)]
pub(crate) struct ListHandler {
    kind: FieldKind,
    inner: Arc<dyn FieldHandler>,
}

impl ListHandler {
    pub(crate) fn new(kind: FieldKind, inner: Arc<dyn FieldHandler>) -> Self {
        Self { kind, inner }
    }
}

impl FieldHandler for ListHandler {
    fn kind(&self) -> &FieldKind {
        &self.kind
    }

    fn save(&self, value: &Value, w: &mut ByteWriter, ctx: &mut WriteCtx) -> Result<(), CodecError> {
        let Value::List(items) = value else {
            return Err(mismatch(&self.kind, value));
        };

        w.write_vuint(items.len() as u64);
        for item in items {
            self.inner.save(item, w, ctx)?;
        }

        Ok(())
    }

    fn load(&self, r: &mut ByteReader<'_>, ctx: &mut ReadCtx) -> Result<Value, CodecError> {
        let count = r.read_vuint()?;
        let mut items = Vec::new();
        for _ in 0..count {
            items.push(self.inner.load(r, ctx)?);
        }

        Ok(Value::List(items))
    }

    fn skip(&self, r: &mut ByteReader<'_>, ctx: &mut ReadCtx) -> Result<(), CodecError> {
        let count = r.read_vuint()?;
        for _ in 0..count {
            self.inner.skip(r, ctx)?;
        }

        Ok(())
    }

    fn free_content(&self, r: &mut ByteReader<'_>, ctx: &mut FreeCtx) -> Result<(), CodecError> {
        let count = r.read_vuint()?;
        for _ in 0..count {
            self.inner.free_content(r, ctx)?;
        }

        Ok(())
    }
}

///
/// DictionaryHandler
///
/// Reference to a nested collection owned by the row; `0` means none.
///

#[derive(Debug)]
pub(crate) struct DictionaryHandler;

impl FieldHandler for DictionaryHandler {
    fn kind(&self) -> &FieldKind {
        &DICTIONARY_KIND
    }

    fn save(&self, value: &Value, w: &mut ByteWriter, _: &mut WriteCtx) -> Result<(), CodecError> {
        match value {
            Value::Null => w.write_vuint(0),
            Value::Collection(id) if *id > 0 => w.write_vuint(*id),
            other => return Err(mismatch(&DICTIONARY_KIND, other)),
        }

        Ok(())
    }

    fn load(&self, r: &mut ByteReader<'_>, _: &mut ReadCtx) -> Result<Value, CodecError> {
        Ok(match r.read_vuint()? {
            0 => Value::Null,
            id => Value::Collection(id),
        })
    }

    fn skip(&self, r: &mut ByteReader<'_>, _: &mut ReadCtx) -> Result<(), CodecError> {
        r.skip_vuint()
    }

    fn free_content(&self, r: &mut ByteReader<'_>, ctx: &mut FreeCtx) -> Result<(), CodecError> {
        let id = r.read_vuint()?;
        if id > 0 {
            ctx.collections.push(id);
        }

        Ok(())
    }
}

///
/// ObjectHandler
///
/// Embedded sub-record. The header is a signed varint: `0` for null and
/// `-ordinal` for an instance. The first time an ordinal appears its fields
/// follow; later appearances are back-references with no payload.
///

#[derive(Debug)]
pub(crate) struct ObjectHandler {
    kind: FieldKind,
    fields: Vec<Arc<dyn FieldHandler>>,
}

enum Header {
    Null,
    New,
    Seen(u32),
}

impl ObjectHandler {
    pub(crate) fn new(kind: FieldKind, fields: Vec<Arc<dyn FieldHandler>>) -> Self {
        Self { kind, fields }
    }

    fn read_header(r: &mut ByteReader<'_>, ctx: &mut ReadCtx) -> Result<Header, CodecError> {
        let header = r.read_vint()?;
        if header == 0 {
            return Ok(Header::Null);
        }
        if header > 0 {
            return Err(CodecError::corrupt(format!(
                "object header {header} refers outside the row"
            )));
        }

        let ordinal = u32::try_from(header.unsigned_abs())
            .map_err(|_| CodecError::corrupt("object ordinal overflow"))?;

        Ok(match ctx.arena.visit(ordinal)? {
            Visit::New => Header::New,
            Visit::Seen => Header::Seen(ordinal),
        })
    }
}

impl FieldHandler for ObjectHandler {
    fn kind(&self) -> &FieldKind {
        &self.kind
    }

    fn save(&self, value: &Value, w: &mut ByteWriter, ctx: &mut WriteCtx) -> Result<(), CodecError> {
        match value {
            Value::Null => w.write_vint(0),
            Value::Object(ObjectValue::SameAs(ordinal)) => {
                if !ctx.arena.contains(*ordinal) {
                    return Err(CodecError::invalid_value(
                        "object",
                        format!("back-reference to unwritten instance {ordinal}"),
                    ));
                }
                w.write_vint(-i64::from(*ordinal));
            }
            Value::Object(ObjectValue::Inline(values)) => {
                if values.len() != self.fields.len() {
                    return Err(CodecError::invalid_value(
                        "object",
                        format!(
                            "expected {} fields, got {}",
                            self.fields.len(),
                            values.len()
                        ),
                    ));
                }

                let ordinal = ctx.arena.assign();
                w.write_vint(-i64::from(ordinal));
                for (handler, value) in self.fields.iter().zip(values) {
                    handler.save(value, w, ctx)?;
                }
            }
            other => return Err(mismatch(&self.kind, other)),
        }

        Ok(())
    }

    fn load(&self, r: &mut ByteReader<'_>, ctx: &mut ReadCtx) -> Result<Value, CodecError> {
        match Self::read_header(r, ctx)? {
            Header::Null => Ok(Value::Null),
            Header::Seen(ordinal) => Ok(Value::Object(ObjectValue::SameAs(ordinal))),
            Header::New => {
                let mut values = Vec::with_capacity(self.fields.len());
                for handler in &self.fields {
                    values.push(handler.load(r, ctx)?);
                }

                Ok(Value::Object(ObjectValue::Inline(values)))
            }
        }
    }

    fn skip(&self, r: &mut ByteReader<'_>, ctx: &mut ReadCtx) -> Result<(), CodecError> {
        if let Header::New = Self::read_header(r, ctx)? {
            for handler in &self.fields {
                handler.skip(r, ctx)?;
            }
        }

        Ok(())
    }

    fn free_content(&self, r: &mut ByteReader<'_>, ctx: &mut FreeCtx) -> Result<(), CodecError> {
        // Back-references were already visited through their first instance.
        if let Header::New = Self::read_header(r, &mut ctx.read)? {
            for handler in &self.fields {
                handler.free_content(r, ctx)?;
            }
        }

        Ok(())
    }
}
