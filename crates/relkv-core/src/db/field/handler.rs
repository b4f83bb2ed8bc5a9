use crate::{
    codec::{
        ByteReader, ByteWriter, CodecError,
        ordered::{
            f64_from_ordered_bytes, ordered_f64_bytes, push_terminated_bytes,
            read_terminated_bytes, skip_terminated_bytes,
        },
    },
    db::field::{
        FieldKind,
        composite::{DictionaryHandler, ListHandler, ObjectHandler, OptionalHandler},
        context::{FreeCtx, ReadCtx, WriteCtx},
    },
    value::Value,
};
use std::{fmt, sync::Arc};

///
/// FieldHandler
///
/// Codec capability set for one field kind. Handlers compose into row
/// codecs by sequential calls, so `skip` must consume exactly the bytes
/// `save` produced.
///

pub trait FieldHandler: fmt::Debug + Send + Sync {
    fn kind(&self) -> &FieldKind;

    fn save(&self, value: &Value, w: &mut ByteWriter, ctx: &mut WriteCtx)
    -> Result<(), CodecError>;

    fn load(&self, r: &mut ByteReader<'_>, ctx: &mut ReadCtx) -> Result<Value, CodecError>;

    fn skip(&self, r: &mut ByteReader<'_>, ctx: &mut ReadCtx) -> Result<(), CodecError>;

    /// Consume one encoded instance, recording nested-collection ids it owns.
    fn free_content(&self, r: &mut ByteReader<'_>, ctx: &mut FreeCtx) -> Result<(), CodecError> {
        self.skip(r, &mut ctx.read)
    }

    fn is_orderable(&self) -> bool {
        self.kind().is_orderable()
    }

    fn needs_context(&self) -> bool {
        self.kind().needs_context()
    }

    fn may_free_content(&self) -> bool {
        self.kind().may_free_content()
    }
}

pub(crate) fn mismatch(kind: &FieldKind, value: &Value) -> CodecError {
    CodecError::invalid_value(
        kind.handler_kind().name(),
        format!("got {} value", value.label()),
    )
}

/// Build the handler for one declared kind.
pub(crate) fn handler_for(kind: &FieldKind) -> Arc<dyn FieldHandler> {
    match kind {
        FieldKind::Bool => Arc::new(BoolHandler),
        FieldKind::Int => Arc::new(IntHandler),
        FieldKind::Uint => Arc::new(UintHandler),
        FieldKind::Float64 => Arc::new(Float64Handler),
        FieldKind::Text => Arc::new(TextHandler),
        FieldKind::Blob => Arc::new(BlobHandler),
        FieldKind::Enum(_) => Arc::new(EnumHandler { kind: kind.clone() }),
        FieldKind::Optional(inner) => Arc::new(OptionalHandler::new(kind.clone(), handler_for(inner))),
        FieldKind::List(inner) => Arc::new(ListHandler::new(kind.clone(), handler_for(inner))),
        FieldKind::Dictionary => Arc::new(DictionaryHandler),
        FieldKind::Object(shape) => {
            let fields = shape.fields.iter().map(|(_, k)| handler_for(k)).collect();
            Arc::new(ObjectHandler::new(kind.clone(), fields))
        }
    }
}

// ------------------------------------------------------------------
// Scalars
// ------------------------------------------------------------------

static BOOL_KIND: FieldKind = FieldKind::Bool;
static INT_KIND: FieldKind = FieldKind::Int;
static UINT_KIND: FieldKind = FieldKind::Uint;
static FLOAT64_KIND: FieldKind = FieldKind::Float64;
static TEXT_KIND: FieldKind = FieldKind::Text;
static BLOB_KIND: FieldKind = FieldKind::Blob;

///
/// BoolHandler
///

#[derive(Debug)]
pub(crate) struct BoolHandler;

impl FieldHandler for BoolHandler {
    fn kind(&self) -> &FieldKind {
        &BOOL_KIND
    }

    fn save(&self, value: &Value, w: &mut ByteWriter, _: &mut WriteCtx) -> Result<(), CodecError> {
        match value {
            Value::Bool(v) => {
                w.write_u8(u8::from(*v));
                Ok(())
            }
            other => Err(mismatch(self.kind(), other)),
        }
    }

    fn load(&self, r: &mut ByteReader<'_>, _: &mut ReadCtx) -> Result<Value, CodecError> {
        match r.read_u8()? {
            0 => Ok(Value::Bool(false)),
            1 => Ok(Value::Bool(true)),
            other => Err(CodecError::corrupt(format!("invalid bool byte {other}"))),
        }
    }

    fn skip(&self, r: &mut ByteReader<'_>, _: &mut ReadCtx) -> Result<(), CodecError> {
        r.skip(1)
    }
}

///
/// IntHandler
///

#[derive(Debug)]
pub(crate) struct IntHandler;

impl FieldHandler for IntHandler {
    fn kind(&self) -> &FieldKind {
        &INT_KIND
    }

    fn save(&self, value: &Value, w: &mut ByteWriter, _: &mut WriteCtx) -> Result<(), CodecError> {
        match value {
            Value::Int(v) => {
                w.write_vint(*v);
                Ok(())
            }
            other => Err(mismatch(self.kind(), other)),
        }
    }

    fn load(&self, r: &mut ByteReader<'_>, _: &mut ReadCtx) -> Result<Value, CodecError> {
        Ok(Value::Int(r.read_vint()?))
    }

    fn skip(&self, r: &mut ByteReader<'_>, _: &mut ReadCtx) -> Result<(), CodecError> {
        r.skip_vint()
    }
}

///
/// UintHandler
///

#[derive(Debug)]
pub(crate) struct UintHandler;

impl FieldHandler for UintHandler {
    fn kind(&self) -> &FieldKind {
        &UINT_KIND
    }

    fn save(&self, value: &Value, w: &mut ByteWriter, _: &mut WriteCtx) -> Result<(), CodecError> {
        match value {
            Value::Uint(v) => {
                w.write_vuint(*v);
                Ok(())
            }
            other => Err(mismatch(self.kind(), other)),
        }
    }

    fn load(&self, r: &mut ByteReader<'_>, _: &mut ReadCtx) -> Result<Value, CodecError> {
        Ok(Value::Uint(r.read_vuint()?))
    }

    fn skip(&self, r: &mut ByteReader<'_>, _: &mut ReadCtx) -> Result<(), CodecError> {
        r.skip_vuint()
    }
}

///
/// Float64Handler
///

#[derive(Debug)]
pub(crate) struct Float64Handler;

impl FieldHandler for Float64Handler {
    fn kind(&self) -> &FieldKind {
        &FLOAT64_KIND
    }

    fn save(&self, value: &Value, w: &mut ByteWriter, _: &mut WriteCtx) -> Result<(), CodecError> {
        match value {
            Value::Float64(v) => {
                w.write_bytes(&ordered_f64_bytes(*v));
                Ok(())
            }
            other => Err(mismatch(self.kind(), other)),
        }
    }

    fn load(&self, r: &mut ByteReader<'_>, _: &mut ReadCtx) -> Result<Value, CodecError> {
        Ok(Value::Float64(f64_from_ordered_bytes(r.read_array()?)))
    }

    fn skip(&self, r: &mut ByteReader<'_>, _: &mut ReadCtx) -> Result<(), CodecError> {
        r.skip(8)
    }
}

///
/// TextHandler
///

#[derive(Debug)]
pub(crate) struct TextHandler;

impl FieldHandler for TextHandler {
    fn kind(&self) -> &FieldKind {
        &TEXT_KIND
    }

    fn save(&self, value: &Value, w: &mut ByteWriter, _: &mut WriteCtx) -> Result<(), CodecError> {
        match value {
            Value::Text(v) => {
                push_terminated_bytes(w, v.as_bytes());
                Ok(())
            }
            other => Err(mismatch(self.kind(), other)),
        }
    }

    fn load(&self, r: &mut ByteReader<'_>, _: &mut ReadCtx) -> Result<Value, CodecError> {
        let bytes = read_terminated_bytes(r)?;

        String::from_utf8(bytes)
            .map(Value::Text)
            .map_err(|_| CodecError::InvalidUtf8)
    }

    fn skip(&self, r: &mut ByteReader<'_>, _: &mut ReadCtx) -> Result<(), CodecError> {
        skip_terminated_bytes(r)
    }
}

///
/// BlobHandler
///

#[derive(Debug)]
pub(crate) struct BlobHandler;

impl FieldHandler for BlobHandler {
    fn kind(&self) -> &FieldKind {
        &BLOB_KIND
    }

    fn save(&self, value: &Value, w: &mut ByteWriter, _: &mut WriteCtx) -> Result<(), CodecError> {
        match value {
            Value::Blob(v) => {
                w.write_vuint(v.len() as u64);
                w.write_bytes(v);
                Ok(())
            }
            other => Err(mismatch(self.kind(), other)),
        }
    }

    fn load(&self, r: &mut ByteReader<'_>, _: &mut ReadCtx) -> Result<Value, CodecError> {
        let len = r.read_len()?;

        Ok(Value::Blob(r.read_bytes(len)?.to_vec()))
    }

    fn skip(&self, r: &mut ByteReader<'_>, _: &mut ReadCtx) -> Result<(), CodecError> {
        let len = r.read_len()?;
        r.skip(len)
    }
}

///
/// EnumHandler
///
/// Stores the variant value; both directions reject values outside the
/// declared variant table.
///

#[derive(Debug)]
pub(crate) struct EnumHandler {
    kind: FieldKind,
}

impl EnumHandler {
    fn check(&self, value: u64) -> bool {
        match &self.kind {
            FieldKind::Enum(config) => config.contains_value(value),
            _ => false,
        }
    }
}

impl FieldHandler for EnumHandler {
    fn kind(&self) -> &FieldKind {
        &self.kind
    }

    fn save(&self, value: &Value, w: &mut ByteWriter, _: &mut WriteCtx) -> Result<(), CodecError> {
        match value {
            Value::Enum(v) if self.check(*v) => {
                w.write_vuint(*v);
                Ok(())
            }
            Value::Enum(v) => Err(CodecError::invalid_value(
                "enum",
                format!("{v} is not a declared variant"),
            )),
            other => Err(mismatch(self.kind(), other)),
        }
    }

    fn load(&self, r: &mut ByteReader<'_>, _: &mut ReadCtx) -> Result<Value, CodecError> {
        let v = r.read_vuint()?;
        if !self.check(v) {
            return Err(CodecError::corrupt(format!("unknown enum value {v}")));
        }

        Ok(Value::Enum(v))
    }

    fn skip(&self, r: &mut ByteReader<'_>, _: &mut ReadCtx) -> Result<(), CodecError> {
        r.skip_vuint()
    }
}
