//! Byte-splice mergers between primary rows and secondary keys.
//!
//! Both mergers make one forward pass over each source buffer. Fields the
//! target needs later than they appear in the source are held in slots.

use crate::{
    codec::{ByteReader, ByteWriter},
    db::{
        field::{FieldHandler, ReadCtx, WriteCtx, specialize},
        row::FieldSource,
        schema::{FieldRef, RelationVersion, SecondaryKeyDef},
    },
    error::InternalError,
    value::Value,
};
use std::{collections::HashMap, sync::Arc};

type Handler = Arc<dyn FieldHandler>;

fn lost_field(sk: &SecondaryKeyDef) -> InternalError {
    InternalError::store_invariant(format!("index {sk} references a missing field"))
}

// ----------------------------------------------------------------------
// Primary -> secondary
// ----------------------------------------------------------------------

///
/// PkToSkOp
///

#[derive(Debug)]
enum PkToSkOp {
    SkipPk(Handler),
    StashPk { handler: Handler, slot: usize },
    CopyPk(Handler),
    SkipValue(Handler),
    StashValue { handler: Handler, slot: usize },
    CopyValue(Handler),
    ConvertValue { source: Handler, target: Handler },
    EmitSlot { slot: usize, handler: Handler },
    EmitConst { value: Value, handler: Handler },
}

///
/// PkToSkMerger
///
/// Builds secondary-key bytes of the current version straight from the
/// primary-key bytes and the value bytes of one stored version.
///

#[derive(Debug)]
pub(crate) struct PkToSkMerger {
    ops: Vec<PkToSkOp>,
    slots: usize,
}

impl PkToSkMerger {
    /// `defaults` supplies fields the stored version does not carry.
    pub(crate) fn new(
        stored: &RelationVersion,
        current: &RelationVersion,
        sk: &SecondaryKeyDef,
        defaults: &dyn FieldSource,
    ) -> Result<Self, InternalError> {
        // stored value position of each index field that can be read from the value buffer
        let mut sources = Vec::with_capacity(sk.fields.len());
        for field_ref in &sk.fields {
            let target = current.referenced_field(field_ref).ok_or_else(|| lost_field(sk))?;
            let source = match field_ref {
                FieldRef::Primary(ordinal) => Source::Primary(*ordinal),
                FieldRef::Value(name) => stored
                    .value_position(name)
                    .and_then(|pos| {
                        let def = stored.value_field(pos)?;
                        let reader = specialize(&def.handler, &target.kind)?;
                        Some(Source::Value {
                            pos,
                            reader,
                            exact: def.kind == target.kind,
                        })
                    })
                    .unwrap_or_else(|| {
                        Source::Const(defaults.field_value(name).unwrap_or_default())
                    }),
            };
            sources.push((source, Arc::clone(&target.handler)));
        }

        let mut ops = Vec::new();
        let mut slots = 0;
        let mut stashed_pk: HashMap<usize, usize> = HashMap::new();
        let mut stashed_value: HashMap<usize, usize> = HashMap::new();
        let mut pk_next = 0;
        let mut value_next = 0;

        for (i, (source, target)) in sources.iter().enumerate() {
            let later = &sources[i + 1..];

            match source {
                Source::Primary(ordinal) => {
                    if let Some(slot) = stashed_pk.remove(ordinal) {
                        ops.push(PkToSkOp::EmitSlot {
                            slot,
                            handler: Arc::clone(target),
                        });
                        continue;
                    }
                    while pk_next < *ordinal {
                        let handler = current
                            .primary_key_field(pk_next)
                            .map(|def| Arc::clone(&def.handler))
                            .ok_or_else(|| lost_field(sk))?;
                        let needed = later
                            .iter()
                            .any(|(s, _)| matches!(s, Source::Primary(o) if *o == pk_next));
                        if needed {
                            stashed_pk.insert(pk_next, slots);
                            ops.push(PkToSkOp::StashPk { handler, slot: slots });
                            slots += 1;
                        } else {
                            ops.push(PkToSkOp::SkipPk(handler));
                        }
                        pk_next += 1;
                    }
                    ops.push(PkToSkOp::CopyPk(Arc::clone(target)));
                    pk_next = ordinal + 1;
                }

                Source::Value { pos, reader, exact } => {
                    if let Some(slot) = stashed_value.remove(pos) {
                        ops.push(PkToSkOp::EmitSlot {
                            slot,
                            handler: Arc::clone(target),
                        });
                        continue;
                    }
                    while value_next < *pos {
                        let needed_by = later.iter().find_map(|(s, _)| match s {
                            Source::Value { pos, reader, .. } if *pos == value_next => {
                                Some(Arc::clone(reader))
                            }
                            _ => None,
                        });
                        if let Some(handler) = needed_by {
                            stashed_value.insert(value_next, slots);
                            ops.push(PkToSkOp::StashValue { handler, slot: slots });
                            slots += 1;
                        } else {
                            let handler = stored
                                .value_field(value_next)
                                .map(|def| Arc::clone(&def.handler))
                                .ok_or_else(|| lost_field(sk))?;
                            ops.push(PkToSkOp::SkipValue(handler));
                        }
                        value_next += 1;
                    }
                    if *exact {
                        ops.push(PkToSkOp::CopyValue(Arc::clone(reader)));
                    } else {
                        ops.push(PkToSkOp::ConvertValue {
                            source: Arc::clone(reader),
                            target: Arc::clone(target),
                        });
                    }
                    value_next = pos + 1;
                }

                Source::Const(value) => ops.push(PkToSkOp::EmitConst {
                    value: value.clone(),
                    handler: Arc::clone(target),
                }),
            }
        }

        Ok(Self { ops, slots })
    }

    /// Append the index fields to `out`. `pk_fields` follows the relation
    /// prefix; `value_fields` follows the version tag.
    pub(crate) fn merge(
        &self,
        pk_fields: &[u8],
        value_fields: &[u8],
        out: &mut ByteWriter,
    ) -> Result<(), InternalError> {
        let mut pk = ByteReader::new(pk_fields);
        let mut values = ByteReader::new(value_fields);
        let mut pk_ctx = ReadCtx::default();
        let mut value_ctx = ReadCtx::default();
        let mut write_ctx = WriteCtx::default();
        let mut slots: Vec<Option<Value>> = vec![None; self.slots];

        for op in &self.ops {
            match op {
                PkToSkOp::SkipPk(handler) => handler.skip(&mut pk, &mut pk_ctx)?,
                PkToSkOp::StashPk { handler, slot } => {
                    slots[*slot] = Some(handler.load(&mut pk, &mut pk_ctx)?);
                }
                PkToSkOp::CopyPk(handler) => copy_field(handler, &mut pk, &mut pk_ctx, out)?,
                PkToSkOp::SkipValue(handler) => handler.skip(&mut values, &mut value_ctx)?,
                PkToSkOp::StashValue { handler, slot } => {
                    slots[*slot] = Some(handler.load(&mut values, &mut value_ctx)?);
                }
                PkToSkOp::CopyValue(handler) => {
                    copy_field(handler, &mut values, &mut value_ctx, out)?;
                }
                PkToSkOp::ConvertValue { source, target } => {
                    let loaded = source.load(&mut values, &mut value_ctx)?;
                    target.save(&loaded, out, &mut write_ctx)?;
                }
                PkToSkOp::EmitSlot { slot, handler } => {
                    let held = slots[*slot]
                        .take()
                        .ok_or_else(|| InternalError::store_invariant("splice slot emitted twice"))?;
                    handler.save(&held, out, &mut write_ctx)?;
                }
                PkToSkOp::EmitConst { value, handler } => handler.save(value, out, &mut write_ctx)?,
            }
        }

        Ok(())
    }
}

#[derive(Debug)]
enum Source {
    Primary(usize),
    Value {
        pos: usize,
        reader: Handler,
        exact: bool,
    },
    Const(Value),
}

fn copy_field(
    handler: &Handler,
    r: &mut ByteReader<'_>,
    ctx: &mut ReadCtx,
    out: &mut ByteWriter,
) -> Result<(), InternalError> {
    let start = r.position();
    handler.skip(r, ctx)?;
    out.write_bytes(r.slice(start, r.position())?);

    Ok(())
}

// ----------------------------------------------------------------------
// Secondary -> primary
// ----------------------------------------------------------------------

///
/// SkToPkOp
///

#[derive(Debug)]
enum SkToPkOp {
    Skip { field: usize, handler: Handler },
    Copy { field: usize, handler: Handler },
    Memorize { field: usize, handler: Handler, slot: usize },
    Replay { slot: usize },
}

///
/// SkToPkMerger
///
/// Rebuilds primary-key bytes from secondary-key bytes. Key fields are
/// copied as original byte ranges, never decoded.
///

#[derive(Debug)]
pub(crate) struct SkToPkMerger {
    ops: Vec<SkToPkOp>,
    slots: usize,
}

impl SkToPkMerger {
    pub(crate) fn new(current: &RelationVersion, sk: &SecondaryKeyDef) -> Result<Self, InternalError> {
        let pk_len = current.primary_key_len();
        let mut ops = Vec::new();
        let mut memorized: HashMap<usize, usize> = HashMap::new();
        let mut slots = 0;
        let mut next_pk = 0;

        for (field, field_ref) in sk.fields.iter().enumerate() {
            if next_pk == pk_len {
                break;
            }
            let handler = current
                .referenced_field(field_ref)
                .map(|def| Arc::clone(&def.handler))
                .ok_or_else(|| lost_field(sk))?;

            match field_ref {
                FieldRef::Primary(ordinal) if *ordinal == next_pk => {
                    ops.push(SkToPkOp::Copy { field, handler });
                    next_pk += 1;
                    while let Some(slot) = memorized.remove(&next_pk) {
                        ops.push(SkToPkOp::Replay { slot });
                        next_pk += 1;
                    }
                }
                FieldRef::Primary(ordinal) => {
                    memorized.insert(*ordinal, slots);
                    ops.push(SkToPkOp::Memorize {
                        field,
                        handler,
                        slot: slots,
                    });
                    slots += 1;
                }
                FieldRef::Value(_) => ops.push(SkToPkOp::Skip { field, handler }),
            }
        }

        if next_pk != pk_len {
            return Err(InternalError::store_invariant(format!(
                "index {sk} does not cover the primary key"
            )));
        }

        Ok(Self { ops, slots })
    }

    /// Append the primary-key fields to `out`. The first `params` index
    /// fields are read from `first`, the remaining ones from `second`.
    pub(crate) fn merge(
        &self,
        first: &[u8],
        params: usize,
        second: &[u8],
        out: &mut ByteWriter,
    ) -> Result<(), InternalError> {
        let buffers = [first, second];
        let mut readers = [ByteReader::new(first), ByteReader::new(second)];
        let mut ctx = ReadCtx::default();
        let mut slots: Vec<Option<(usize, usize, usize)>> = vec![None; self.slots];

        for op in &self.ops {
            match op {
                SkToPkOp::Skip { field, handler } => {
                    let r = &mut readers[usize::from(*field >= params)];
                    handler.skip(r, &mut ctx)?;
                }
                SkToPkOp::Copy { field, handler } => {
                    let r = &mut readers[usize::from(*field >= params)];
                    copy_field(handler, r, &mut ctx, out)?;
                }
                SkToPkOp::Memorize {
                    field,
                    handler,
                    slot,
                } => {
                    let buffer = usize::from(*field >= params);
                    let r = &mut readers[buffer];
                    let start = r.position();
                    handler.skip(r, &mut ctx)?;
                    slots[*slot] = Some((buffer, start, r.position()));
                }
                SkToPkOp::Replay { slot } => {
                    let (buffer, start, end) = slots[*slot]
                        .ok_or_else(|| InternalError::store_invariant("replayed an empty slot"))?;
                    let bytes = buffers[buffer]
                        .get(start..end)
                        .ok_or_else(|| InternalError::store_invariant("memorized range out of bounds"))?;
                    out.write_bytes(bytes);
                }
            }
        }

        Ok(())
    }
}
