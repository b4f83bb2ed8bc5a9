use crate::codec::CodecError;

///
/// ObjectArena
///
/// Ordinals handed out to embedded object instances during one value pass.
/// Instances are numbered densely in the order they are written, so the set
/// of already-seen instances is exactly `1..=instances`.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct ObjectArena {
    instances: u32,
}

///
/// Visit
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Visit {
    New,
    Seen,
}

impl ObjectArena {
    /// Allocate the ordinal for the next inline instance.
    pub const fn assign(&mut self) -> u32 {
        self.instances += 1;
        self.instances
    }

    #[must_use]
    pub const fn contains(&self, ordinal: u32) -> bool {
        ordinal >= 1 && ordinal <= self.instances
    }

    /// Classify a decoded ordinal as a new instance or a back-reference.
    pub fn visit(&mut self, ordinal: u32) -> Result<Visit, CodecError> {
        if self.contains(ordinal) {
            return Ok(Visit::Seen);
        }
        if ordinal == self.instances + 1 {
            self.instances = ordinal;
            return Ok(Visit::New);
        }

        Err(CodecError::corrupt(format!(
            "object ordinal {ordinal} out of sequence (seen {})",
            self.instances
        )))
    }

    #[must_use]
    pub const fn instances(&self) -> u32 {
        self.instances
    }
}

///
/// WriteCtx
///

#[derive(Debug, Default)]
pub struct WriteCtx {
    pub arena: ObjectArena,
}

///
/// ReadCtx
///

#[derive(Debug, Default)]
pub struct ReadCtx {
    pub arena: ObjectArena,
}

///
/// FreeCtx
///
/// Read context plus the nested-collection ids found so far.
///

#[derive(Debug, Default)]
pub struct FreeCtx {
    pub read: ReadCtx,
    pub collections: Vec<u64>,
}

impl FreeCtx {
    #[must_use]
    pub fn into_collections(self) -> Vec<u64> {
        self.collections
    }
}
