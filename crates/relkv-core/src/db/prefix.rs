//! Global key-space partitions.
//!
//! Every engine key starts with one of these tags; relation keys continue
//! with the relation id as a `VUInt`, secondary keys with the index id too.

use crate::codec::ByteWriter;

pub const LAST_COLLECTION_ID: &[u8] = &[0, 3];
pub const RELATION_NAMES: &[u8] = &[0, 4];
pub const RELATION_VERSIONS: &[u8] = &[0, 5];

/// Reserved for free-standing object graphs; never written by relations.
pub const OBJECTS: &[u8] = &[1];
pub const COLLECTIONS: &[u8] = &[2];
pub const PRIMARY: &[u8] = &[3];
pub const SECONDARY: &[u8] = &[4];

#[must_use]
pub(crate) fn versions(relation: u64) -> Vec<u8> {
    let mut w = ByteWriter::with_prefix(RELATION_VERSIONS);
    w.write_vuint(relation);
    w.into_bytes()
}

#[must_use]
pub(crate) fn version_key(relation: u64, version: u32) -> Vec<u8> {
    let mut w = ByteWriter::with_prefix(&versions(relation));
    w.write_vuint(u64::from(version));
    w.into_bytes()
}

#[must_use]
pub(crate) fn primary(relation: u64) -> Vec<u8> {
    let mut w = ByteWriter::with_prefix(PRIMARY);
    w.write_vuint(relation);
    w.into_bytes()
}

#[must_use]
pub(crate) fn secondary(relation: u64, index: u32) -> Vec<u8> {
    let mut w = ByteWriter::with_prefix(SECONDARY);
    w.write_vuint(relation);
    w.write_vuint(u64::from(index));
    w.into_bytes()
}

#[must_use]
pub(crate) fn collection(id: u64) -> Vec<u8> {
    let mut w = ByteWriter::with_prefix(COLLECTIONS);
    w.write_vuint(id);
    w.into_bytes()
}

/// Smallest byte string greater than every string starting with `prefix`,
/// or `None` when no such string exists.
#[must_use]
pub(crate) fn successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut out = prefix.to_vec();
    while let Some(last) = out.pop() {
        if last < 0xFF {
            out.push(last + 1);
            return Some(out);
        }
    }

    None
}

///
/// TESTS
///
