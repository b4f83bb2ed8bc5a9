//! Prefix-length varints.
//!
//! The count of leading one bits in the first byte is the count of bytes that
//! follow, so lengths are known from one byte and both encodings sort like
//! the integers they carry.

use crate::codec::CodecError;

// ------------------------------------------------------------------
// Unsigned
// ------------------------------------------------------------------

const fn vuint_extra_bytes(value: u64) -> u32 {
    let mut extra = 0;
    while extra < 8 {
        if value < 1u64 << (7 + 7 * extra) {
            return extra;
        }
        extra += 1;
    }

    8
}

pub(crate) fn write_vuint(out: &mut Vec<u8>, value: u64) {
    let extra = vuint_extra_bytes(value);
    if extra == 8 {
        out.push(0xFF);
        out.extend_from_slice(&value.to_be_bytes());
        return;
    }

    let bytes = value.to_be_bytes();
    let start = 7 - extra as usize;
    let marker = !(0xFFu8 >> extra);
    out.push(marker | bytes[start]);
    out.extend_from_slice(&bytes[start + 1..]);
}

/// Total encoded length announced by the first byte of a `VUInt`.
#[must_use]
pub(crate) const fn vuint_len(first: u8) -> usize {
    first.leading_ones() as usize + 1
}

/// Decode one `VUInt` from the start of `bytes`, returning it with its length.
pub(crate) fn read_vuint(bytes: &[u8]) -> Result<(u64, usize), CodecError> {
    let Some(&first) = bytes.first() else {
        return Err(CodecError::UnexpectedEof {
            needed: 1,
            remaining: 0,
        });
    };

    let len = vuint_len(first);
    if bytes.len() < len {
        return Err(CodecError::UnexpectedEof {
            needed: len,
            remaining: bytes.len(),
        });
    }

    let extra = len - 1;
    let mut value = if extra == 8 {
        0
    } else {
        u64::from(first & (0x7F >> extra))
    };
    for &byte in &bytes[1..len] {
        value = (value << 8) | u64::from(byte);
    }

    Ok((value, len))
}

// ------------------------------------------------------------------
// Signed
// ------------------------------------------------------------------
//
// Bit 7 of the first byte is set for non-negative values. The next bits use
// the unsigned length scheme over seven bits. Negative values store the
// complement of `!value`, which flips both the sign bit and the ordering.

const fn vint_extra_bytes(magnitude: u64) -> u32 {
    let mut extra = 0;
    while extra < 7 {
        if magnitude < 1u64 << (6 + 7 * extra) {
            return extra;
        }
        extra += 1;
    }

    7
}

pub(crate) fn write_vint(out: &mut Vec<u8>, value: i64) {
    let negative = value < 0;
    let magnitude = if negative { !value } else { value }.cast_unsigned();

    let start_len = out.len();
    let extra = vint_extra_bytes(magnitude);
    if extra == 7 {
        out.push(0xFF);
        out.extend_from_slice(&magnitude.to_be_bytes());
    } else {
        let bytes = magnitude.to_be_bytes();
        let start = 7 - extra as usize;
        let marker = 0xFFu8 << (7 - extra);
        out.push(marker | bytes[start]);
        out.extend_from_slice(&bytes[start + 1..]);
    }

    if negative {
        for byte in &mut out[start_len..] {
            *byte = !*byte;
        }
    }
}

/// Total encoded length announced by the first byte of a `VInt`.
#[must_use]
pub(crate) const fn vint_len(first: u8) -> usize {
    let normalized = if first & 0x80 == 0 { !first } else { first };
    let extra = (normalized << 1).leading_ones() as usize;

    if extra == 7 { 9 } else { extra + 1 }
}

/// Decode one `VInt` from the start of `bytes`, returning it with its length.
pub(crate) fn read_vint(bytes: &[u8]) -> Result<(i64, usize), CodecError> {
    let Some(&first) = bytes.first() else {
        return Err(CodecError::UnexpectedEof {
            needed: 1,
            remaining: 0,
        });
    };

    let len = vint_len(first);
    if bytes.len() < len {
        return Err(CodecError::UnexpectedEof {
            needed: len,
            remaining: bytes.len(),
        });
    }

    let negative = first & 0x80 == 0;
    let flip = |byte: u8| if negative { !byte } else { byte };

    let extra = len - 1;
    let mut magnitude = if extra == 8 {
        0
    } else {
        u64::from(flip(first) & (0x3F >> extra))
    };
    for &byte in &bytes[1..len] {
        magnitude = (magnitude << 8) | u64::from(flip(byte));
    }

    if magnitude > i64::MAX.cast_unsigned() {
        return Err(CodecError::corrupt("signed varint magnitude overflow"));
    }
    let magnitude = magnitude.cast_signed();

    Ok((if negative { !magnitude } else { magnitude }, len))
}

///
/// TESTS
///
