//! Order-preserving byte encodings for key-capable scalars.

use crate::codec::{ByteReader, CodecError};

const SIGN_BIT: u64 = 0x8000_0000_0000_0000;

/// Escape embedded zero bytes and terminate with `00 00` so byte order
/// matches the order of the original byte strings.
pub(crate) fn push_terminated_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    for &byte in bytes {
        if byte == 0 {
            out.extend_from_slice(&[0, 0xFF]);
        } else {
            out.push(byte);
        }
    }

    out.extend_from_slice(&[0, 0]);
}

pub(crate) fn read_terminated_bytes(r: &mut ByteReader<'_>) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    loop {
        match r.read_u8()? {
            0 => match r.read_u8()? {
                0 => return Ok(out),
                0xFF => out.push(0),
                other => {
                    return Err(CodecError::corrupt(format!(
                        "invalid escape byte 0x{other:02x} in terminated bytes"
                    )));
                }
            },
            byte => out.push(byte),
        }
    }
}

pub(crate) fn skip_terminated_bytes(r: &mut ByteReader<'_>) -> Result<(), CodecError> {
    loop {
        if r.read_u8()? == 0 && r.read_u8()? == 0 {
            return Ok(());
        }
    }
}

pub(crate) const fn ordered_f64_bytes(value: f64) -> [u8; 8] {
    let bits = value.to_bits();
    let ordered = if bits & SIGN_BIT == 0 {
        bits ^ SIGN_BIT
    } else {
        !bits
    };

    ordered.to_be_bytes()
}

pub(crate) const fn f64_from_ordered_bytes(bytes: [u8; 8]) -> f64 {
    let ordered = u64::from_be_bytes(bytes);
    let bits = if ordered & SIGN_BIT == 0 {
        !ordered
    } else {
        ordered ^ SIGN_BIT
    };

    f64::from_bits(bits)
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn terminated(bytes: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        push_terminated_bytes(&mut out, bytes);
        out
    }

    #[test]
    fn zero_bytes_are_escaped() {
        assert_eq!(terminated(b"a\0b"), vec![b'a', 0, 0xFF, b'b', 0, 0]);
        assert_eq!(terminated(b""), vec![0, 0]);
    }

    #[test]
    fn bad_escape_is_corruption() {
        let bytes = [b'a', 0, 0x10];
        let err = read_terminated_bytes(&mut ByteReader::new(&bytes)).expect_err("must fail");

        assert!(matches!(err, CodecError::Corrupt(_)));
    }

    #[test]
    fn float_ordering_spans_sign_boundary() {
        let values = [f64::NEG_INFINITY, -2.5, -0.0, 0.0, 1.0e-9, 3.0, f64::INFINITY];
        let encoded: Vec<_> = values.iter().map(|v| ordered_f64_bytes(*v)).collect();

        assert!(encoded.windows(2).all(|w| w[0] < w[1]));
        for (value, bytes) in values.iter().zip(encoded) {
            assert_eq!(f64_from_ordered_bytes(bytes).to_bits(), value.to_bits());
        }
    }

    proptest! {
        #[test]
        fn terminated_bytes_sort_and_decode(
            a in proptest::collection::vec(any::<u8>(), 0..24),
            b in proptest::collection::vec(any::<u8>(), 0..24),
        ) {
            let (ea, eb) = (terminated(&a), terminated(&b));

            prop_assert_eq!(a.cmp(&b), ea.cmp(&eb));

            let mut r = ByteReader::new(&ea);
            prop_assert_eq!(read_terminated_bytes(&mut r).unwrap(), a);
            prop_assert!(r.is_empty());

            let mut r = ByteReader::new(&eb);
            skip_terminated_bytes(&mut r).unwrap();
            prop_assert!(r.is_empty());
        }
    }
}
