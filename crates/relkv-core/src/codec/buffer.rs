use crate::codec::{
    CodecError,
    varint::{read_vint, read_vuint, vint_len, vuint_len, write_vint, write_vuint},
};
use derive_more::{Deref, DerefMut};

///
/// ByteWriter
///
/// Append-only output buffer for field encodings.
///

#[derive(Clone, Debug, Default, Deref, DerefMut, Eq, PartialEq)]
pub struct ByteWriter(Vec<u8>);

impl ByteWriter {
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    #[must_use]
    pub fn with_prefix(prefix: &[u8]) -> Self {
        Self(prefix.to_vec())
    }

    pub fn write_u8(&mut self, byte: u8) {
        self.0.push(byte);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.0.extend_from_slice(bytes);
    }

    pub fn write_vuint(&mut self, value: u64) {
        write_vuint(&mut self.0, value);
    }

    pub fn write_vint(&mut self, value: i64) {
        write_vint(&mut self.0, value);
    }

    /// Length-prefixed UTF-8; used by descriptors, never by orderable keys.
    pub fn write_str(&mut self, value: &str) {
        self.write_vuint(value.len() as u64);
        self.write_bytes(value.as_bytes());
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

///
/// ByteReader
///
/// Forward cursor over an encoded buffer. Positions can be memorized and
/// restored, and raw ranges extracted for verbatim copies.
///

#[derive(Clone, Copy, Debug)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    #[must_use]
    pub const fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Restore a position previously returned by [`Self::position`].
    pub fn set_position(&mut self, pos: usize) -> Result<(), CodecError> {
        if pos > self.buf.len() {
            return Err(CodecError::UnexpectedEof {
                needed: pos,
                remaining: self.buf.len(),
            });
        }
        self.pos = pos;

        Ok(())
    }

    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Raw bytes between two positions of this reader.
    pub fn slice(&self, start: usize, end: usize) -> Result<&'a [u8], CodecError> {
        self.buf
            .get(start..end)
            .ok_or_else(|| CodecError::corrupt(format!("invalid range {start}..{end}")))
    }

    /// Everything not yet consumed.
    #[must_use]
    pub fn rest(&self) -> &'a [u8] {
        let buf: &'a [u8] = self.buf;
        &buf[self.pos..]
    }

    fn ensure(&self, needed: usize) -> Result<(), CodecError> {
        if self.remaining() < needed {
            return Err(CodecError::UnexpectedEof {
                needed,
                remaining: self.remaining(),
            });
        }

        Ok(())
    }

    pub fn peek_u8(&self) -> Result<u8, CodecError> {
        self.ensure(1)?;

        Ok(self.buf[self.pos])
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        let byte = self.peek_u8()?;
        self.pos += 1;

        Ok(byte)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        self.ensure(len)?;
        let buf: &'a [u8] = self.buf;
        let bytes = &buf[self.pos..self.pos + len];
        self.pos += len;

        Ok(bytes)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let bytes = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);

        Ok(out)
    }

    pub fn skip(&mut self, len: usize) -> Result<(), CodecError> {
        self.read_bytes(len).map(|_| ())
    }

    pub fn read_vuint(&mut self) -> Result<u64, CodecError> {
        let (value, len) = read_vuint(self.rest())?;
        self.pos += len;

        Ok(value)
    }

    pub fn skip_vuint(&mut self) -> Result<(), CodecError> {
        let len = vuint_len(self.peek_u8()?);
        self.skip(len)
    }

    pub fn read_vint(&mut self) -> Result<i64, CodecError> {
        let (value, len) = read_vint(self.rest())?;
        self.pos += len;

        Ok(value)
    }

    pub fn skip_vint(&mut self) -> Result<(), CodecError> {
        let len = vint_len(self.peek_u8()?);
        self.skip(len)
    }

    /// Read a `VUInt` that must fit a `u32`.
    pub fn read_vuint_u32(&mut self) -> Result<u32, CodecError> {
        let value = self.read_vuint()?;

        u32::try_from(value).map_err(|_| CodecError::corrupt(format!("{value} exceeds u32")))
    }

    /// Read a `VUInt` length and check it against the bytes left.
    pub fn read_len(&mut self) -> Result<usize, CodecError> {
        let len = self.read_vuint()?;
        let len = usize::try_from(len).map_err(|_| CodecError::corrupt("length overflow"))?;
        self.ensure(len)?;

        Ok(len)
    }

    pub fn read_str(&mut self) -> Result<&'a str, CodecError> {
        let len = self.read_len()?;
        let bytes = self.read_bytes(len)?;

        std::str::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)
    }
}

///
/// TESTS
///
