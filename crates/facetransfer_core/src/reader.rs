use crate::error::{CoreError, Result};
use crate::primitives::{
    decode_bytes, decode_f32, decode_u8, decode_u16, decode_u32, decode_u64, decode_vsval,
    decode_wstring, encode_f32, encode_u16, encode_u32, encode_u64, encode_wstring,
};

/// Little-endian cursor over a borrowed buffer.
///
/// The cursor only ever moves forward through `read_*`; the buffer itself is
/// never mutated.
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn at(buf: &'a [u8], pos: usize) -> Self {
        Self { buf, pos }
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let (v, n) = decode_u8(self.buf, self.pos)?;
        self.pos += n;
        Ok(v)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let (v, n) = decode_u16(self.buf, self.pos)?;
        self.pos += n;
        Ok(v)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let (v, n) = decode_u32(self.buf, self.pos)?;
        self.pos += n;
        Ok(v)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let (v, n) = decode_u64(self.buf, self.pos)?;
        self.pos += n;
        Ok(v)
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        let (v, n) = decode_f32(self.buf, self.pos)?;
        self.pos += n;
        Ok(v)
    }

    pub fn read_u32_vec(&mut self, n: usize) -> Result<Vec<u32>> {
        // Bound the allocation by what the buffer can actually hold.
        decode_bytes(self.buf, self.pos, n.saturating_mul(4))?;
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(self.read_u32()?);
        }
        Ok(out)
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        let (bytes, len) = decode_bytes(self.buf, self.pos, n)?;
        self.pos += len;
        Ok(bytes)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    /// Reads everything between the cursor and the absolute offset `end`.
    pub fn read_until(&mut self, end: usize, table: &'static str) -> Result<&'a [u8]> {
        if end < self.pos {
            return Err(CoreError::OffsetMismatch {
                table,
                expected: self.pos,
                actual: end,
            });
        }
        self.read_bytes(end - self.pos)
    }

    pub fn read_wstring(&mut self) -> Result<String> {
        let (v, n) = decode_wstring(self.buf, self.pos)?;
        self.pos += n;
        Ok(v)
    }

    /// Returns the value and the width it was stored in.
    pub fn read_vsval(&mut self) -> Result<(u32, usize)> {
        let (v, n) = decode_vsval(self.buf, self.pos)?;
        self.pos += n;
        Ok((v, n))
    }

    pub fn read_rest(&mut self) -> &'a [u8] {
        let rest = &self.buf[self.pos.min(self.buf.len())..];
        self.pos = self.buf.len();
        rest
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }
}

/// Output mirror of [`ByteReader`].
#[derive(Debug, Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn put_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&encode_u16(v));
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&encode_u32(v));
    }

    pub fn put_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&encode_u64(v));
    }

    pub fn put_f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&encode_f32(v));
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn put_wstring(&mut self, text: &str) -> Result<()> {
        self.buf.extend_from_slice(&encode_wstring(text)?);
        Ok(())
    }

    /// Writes `len` as a u32, failing if it does not fit.
    pub fn put_len_u32(&mut self, len: usize, what: &str) -> Result<()> {
        let v = u32::try_from(len).map_err(|_| {
            CoreError::corrupt(self.buf.len(), format!("{what} length {len} exceeds u32"))
        })?;
        self.put_u32(v);
        Ok(())
    }

    pub fn position(&self) -> usize {
        self.buf.len()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreErrorCode;

    #[test]
    fn reader_advances_through_mixed_fields() {
        let mut w = ByteWriter::new();
        w.put_u8(7);
        w.put_u16(0x1234);
        w.put_wstring("Whiterun").unwrap();
        w.put_u32(99);
        let bytes = w.into_inner();

        let mut r = ByteReader::new(&bytes);
        assert_eq!(r.read_u8().unwrap(), 7);
        assert_eq!(r.read_u16().unwrap(), 0x1234);
        assert_eq!(r.read_wstring().unwrap(), "Whiterun");
        assert_eq!(r.read_u32().unwrap(), 99);
        assert!(r.is_empty());
    }

    #[test]
    fn read_until_rejects_backwards_offset() {
        let bytes = [0u8; 8];
        let mut r = ByteReader::at(&bytes, 6);
        let err = r.read_until(4, "table").unwrap_err();
        assert_eq!(err.code(), CoreErrorCode::OffsetMismatch);
    }

    #[test]
    fn oversized_u32_vec_fails_before_allocating() {
        let bytes = [0u8; 8];
        let mut r = ByteReader::new(&bytes);
        let err = r.read_u32_vec(usize::MAX / 2).unwrap_err();
        assert_eq!(err.code(), CoreErrorCode::UnexpectedEof);
    }
}
