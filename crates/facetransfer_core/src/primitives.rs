//! Fixed-width integers, windows-1252 wstrings and vsvals.
//!
//! Every decoder takes the whole buffer plus an absolute offset and returns
//! `(value, bytes_consumed)`. Every encoder is the exact inverse.

use encoding_rs::WINDOWS_1252;

use crate::error::{CoreError, Result};

const VSVAL_U8: u8 = 0b00;
const VSVAL_U16: u8 = 0b01;
const VSVAL_NARROW_MAX: u32 = 0x3F;
const VSVAL_WIDE_MAX: u32 = 0x3FFF;

/// Borrows `len` bytes at `offset`, or fails with `UnexpectedEof`.
pub fn decode_bytes(buf: &[u8], offset: usize, len: usize) -> Result<(&[u8], usize)> {
    let available = buf.len().saturating_sub(offset);
    if len > available {
        return Err(CoreError::UnexpectedEof {
            offset,
            needed: len,
            available,
        });
    }
    Ok((&buf[offset..offset + len], len))
}

fn decode_array<const N: usize>(buf: &[u8], offset: usize) -> Result<[u8; N]> {
    let (bytes, _) = decode_bytes(buf, offset, N)?;
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    Ok(out)
}

pub fn decode_u8(buf: &[u8], offset: usize) -> Result<(u8, usize)> {
    Ok((decode_array::<1>(buf, offset)?[0], 1))
}

pub fn decode_u16(buf: &[u8], offset: usize) -> Result<(u16, usize)> {
    Ok((u16::from_le_bytes(decode_array(buf, offset)?), 2))
}

pub fn decode_u32(buf: &[u8], offset: usize) -> Result<(u32, usize)> {
    Ok((u32::from_le_bytes(decode_array(buf, offset)?), 4))
}

pub fn decode_u64(buf: &[u8], offset: usize) -> Result<(u64, usize)> {
    Ok((u64::from_le_bytes(decode_array(buf, offset)?), 8))
}

/// Floats are carried bit-exact; NaN payloads survive a round trip.
pub fn decode_f32(buf: &[u8], offset: usize) -> Result<(f32, usize)> {
    let (bits, n) = decode_u32(buf, offset)?;
    Ok((f32::from_bits(bits), n))
}

pub fn encode_u8(value: u8) -> [u8; 1] {
    [value]
}

pub fn encode_u16(value: u16) -> [u8; 2] {
    value.to_le_bytes()
}

pub fn encode_u32(value: u32) -> [u8; 4] {
    value.to_le_bytes()
}

pub fn encode_u64(value: u64) -> [u8; 8] {
    value.to_le_bytes()
}

pub fn encode_f32(value: f32) -> [u8; 4] {
    value.to_bits().to_le_bytes()
}

/// A u16 length prefix followed by that many windows-1252 bytes.
pub fn decode_wstring(buf: &[u8], offset: usize) -> Result<(String, usize)> {
    let (len, prefix) = decode_u16(buf, offset)?;
    let (raw, body) = decode_bytes(buf, offset + prefix, len as usize)?;
    let (text, _) = WINDOWS_1252.decode_without_bom_handling(raw);
    Ok((text.into_owned(), prefix + body))
}

/// The prefix counts encoded bytes, not characters.
pub fn encode_wstring(text: &str) -> Result<Vec<u8>> {
    let (raw, _, unmappable) = WINDOWS_1252.encode(text);
    if unmappable {
        return Err(CoreError::corrupt(
            0,
            format!("{text:?} is not representable in windows-1252"),
        ));
    }
    let len = u16::try_from(raw.len()).map_err(|_| {
        CoreError::corrupt(0, format!("wstring of {} bytes exceeds u16 prefix", raw.len()))
    })?;
    let mut out = Vec::with_capacity(2 + raw.len());
    out.extend_from_slice(&encode_u16(len));
    out.extend_from_slice(&raw);
    Ok(out)
}

/// The two low bits of the first byte select the width; the value is the
/// little-endian integer shifted right by two.
pub fn decode_vsval(buf: &[u8], offset: usize) -> Result<(u32, usize)> {
    let (first, _) = decode_u8(buf, offset)?;
    match first & 0b11 {
        VSVAL_U8 => Ok(((first >> 2) as u32, 1)),
        VSVAL_U16 => {
            let (raw, n) = decode_u16(buf, offset)?;
            Ok(((raw >> 2) as u32, n))
        }
        _ => Err(CoreError::InvalidVsval { offset }),
    }
}

/// Shortest encoding of `value`.
pub fn encode_vsval(value: u32) -> Result<Vec<u8>> {
    let width = if value <= VSVAL_NARROW_MAX { 1 } else { 2 };
    encode_vsval_width(value, width)
}

/// Encodes `value` in exactly `width` bytes, reproducing a non-minimal
/// encoding observed on decode.
pub fn encode_vsval_width(value: u32, width: usize) -> Result<Vec<u8>> {
    match width {
        1 if value <= VSVAL_NARROW_MAX => Ok(vec![(value as u8) << 2 | VSVAL_U8]),
        2 if value <= VSVAL_WIDE_MAX => {
            let raw = (value as u16) << 2 | VSVAL_U16 as u16;
            Ok(encode_u16(raw).to_vec())
        }
        _ => Err(CoreError::InvalidVsval { offset: 0 }),
    }
}
