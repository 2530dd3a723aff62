//! The changeform table: a run of self-delimiting records, each optionally
//! zlib-compressed.
//!
//! Record layout:
//!
//! ```text
//! ref id        3 bytes
//! change flags  u32
//! type          u8   top 2 bits: length class, low 6 bits: form type
//! version       u8
//! length1       u8/u16/u32   stored payload length
//! length2       u8/u16/u32   uncompressed length, 0 when stored raw
//! data          length1 bytes
//! ```

use std::fmt;
use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use log::{debug, warn};
use serde::Serialize;

use crate::error::{CoreError, Result};
use crate::layout::ByteRange;
use crate::reader::{ByteReader, ByteWriter};
use crate::refid::{REFID_LEN, RefId};

/// Form type of an NPC_ (actor base) changeform.
pub const NPC_FORM_TYPE: u8 = 9;

/// A 32-bit change-flags mask; bit 0 is the least significant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct ChangeFlags(pub u32);

impl ChangeFlags {
    pub fn bit(&self, n: u8) -> bool {
        n < 32 && self.0 & (1 << n) != 0
    }

    pub fn with(self, n: u8, on: bool) -> Self {
        let mask = 1u32 << n;
        if on {
            Self(self.0 | mask)
        } else {
            Self(self.0 & !mask)
        }
    }

    /// Positions of the set bits, lowest first.
    pub fn bits(&self) -> Vec<u8> {
        (0..32).filter(|&n| self.bit(n)).collect()
    }
}

impl fmt::Display for ChangeFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bits: Vec<String> = self.bits().iter().map(u8::to_string).collect();
        write!(f, "{:#010x} [{}]", self.0, bits.join(","))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LengthClass {
    U8,
    U16,
    U32,
}

impl LengthClass {
    fn from_type_byte(raw: u8, offset: usize) -> Result<Self> {
        match raw >> 6 {
            0 => Ok(Self::U8),
            1 => Ok(Self::U16),
            2 => Ok(Self::U32),
            _ => Err(CoreError::InvalidLengthClass { offset }),
        }
    }

    /// Smallest class that holds `len`.
    pub fn fitting(len: u32) -> Self {
        if len <= 0xFF {
            Self::U8
        } else if len <= 0xFFFF {
            Self::U16
        } else {
            Self::U32
        }
    }

    pub fn width(&self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }

    fn bits(&self) -> u8 {
        match self {
            Self::U8 => 0,
            Self::U16 => 1,
            Self::U32 => 2,
        }
    }

    fn read(&self, r: &mut ByteReader<'_>) -> Result<u32> {
        match self {
            Self::U8 => r.read_u8().map(u32::from),
            Self::U16 => r.read_u16().map(u32::from),
            Self::U32 => r.read_u32(),
        }
    }

    fn write(&self, w: &mut ByteWriter, value: u32) {
        match self {
            Self::U8 => w.put_u8(value as u8),
            Self::U16 => w.put_u16(value as u16),
            Self::U32 => w.put_u32(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeForm {
    pub ref_id: RefId,
    pub flags: ChangeFlags,
    pub form_type: u8,
    pub version: u8,
    /// Payload exactly as stored (compressed when `uncompressed_len != 0`).
    data: Vec<u8>,
    uncompressed_len: u32,
}

impl ChangeForm {
    pub fn new_uncompressed(
        ref_id: RefId,
        flags: ChangeFlags,
        form_type: u8,
        version: u8,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            ref_id,
            flags,
            form_type,
            version,
            data: payload,
            uncompressed_len: 0,
        }
    }

    pub fn new_compressed(
        ref_id: RefId,
        flags: ChangeFlags,
        form_type: u8,
        version: u8,
        payload: &[u8],
    ) -> Result<Self> {
        let mut form = Self {
            ref_id,
            flags,
            form_type,
            version,
            data: Vec::new(),
            uncompressed_len: 1,
        };
        form.set_payload(payload)?;
        Ok(form)
    }

    pub fn decode(buf: &[u8], offset: usize) -> Result<(Self, usize)> {
        let mut r = ByteReader::at(buf, offset);
        let ref_bytes = r.read_array::<3>().map_err(|e| e.in_field("changeform ref id"))?;
        let ref_id = RefId::from_bytes(ref_bytes, offset)?;
        let flags = ChangeFlags(r.read_u32().map_err(|e| e.in_field("changeform flags"))?);

        let type_offset = r.position();
        let type_byte = r.read_u8().map_err(|e| e.in_field("changeform type"))?;
        let class = LengthClass::from_type_byte(type_byte, type_offset)?;
        let version = r.read_u8().map_err(|e| e.in_field("changeform version"))?;

        let stored_len = class.read(&mut r).map_err(|e| e.in_field("changeform length1"))?;
        let uncompressed_len = class.read(&mut r).map_err(|e| e.in_field("changeform length2"))?;
        let data = r
            .read_bytes(stored_len as usize)
            .map_err(|e| e.in_field("changeform data"))?
            .to_vec();

        let form = Self {
            ref_id,
            flags,
            form_type: type_byte & 0x3F,
            version,
            data,
            uncompressed_len,
        };
        Ok((form, r.position() - offset))
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let stored_len = u32::try_from(self.data.len()).map_err(|_| {
            CoreError::corrupt(0, format!("changeform payload of {} bytes", self.data.len()))
        })?;
        let class = LengthClass::fitting(stored_len.max(self.uncompressed_len));
        debug_assert!(self.form_type <= 0x3F, "form type overflows six bits");

        let mut w = ByteWriter::with_capacity(self.data.len() + 16);
        w.put_bytes(&self.ref_id.to_bytes());
        w.put_u32(self.flags.0);
        w.put_u8(class.bits() << 6 | self.form_type);
        w.put_u8(self.version);
        class.write(&mut w, stored_len);
        class.write(&mut w, self.uncompressed_len);
        w.put_bytes(&self.data);
        Ok(w.into_inner())
    }

    pub fn is_compressed(&self) -> bool {
        self.uncompressed_len != 0
    }

    /// Bytes ahead of the stored payload when this record is encoded.
    pub fn header_len(&self) -> usize {
        REFID_LEN + 4 + 2 + 2 * self.length_class().width()
    }

    pub fn stored_len(&self) -> usize {
        self.data.len()
    }

    pub fn uncompressed_len(&self) -> u32 {
        self.uncompressed_len
    }

    /// Width class this record would be written with.
    pub fn length_class(&self) -> LengthClass {
        LengthClass::fitting((self.data.len() as u32).max(self.uncompressed_len))
    }

    /// The record body, inflated if it was stored compressed.
    pub fn payload(&self) -> Result<Vec<u8>> {
        if !self.is_compressed() {
            return Ok(self.data.clone());
        }
        let expected = self.uncompressed_len as usize;
        let mut out = Vec::with_capacity(expected);
        ZlibDecoder::new(self.data.as_slice())
            .read_to_end(&mut out)
            .map_err(|e| CoreError::corrupt(0, format!("zlib decode failed: {e}")))?;
        if out.len() != expected {
            return Err(CoreError::corrupt(
                0,
                format!(
                    "decompressed size mismatch: expected {expected}, got {}",
                    out.len()
                ),
            ));
        }
        Ok(out)
    }

    /// Replaces the body. Records that were stored compressed are
    /// recompressed; raw records stay raw.
    pub fn set_payload(&mut self, payload: &[u8]) -> Result<()> {
        if !self.is_compressed() {
            self.data = payload.to_vec();
            return Ok(());
        }
        let uncompressed_len = u32::try_from(payload.len())
            .map_err(|_| CoreError::corrupt(0, "payload exceeds u32 length"))?;
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(payload)?;
        self.data = encoder.finish()?;
        // An empty payload cannot be flagged compressed; the zero length
        // would read back as "stored raw".
        if uncompressed_len == 0 {
            self.data.clear();
        }
        self.uncompressed_len = uncompressed_len;
        Ok(())
    }
}

/// A record together with where it sits inside the changeform region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedChangeForm {
    pub range: ByteRange,
    pub record: ChangeForm,
}

/// Walks exactly `count` records from the start of a changeform region.
pub struct ChangeFormIter<'a> {
    region: &'a [u8],
    pos: usize,
    remaining: u32,
}

impl<'a> ChangeFormIter<'a> {
    pub fn new(region: &'a [u8], count: u32) -> Self {
        Self {
            region,
            pos: 0,
            remaining: count,
        }
    }
}

impl Iterator for ChangeFormIter<'_> {
    type Item = Result<LocatedChangeForm>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        match ChangeForm::decode(self.region, self.pos) {
            Ok((record, len)) => {
                let range = ByteRange {
                    start: self.pos,
                    end: self.pos + len,
                };
                self.pos = range.end;
                Some(Ok(LocatedChangeForm { range, record }))
            }
            Err(e) => {
                self.remaining = 0;
                Some(Err(e))
            }
        }
    }
}

/// First record among the first `count` that satisfies `predicate`.
pub fn find_record(
    region: &[u8],
    count: u32,
    mut predicate: impl FnMut(&ChangeForm) -> bool,
) -> Result<Option<LocatedChangeForm>> {
    for item in ChangeFormIter::new(region, count) {
        let located = item?;
        if predicate(&located.record) {
            debug!(
                "matched changeform {} type {} at region offset {}",
                located.record.ref_id, located.record.form_type, located.range.start
            );
            return Ok(Some(located));
        }
    }
    Ok(None)
}

/// Finds the record whose resolved form id and form type both match.
pub fn find_form(
    region: &[u8],
    count: u32,
    form_ids: &[u32],
    form_id: u32,
    form_type: u8,
) -> Result<Option<LocatedChangeForm>> {
    find_record(region, count, |cf| {
        if cf.form_type != form_type {
            return false;
        }
        match cf.ref_id.form_id(form_ids) {
            Ok(id) => id == form_id,
            Err(e) => {
                warn!("skipping changeform with unresolvable ref {}: {e}", cf.ref_id);
                false
            }
        }
    })
}

/// The player's NPC_ record: main-game form 7, form type 9.
pub fn find_player(
    region: &[u8],
    count: u32,
    form_ids: &[u32],
) -> Result<Option<LocatedChangeForm>> {
    let id = RefId::PLAYER_BASE.form_id(form_ids)?;
    find_form(region, count, form_ids, id, NPC_FORM_TYPE)
}

/// Rebuilds the region with the record at `range` replaced; all other bytes
/// are copied through untouched.
pub fn splice_record(region: &[u8], range: ByteRange, record: &ChangeForm) -> Result<Vec<u8>> {
    if range.end > region.len() || range.start > range.end {
        return Err(CoreError::OffsetMismatch {
            table: "changeform splice",
            expected: region.len(),
            actual: range.end,
        });
    }
    let encoded = record.encode()?;
    let mut out = Vec::with_capacity(region.len() - range.len() + encoded.len());
    out.extend_from_slice(&region[..range.start]);
    out.extend_from_slice(&encoded);
    out.extend_from_slice(&region[range.end..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreErrorCode;

    fn zlib(bytes: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(bytes).expect("zlib encode should write");
        encoder.finish().expect("zlib encode should finish")
    }

    #[test]
    fn flags_bits_are_lsb_first() {
        let flags = ChangeFlags(0b1000_0000_0010);
        assert!(flags.bit(1));
        assert!(flags.bit(11));
        assert!(!flags.bit(0));
        assert_eq!(flags.bits(), vec![1, 11]);
        assert_eq!(flags.with(11, false).with(24, true).bits(), vec![1, 24]);
    }

    #[test]
    fn sixteen_bit_class_reads_two_u16_lengths() {
        let mut raw = vec![0x40, 0x00, 0x07];
        raw.extend_from_slice(&0x0000_0802u32.to_le_bytes());
        raw.push(0b01_001001);
        raw.push(74);
        raw.extend_from_slice(&3u16.to_le_bytes());
        raw.extend_from_slice(&0u16.to_le_bytes());
        raw.extend_from_slice(&[9, 8, 7]);

        let (cf, len) = ChangeForm::decode(&raw, 0).unwrap();
        assert_eq!(len, raw.len());
        assert_eq!(cf.ref_id, RefId::MainGame(7));
        assert_eq!(cf.form_type, 9);
        assert_eq!(cf.version, 74);
        assert_eq!(cf.payload().unwrap(), vec![9, 8, 7]);
        assert!(!cf.is_compressed());
    }

    #[test]
    fn length_class_three_is_invalid() {
        let raw = [0x40, 0x00, 0x07, 0, 0, 0, 0, 0b11_001001, 74, 0, 0];
        let err = ChangeForm::decode(&raw, 0).unwrap_err();
        assert_eq!(err.code(), CoreErrorCode::InvalidLengthClass);
    }

    #[test]
    fn truncated_data_names_the_field() {
        let raw = [0x40, 0x00, 0x07, 0, 0, 0, 0, 0x09, 74, 10, 0, 1, 2];
        let err = ChangeForm::decode(&raw, 0).unwrap_err();
        assert!(matches!(
            err,
            CoreError::TruncatedRecord {
                field: "changeform data",
                ..
            }
        ));
    }

    #[test]
    fn smallest_class_is_chosen_on_encode() {
        assert_eq!(LengthClass::fitting(0xFF), LengthClass::U8);
        assert_eq!(LengthClass::fitting(0x100), LengthClass::U16);
        assert_eq!(LengthClass::fitting(0xFFFF), LengthClass::U16);
        assert_eq!(LengthClass::fitting(0x1_0000), LengthClass::U32);

        let cf = ChangeForm::new_uncompressed(
            RefId::MainGame(7),
            ChangeFlags(0),
            9,
            74,
            vec![0; 300],
        );
        let encoded = cf.encode().unwrap();
        assert_eq!(encoded[7] >> 6, 1);
        assert_eq!(encoded.len(), 3 + 4 + 1 + 1 + 2 + 2 + 300);
    }

    #[test]
    fn compressed_record_round_trips_byte_for_byte() {
        let body: Vec<u8> = (0..600u32).map(|i| (i % 7) as u8).collect();
        let packed = zlib(&body);
        let mut raw = vec![0x40, 0x00, 0x07];
        raw.extend_from_slice(&0x0200_0802u32.to_le_bytes());
        raw.push(0b01_001001);
        raw.push(74);
        raw.extend_from_slice(&(packed.len() as u16).to_le_bytes());
        raw.extend_from_slice(&(body.len() as u16).to_le_bytes());
        raw.extend_from_slice(&packed);

        let (cf, _) = ChangeForm::decode(&raw, 0).unwrap();
        assert!(cf.is_compressed());
        assert_eq!(cf.payload().unwrap(), body);
        assert_eq!(cf.encode().unwrap(), raw);
    }

    #[test]
    fn wrong_uncompressed_length_is_corrupt() {
        let packed = zlib(b"abcdef");
        let mut raw = vec![0x40, 0x00, 0x07, 0, 0, 0, 0, 0x09, 74];
        raw.push(packed.len() as u8);
        raw.push(5);
        raw.extend_from_slice(&packed);
        let (cf, _) = ChangeForm::decode(&raw, 0).unwrap();
        assert_eq!(cf.payload().unwrap_err().code(), CoreErrorCode::CorruptPayload);
    }

    #[test]
    fn garbage_compressed_data_is_corrupt() {
        let raw = [0x40, 0x00, 0x07, 0, 0, 0, 0, 0x09, 74, 3, 10, 1, 2, 3];
        let (cf, _) = ChangeForm::decode(&raw, 0).unwrap();
        assert_eq!(cf.payload().unwrap_err().code(), CoreErrorCode::CorruptPayload);
    }

    #[test]
    fn set_payload_keeps_compression_policy() {
        let mut raw_form =
            ChangeForm::new_uncompressed(RefId::MainGame(7), ChangeFlags(0), 9, 74, vec![1]);
        raw_form.set_payload(&[5; 40]).unwrap();
        assert!(!raw_form.is_compressed());
        assert_eq!(raw_form.stored_len(), 40);

        let mut packed =
            ChangeForm::new_compressed(RefId::MainGame(7), ChangeFlags(0), 9, 74, &[1, 2])
                .unwrap();
        packed.set_payload(&[5; 400]).unwrap();
        assert!(packed.is_compressed());
        assert_eq!(packed.uncompressed_len(), 400);
        assert_eq!(packed.payload().unwrap(), vec![5; 400]);
        assert_eq!(packed.length_class(), LengthClass::U16);
    }

    #[test]
    fn find_player_skips_other_records_and_splice_preserves_neighbours() {
        let other =
            ChangeForm::new_uncompressed(RefId::MainGame(0x14), ChangeFlags(2), 1, 74, vec![7; 5]);
        let player =
            ChangeForm::new_compressed(RefId::MainGame(7), ChangeFlags(0x800), 9, 74, &[3; 64])
                .unwrap();
        let tail = ChangeForm::new_uncompressed(RefId::PluginIndexed(1), ChangeFlags(0), 9, 74, vec![]);

        let mut region = other.encode().unwrap();
        let player_start = region.len();
        region.extend(player.encode().unwrap());
        let player_end = region.len();
        region.extend(tail.encode().unwrap());

        let found = find_player(&region, 3, &[0x0000_0007])
            .unwrap()
            .expect("player should be found");
        assert_eq!(found.range.start, player_start);
        assert_eq!(found.range.end, player_end);
        assert_eq!(found.record, player);

        let mut edited = found.record.clone();
        edited.set_payload(&[4; 80]).unwrap();
        let spliced = splice_record(&region, found.range, &edited).unwrap();
        assert_eq!(&spliced[..player_start], &region[..player_start]);
        let tail_len = region.len() - player_end;
        assert_eq!(&spliced[spliced.len() - tail_len..], &region[player_end..]);

        let again = find_player(&spliced, 3, &[0x0000_0007]).unwrap().unwrap();
        assert_eq!(again.record.payload().unwrap(), vec![4; 80]);
    }

    #[test]
    fn count_bounds_the_scan() {
        let other =
            ChangeForm::new_uncompressed(RefId::MainGame(0x14), ChangeFlags(0), 1, 74, vec![]);
        let player = ChangeForm::new_uncompressed(RefId::MainGame(7), ChangeFlags(0), 9, 74, vec![]);
        let mut region = other.encode().unwrap();
        region.extend(player.encode().unwrap());
        assert!(find_player(&region, 1, &[]).unwrap().is_none());
        assert!(find_player(&region, 2, &[]).unwrap().is_some());
    }
}
