//! Flag-gated actor record codec.
//!
//! One driver walks the dialect's descriptor table for decode, and its
//! mirror walks the same table for encode. Fields are keyed, not
//! positional, so a merge can swap one group without touching the rest.

pub mod fields;

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, warn};
use serde::Serialize;

pub use fields::{
    FACE_BIT, FEMALE_BIT, FieldKey, FieldSpec, Gate, LengthRule, facial_keys, fields_for,
};

use crate::changeform::ChangeFlags;
use crate::error::{CoreError, Result};
use crate::game::Game;
use crate::primitives::{encode_vsval, encode_vsval_width};
use crate::reader::{ByteReader, ByteWriter};
use crate::refid::{FormContext, FormRef, REFID_LEN};
use crate::sex::Sex;

const FACTION_ENTRY_LEN: usize = REFID_LEN + 1;
const PACKED_LIST_MAX: usize = 191;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FactionEntry {
    pub faction: FormRef,
    pub rank: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Byte(u8),
    Bytes(Vec<u8>),
    Text(String),
    Ref(FormRef),
    Refs(Vec<FormRef>),
    /// The header byte is kept so lists whose stored byte is not the
    /// canonical one for their length still round-trip.
    PackedRefs { header: u8, refs: Vec<FormRef> },
    Factions(Vec<FactionEntry>),
    /// `count_width` is the width the vsval count was stored in.
    Counted { count_width: usize, data: Vec<u8> },
}

impl FieldValue {
    pub fn refs(&self) -> Vec<&FormRef> {
        match self {
            Self::Ref(r) => vec![r],
            Self::Refs(refs) | Self::PackedRefs { refs, .. } => refs.iter().collect(),
            Self::Factions(entries) => entries.iter().map(|e| &e.faction).collect(),
            Self::Byte(_) | Self::Bytes(_) | Self::Text(_) | Self::Counted { .. } => Vec::new(),
        }
    }

    /// Applies `f` to every embedded reference.
    pub fn try_map_refs(&self, mut f: impl FnMut(&FormRef) -> Result<FormRef>) -> Result<Self> {
        Ok(match self {
            Self::Ref(r) => Self::Ref(f(r)?),
            Self::Refs(refs) => Self::Refs(refs.iter().map(&mut f).collect::<Result<_>>()?),
            Self::PackedRefs { header, refs } => Self::PackedRefs {
                header: *header,
                refs: refs.iter().map(&mut f).collect::<Result<_>>()?,
            },
            Self::Factions(entries) => Self::Factions(
                entries
                    .iter()
                    .map(|e| {
                        Ok(FactionEntry {
                            faction: f(&e.faction)?,
                            rank: e.rank,
                        })
                    })
                    .collect::<Result<_>>()?,
            ),
            other => other.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActorRecord {
    pub game: Game,
    pub fields: BTreeMap<FieldKey, FieldValue>,
    /// Bytes after the last described field, re-emitted verbatim.
    pub tail: Vec<u8>,
}

impl ActorRecord {
    pub fn new(game: Game) -> Self {
        Self {
            game,
            fields: BTreeMap::new(),
            tail: Vec::new(),
        }
    }

    pub fn get(&self, key: FieldKey) -> Option<&FieldValue> {
        self.fields.get(&key)
    }

    pub fn contains(&self, key: FieldKey) -> bool {
        self.fields.contains_key(&key)
    }

    pub fn insert(&mut self, key: FieldKey, value: FieldValue) -> Option<FieldValue> {
        self.fields.insert(key, value)
    }

    pub fn remove(&mut self, key: FieldKey) -> Option<FieldValue> {
        self.fields.remove(&key)
    }

    pub fn has_face(&self) -> bool {
        facial_keys(self.game).any(|k| self.contains(k))
    }

    pub fn name(&self) -> Option<&str> {
        match self.get(FieldKey::Name) {
            Some(FieldValue::Text(name)) => Some(name),
            _ => None,
        }
    }

    pub fn female(&self) -> Option<Sex> {
        match self.get(FieldKey::Female) {
            Some(FieldValue::Byte(raw)) => Some(Sex::from_actor_byte(*raw)),
            _ => None,
        }
    }

    /// Distinct plugins the facial group references, sorted.
    pub fn required_plugins(&self) -> Vec<String> {
        let plugins: BTreeSet<&str> = facial_keys(self.game)
            .filter_map(|k| self.get(k))
            .flat_map(FieldValue::refs)
            .filter_map(|r| r.resolved.plugin.as_deref())
            .collect();
        plugins.into_iter().map(str::to_string).collect()
    }
}

pub fn decode_actor(
    game: Game,
    payload: &[u8],
    flags: ChangeFlags,
    ctx: &FormContext<'_>,
) -> Result<ActorRecord> {
    let mut r = ByteReader::new(payload);
    let mut record = ActorRecord::new(game);

    for spec in fields_for(game) {
        if !spec.gate.is_open(flags) {
            continue;
        }
        let value = decode_field(&mut r, spec, ctx).map_err(|e| e.in_field(spec.key.name()))?;
        record.fields.insert(spec.key, value);
    }

    record.tail = r.read_rest().to_vec();
    if !record.tail.is_empty() {
        warn!(
            "{} undescribed bytes after the last {game} actor field",
            record.tail.len()
        );
    }
    debug!("decoded {} actor fields with flags {flags}", record.fields.len());
    Ok(record)
}

fn decode_field(
    r: &mut ByteReader<'_>,
    spec: &FieldSpec,
    ctx: &FormContext<'_>,
) -> Result<FieldValue> {
    Ok(match spec.rule {
        LengthRule::Fixed(n) => FieldValue::Bytes(r.read_bytes(n)?.to_vec()),
        LengthRule::Byte => FieldValue::Byte(r.read_u8()?),
        LengthRule::WString => FieldValue::Text(r.read_wstring()?),
        LengthRule::Ref => FieldValue::Ref(read_ref(r, ctx)?),
        LengthRule::Refs(n) => FieldValue::Refs(read_refs(r, n, ctx)?),
        LengthRule::PackedRefs => {
            let header = r.read_u8()?;
            let count = packed_count(header);
            if packed_header(count) != Some(header) {
                warn!(
                    "{} header byte {header} is not canonical for {count} entries",
                    spec.key
                );
            }
            FieldValue::PackedRefs {
                header,
                refs: read_refs(r, count, ctx)?,
            }
        }
        LengthRule::Factions => {
            let offset = r.position();
            let len = r.read_u8()? as usize;
            if len % FACTION_ENTRY_LEN != 0 {
                return Err(CoreError::corrupt(
                    offset,
                    format!("faction list of {len} bytes is not a whole number of entries"),
                ));
            }
            let mut entries = Vec::with_capacity(len / FACTION_ENTRY_LEN);
            for _ in 0..len / FACTION_ENTRY_LEN {
                entries.push(FactionEntry {
                    faction: read_ref(r, ctx)?,
                    rank: r.read_u8()?,
                });
            }
            FieldValue::Factions(entries)
        }
        LengthRule::Counted { entry_len } => {
            let (count, count_width) = r.read_vsval()?;
            let len = (count as usize).saturating_mul(entry_len);
            FieldValue::Counted {
                count_width,
                data: r.read_bytes(len)?.to_vec(),
            }
        }
    })
}

fn read_ref(r: &mut ByteReader<'_>, ctx: &FormContext<'_>) -> Result<FormRef> {
    let offset = r.position();
    let bytes = r.read_array::<REFID_LEN>()?;
    ctx.resolve_bytes(bytes, offset)
}

fn read_refs(r: &mut ByteReader<'_>, n: usize, ctx: &FormContext<'_>) -> Result<Vec<FormRef>> {
    // Bound the allocation before trusting `n`.
    if n.saturating_mul(REFID_LEN) > r.remaining() {
        r.read_bytes(n.saturating_mul(REFID_LEN))?;
    }
    (0..n).map(|_| read_ref(r, ctx)).collect()
}

/// Entries behind a packed-list header byte: `floor(header * 0.75)`.
pub fn packed_count(header: u8) -> usize {
    header as usize * 3 / 4
}

/// Smallest header byte whose packed count is `count`, if one exists.
pub fn packed_header(count: usize) -> Option<u8> {
    if count > PACKED_LIST_MAX {
        return None;
    }
    u8::try_from((count * 4).div_ceil(3)).ok()
}

/// Encodes `record`, returning the body and `flags` with every gating bit
/// set or cleared to match the fields actually present.
pub fn encode_actor(record: &ActorRecord, flags: ChangeFlags) -> Result<(Vec<u8>, ChangeFlags)> {
    let table = fields_for(record.game);
    if let Some(stray) = record
        .fields
        .keys()
        .find(|k| !table.iter().any(|spec| spec.key == **k))
    {
        return Err(CoreError::corrupt(
            0,
            format!("`{stray}` is not a {} actor field", record.game),
        ));
    }

    let flags = derive_flags(record, table, flags)?;
    let mut w = ByteWriter::with_capacity(256 + record.tail.len());
    for spec in table {
        if !spec.gate.is_open(flags) {
            continue;
        }
        let Some(value) = record.get(spec.key) else {
            return Err(CoreError::IncompleteFieldGroup {
                field: spec.key.name(),
            });
        };
        encode_field(&mut w, spec, value)?;
    }
    w.put_bytes(&record.tail);
    Ok((w.into_inner(), flags))
}

fn derive_flags(
    record: &ActorRecord,
    table: &[FieldSpec],
    flags: ChangeFlags,
) -> Result<ChangeFlags> {
    let mut flags = flags;
    for bit in fields::gate_bits(record.game) {
        let group = table.iter().filter(|spec| spec.gate == Gate::Bit(bit));
        let (present, missing): (Vec<&FieldSpec>, Vec<&FieldSpec>) =
            group.partition(|spec| record.contains(spec.key));
        match (present.is_empty(), missing.first()) {
            (true, _) => flags = flags.with(bit, false),
            (false, None) => flags = flags.with(bit, true),
            (false, Some(spec)) => {
                return Err(CoreError::IncompleteFieldGroup {
                    field: spec.key.name(),
                });
            }
        }
    }
    Ok(flags)
}

fn encode_field(w: &mut ByteWriter, spec: &FieldSpec, value: &FieldValue) -> Result<()> {
    let key = spec.key;
    let at = w.position();
    match (spec.rule, value) {
        (LengthRule::Fixed(n), FieldValue::Bytes(bytes)) => {
            if bytes.len() != n {
                return Err(mismatch(at, key, format!("{} bytes, expected {n}", bytes.len())));
            }
            w.put_bytes(bytes);
        }
        (LengthRule::Byte, FieldValue::Byte(b)) => w.put_u8(*b),
        (LengthRule::WString, FieldValue::Text(text)) => w.put_wstring(text)?,
        (LengthRule::Ref, FieldValue::Ref(r)) => w.put_bytes(&r.raw.to_bytes()),
        (LengthRule::Refs(n), FieldValue::Refs(refs)) => {
            if refs.len() != n {
                return Err(mismatch(at, key, format!("{} refs, expected {n}", refs.len())));
            }
            for r in refs {
                w.put_bytes(&r.raw.to_bytes());
            }
        }
        (LengthRule::PackedRefs, FieldValue::PackedRefs { header, refs }) => {
            let header = if packed_count(*header) == refs.len() {
                *header
            } else {
                packed_header(refs.len())
                    .ok_or_else(|| mismatch(at, key, format!("{} refs overflow the list", refs.len())))?
            };
            w.put_u8(header);
            for r in refs {
                w.put_bytes(&r.raw.to_bytes());
            }
        }
        (LengthRule::Factions, FieldValue::Factions(entries)) => {
            let len = u8::try_from(entries.len() * FACTION_ENTRY_LEN)
                .map_err(|_| mismatch(at, key, format!("{} factions overflow the list", entries.len())))?;
            w.put_u8(len);
            for entry in entries {
                w.put_bytes(&entry.faction.raw.to_bytes());
                w.put_u8(entry.rank);
            }
        }
        (LengthRule::Counted { entry_len }, FieldValue::Counted { count_width, data }) => {
            if data.len() % entry_len != 0 {
                return Err(mismatch(
                    at,
                    key,
                    format!("{} bytes is not a multiple of {entry_len}", data.len()),
                ));
            }
            let count = u32::try_from(data.len() / entry_len)
                .map_err(|_| mismatch(at, key, "entry count exceeds u32".to_string()))?;
            let prefix = encode_vsval_width(count, *count_width).or_else(|_| encode_vsval(count))?;
            w.put_bytes(&prefix);
            w.put_bytes(data);
        }
        (rule, other) => {
            return Err(mismatch(at, key, format!("{other:?} does not fit {rule:?}")));
        }
    }
    Ok(())
}

/// `at` is where the field would start in the encoded body.
fn mismatch(at: usize, key: FieldKey, reason: String) -> CoreError {
    CoreError::corrupt(at, format!("`{key}`: {reason}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreErrorCode;
    use crate::refid::RefId;

    const NO_PLUGINS: &[String] = &[];

    fn ctx() -> FormContext<'static> {
        FormContext::new(NO_PLUGINS, &[])
    }

    #[test]
    fn packed_count_follows_three_quarters_rule() {
        assert_eq!(packed_count(4), 3);
        assert_eq!(packed_count(5), 3);
        assert_eq!(packed_count(0), 0);
        assert_eq!(packed_count(255), 191);
        assert_eq!(packed_header(3), Some(4));
        assert_eq!(packed_header(191), Some(255));
        assert_eq!(packed_header(192), None);
        for count in 0..=PACKED_LIST_MAX {
            let header = packed_header(count).unwrap();
            assert_eq!(packed_count(header), count);
        }
    }

    #[test]
    fn head_parts_header_four_reads_nine_bytes() {
        let flags = ChangeFlags(0).with(FACE_BIT, true);
        let mut payload = vec![1]; // unknown
        payload.extend_from_slice(&[0x40, 0x00, 0x10]); // hair color
        payload.extend_from_slice(&[10, 20, 30]); // skin
        payload.push(0); // spacer
        payload.extend_from_slice(&[0x40, 0x00, 0x11]); // head texture
        payload.push(4);
        payload.extend_from_slice(&[0x40, 0, 1, 0x40, 0, 2, 0x40, 0, 3]);
        payload.extend_from_slice(&[0; 5 + 76 + 20]);

        let record = decode_actor(Game::Skyrim, &payload, flags, &ctx()).unwrap();
        let Some(FieldValue::PackedRefs { header, refs }) = record.get(FieldKey::HeadParts) else {
            panic!("head parts missing");
        };
        assert_eq!(*header, 4);
        let raws: Vec<RefId> = refs.iter().map(|r| r.raw).collect();
        assert_eq!(
            raws,
            vec![RefId::MainGame(1), RefId::MainGame(2), RefId::MainGame(3)]
        );
        assert!(record.tail.is_empty());

        let (bytes, out_flags) = encode_actor(&record, flags).unwrap();
        assert_eq!(bytes, payload);
        assert_eq!(out_flags, flags);
    }

    #[test]
    fn clear_bits_consume_nothing() {
        let record = decode_actor(Game::Skyrim, &[7, 0xEE], ChangeFlags(0), &ctx()).unwrap();
        assert_eq!(record.get(FieldKey::Unknown), Some(&FieldValue::Byte(7)));
        assert_eq!(record.fields.len(), 1);
        assert_eq!(record.tail, vec![0xEE]);
    }

    #[test]
    fn truncated_field_is_named() {
        let flags = ChangeFlags(0).with(1, true);
        let err = decode_actor(Game::Skyrim, &[0; 10], flags, &ctx()).unwrap_err();
        assert!(matches!(
            err,
            CoreError::TruncatedRecord {
                field: "base_stats",
                offset: 0
            }
        ));
    }

    #[test]
    fn ragged_faction_list_is_corrupt() {
        let flags = ChangeFlags(0).with(6, true);
        let err = decode_actor(Game::Skyrim, &[3, 0x40, 0, 1, 0], flags, &ctx()).unwrap_err();
        assert_eq!(err.code(), CoreErrorCode::CorruptPayload);
    }

    #[test]
    fn non_canonical_packed_header_round_trips() {
        let flags = ChangeFlags(0).with(4, true);
        let payload = [5, 0x40, 0, 1, 0x40, 0, 2, 0x40, 0, 3, 0, 0, 9];
        let record = decode_actor(Game::Skyrim, &payload, flags, &ctx()).unwrap();
        let (bytes, _) = encode_actor(&record, flags).unwrap();
        assert_eq!(bytes, payload);
    }

    #[test]
    fn edited_packed_list_gets_canonical_header() {
        let flags = ChangeFlags(0).with(4, true);
        let payload = [5, 0x40, 0, 1, 0x40, 0, 2, 0x40, 0, 3, 0, 0, 9];
        let mut record = decode_actor(Game::Skyrim, &payload, flags, &ctx()).unwrap();
        if let Some(FieldValue::PackedRefs { refs, .. }) = record.fields.get_mut(&FieldKey::Spells) {
            refs.pop();
        }
        let (bytes, _) = encode_actor(&record, flags).unwrap();
        assert_eq!(bytes[0], 3);
        assert_eq!(bytes.len(), payload.len() - 3);
    }

    #[test]
    fn removing_a_group_clears_its_bit() {
        let flags = ChangeFlags(0).with(5, true);
        let payload = [3, 0, b'B', b'o', b'b', 1];
        let mut record = decode_actor(Game::Skyrim, &payload, flags, &ctx()).unwrap();
        assert_eq!(record.name(), Some("Bob"));
        record.remove(FieldKey::Name);
        let (bytes, out_flags) = encode_actor(&record, flags).unwrap();
        assert_eq!(bytes, vec![1]);
        assert!(!out_flags.bit(5));
    }

    #[test]
    fn mistyped_field_reports_where_it_would_start() {
        let mut record = ActorRecord::new(Game::Skyrim);
        record.insert(FieldKey::Name, FieldValue::Text("Bob".to_string()));
        record.insert(FieldKey::Unknown, FieldValue::Text("x".to_string()));
        let err = encode_actor(&record, ChangeFlags(0)).unwrap_err();
        assert_eq!(err.code(), CoreErrorCode::CorruptPayload);
        assert_eq!(err.offset(), Some(5));
    }

    #[test]
    fn partial_group_is_rejected() {
        let mut record = ActorRecord::new(Game::Skyrim);
        record.insert(FieldKey::Unknown, FieldValue::Byte(1));
        record.insert(FieldKey::FaceSpacer, FieldValue::Byte(0));
        let err = encode_actor(&record, ChangeFlags(0)).unwrap_err();
        assert!(matches!(
            err,
            CoreError::IncompleteFieldGroup { field: "hair_color" }
        ));
    }

    #[test]
    fn fallout4_counted_fields_keep_their_vsval_width() {
        let flags = ChangeFlags(0).with(14, true);
        let mut payload = vec![0x05, 0x00]; // count 1 stored wide
        payload.extend_from_slice(&[1, 2, 3, 4]);
        payload.extend_from_slice(&[0; 12]);
        let record = decode_actor(Game::Fallout4, &payload, flags, &ctx()).unwrap();
        assert_eq!(
            record.get(FieldKey::BodyUnknown),
            Some(&FieldValue::Counted {
                count_width: 2,
                data: vec![1, 2, 3, 4]
            })
        );
        let (bytes, _) = encode_actor(&record, flags).unwrap();
        assert_eq!(bytes, payload);
    }
}
