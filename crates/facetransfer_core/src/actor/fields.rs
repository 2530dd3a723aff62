//! Field descriptor tables for the actor (NPC_) changeform body.
//!
//! Each table lists the fields in wire order. A field is present iff its
//! gate is open in the record's change flags.

use std::fmt;

use serde::Serialize;

use crate::changeform::ChangeFlags;
use crate::game::Game;

pub const BASE_STATS_BIT: u8 = 1;
pub const AI_DATA_BIT: u8 = 3;
pub const SPELLS_BIT: u8 = 4;
pub const NAME_BIT: u8 = 5;
pub const FACTIONS_BIT: u8 = 6;
pub const SKILLS_BIT: u8 = 9;
pub const FACE_BIT: u8 = 11;
pub const BODY_BIT: u8 = 14;
pub const FEMALE_BIT: u8 = 24;
pub const RACE_BIT: u8 = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKey {
    BaseStats,
    Factions,
    Spells,
    LeveledSpells,
    Shouts,
    AiData,
    Name,
    Skills,
    Race,
    Unknown,
    FaceLead,
    HairColor,
    SkinColor,
    FaceSpacer,
    HeadTexture,
    HeadParts,
    FaceUnknown,
    FaceTints,
    MorphValues,
    FaceParts,
    Female,
    BodyUnknown,
    BodyMorphs,
}

impl FieldKey {
    pub fn name(&self) -> &'static str {
        match self {
            Self::BaseStats => "base_stats",
            Self::Factions => "factions",
            Self::Spells => "spells",
            Self::LeveledSpells => "leveled_spells",
            Self::Shouts => "shouts",
            Self::AiData => "ai_data",
            Self::Name => "name",
            Self::Skills => "skills",
            Self::Race => "race",
            Self::Unknown => "unknown",
            Self::FaceLead => "face_lead",
            Self::HairColor => "hair_color",
            Self::SkinColor => "skin_color",
            Self::FaceSpacer => "face_spacer",
            Self::HeadTexture => "head_texture",
            Self::HeadParts => "head_parts",
            Self::FaceUnknown => "face_unknown",
            Self::FaceTints => "face_tints",
            Self::MorphValues => "morph_values",
            Self::FaceParts => "face_parts",
            Self::Female => "female",
            Self::BodyUnknown => "body_unknown",
            Self::BodyMorphs => "body_morphs",
        }
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Always,
    Bit(u8),
}

impl Gate {
    pub fn is_open(&self, flags: ChangeFlags) -> bool {
        match *self {
            Self::Always => true,
            Self::Bit(n) => flags.bit(n),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthRule {
    Fixed(usize),
    Byte,
    /// u16 length prefix plus windows-1252 text.
    WString,
    Ref,
    /// A fixed number of consecutive ref ids.
    Refs(usize),
    /// One header byte `h`, then `floor(h * 0.75)` ref ids.
    PackedRefs,
    /// One byte giving the list's byte length, then ref id + rank entries.
    Factions,
    /// A vsval entry count, then that many entries of `entry_len` bytes.
    Counted { entry_len: usize },
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub key: FieldKey,
    pub gate: Gate,
    pub rule: LengthRule,
}

const fn field(key: FieldKey, gate: Gate, rule: LengthRule) -> FieldSpec {
    FieldSpec { key, gate, rule }
}

use FieldKey as K;
use Gate::{Always, Bit};
use LengthRule as L;

pub static SKYRIM_FIELDS: &[FieldSpec] = &[
    field(K::BaseStats, Bit(BASE_STATS_BIT), L::Fixed(24)),
    field(K::Factions, Bit(FACTIONS_BIT), L::Factions),
    field(K::Spells, Bit(SPELLS_BIT), L::PackedRefs),
    field(K::LeveledSpells, Bit(SPELLS_BIT), L::PackedRefs),
    field(K::Shouts, Bit(SPELLS_BIT), L::PackedRefs),
    field(K::AiData, Bit(AI_DATA_BIT), L::Fixed(20)),
    field(K::Name, Bit(NAME_BIT), L::WString),
    field(K::Skills, Bit(SKILLS_BIT), L::Fixed(52)),
    field(K::Race, Bit(RACE_BIT), L::Refs(2)),
    field(K::Unknown, Always, L::Byte),
    field(K::HairColor, Bit(FACE_BIT), L::Ref),
    field(K::SkinColor, Bit(FACE_BIT), L::Fixed(3)),
    field(K::FaceSpacer, Bit(FACE_BIT), L::Byte),
    field(K::HeadTexture, Bit(FACE_BIT), L::Ref),
    field(K::HeadParts, Bit(FACE_BIT), L::PackedRefs),
    field(K::FaceUnknown, Bit(FACE_BIT), L::Fixed(5)),
    field(K::MorphValues, Bit(FACE_BIT), L::Fixed(76)),
    field(K::FaceParts, Bit(FACE_BIT), L::Fixed(20)),
    field(K::Female, Bit(FEMALE_BIT), L::Byte),
];

pub static FALLOUT4_FIELDS: &[FieldSpec] = &[
    field(K::BaseStats, Bit(BASE_STATS_BIT), L::Fixed(24)),
    field(K::Factions, Bit(FACTIONS_BIT), L::Factions),
    field(K::Name, Bit(NAME_BIT), L::WString),
    field(K::Female, Bit(FEMALE_BIT), L::Byte),
    field(K::FaceLead, Bit(FACE_BIT), L::Byte),
    field(K::HairColor, Bit(FACE_BIT), L::Ref),
    field(K::SkinColor, Bit(FACE_BIT), L::Fixed(4)),
    field(K::HeadTexture, Bit(FACE_BIT), L::Ref),
    field(K::HeadParts, Bit(FACE_BIT), L::PackedRefs),
    field(K::FaceUnknown, Bit(FACE_BIT), L::Fixed(5)),
    field(K::FaceTints, Bit(FACE_BIT), L::Counted { entry_len: 8 }),
    field(K::MorphValues, Bit(FACE_BIT), L::Counted { entry_len: 8 }),
    field(K::FaceParts, Bit(FACE_BIT), L::Counted { entry_len: 8 }),
    field(K::BodyUnknown, Bit(BODY_BIT), L::Counted { entry_len: 4 }),
    field(K::BodyMorphs, Bit(BODY_BIT), L::Fixed(12)),
];

pub fn fields_for(game: Game) -> &'static [FieldSpec] {
    match game {
        Game::Skyrim => SKYRIM_FIELDS,
        Game::Fallout4 => FALLOUT4_FIELDS,
    }
}

pub fn spec_for(game: Game, key: FieldKey) -> Option<&'static FieldSpec> {
    fields_for(game).iter().find(|spec| spec.key == key)
}

/// Keys transplanted by a face transfer, in wire order.
pub fn facial_keys(game: Game) -> impl Iterator<Item = FieldKey> {
    fields_for(game)
        .iter()
        .filter(|spec| spec.gate == Bit(FACE_BIT))
        .map(|spec| spec.key)
}

/// Every distinct gating bit of the table, lowest first.
pub fn gate_bits(game: Game) -> Vec<u8> {
    let mut bits: Vec<u8> = fields_for(game)
        .iter()
        .filter_map(|spec| match spec.gate {
            Bit(n) => Some(n),
            Always => None,
        })
        .collect();
    bits.sort_unstable();
    bits.dedup();
    bits
}
