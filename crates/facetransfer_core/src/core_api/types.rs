use std::path::PathBuf;

use serde::Serialize;

use crate::actor::{FieldKey, FieldValue};
use crate::game::Game;
use crate::merge::MergeOptions;
use crate::sex::Sex;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Screenshot {
    pub width: u32,
    pub height: u32,
    pub bytes_per_pixel: usize,
    /// Raw RGB (Skyrim) or RGBA (Fallout 4) rows, top to bottom.
    #[serde(skip_serializing)]
    pub pixels: Vec<u8>,
}

/// What a save picker shows for one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub game: Game,
    pub save_number: u32,
    pub player_name: String,
    pub level: u32,
    pub location: String,
    pub race: String,
    pub sex: Sex,
    pub play_time: String,
    pub screenshot: Screenshot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldEntry {
    pub key: FieldKey,
    /// Gating flag bit, `None` for always-present fields.
    pub bit: Option<u8>,
    pub value: FieldValue,
}

/// Decoded view of the player's changeform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerReport {
    pub game: Game,
    pub form_type: u8,
    pub version: u8,
    pub compressed: bool,
    /// Offset of the record within the changeform region.
    pub region_offset: usize,
    pub record_len: usize,
    pub flags: u32,
    pub flag_bits: Vec<u8>,
    pub fields: Vec<FieldEntry>,
    /// From the actor's `female` byte, `None` while flag 24 is clear.
    pub sex: Option<Sex>,
    pub tail_len: usize,
    pub required_plugins: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransferOptions {
    pub merge: MergeOptions,
    /// Refuse saves whose game, sex or race differ.
    pub check_compatibility: bool,
    /// Rename a replaced target to `<target>.facebak<N>` before writing.
    pub keep_backup: bool,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            merge: MergeOptions::default(),
            check_compatibility: true,
            keep_backup: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferOutcome {
    pub target: PathBuf,
    /// `target` unless the result went to a separate output file.
    pub written_to: PathBuf,
    /// Set only when `target` was replaced with `keep_backup` on.
    pub backup: Option<PathBuf>,
    pub bytes_written: usize,
}
