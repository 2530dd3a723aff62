//! Whole-file container codec.
//!
//! Decode walks the file front to back, capturing a [`FileLayout`] as it
//! goes. Encode writes the same sections in the same order and recomputes
//! every size and offset field from what it actually emitted.

mod header;
mod plugins;

use log::debug;
use serde::Serialize;

pub use header::SaveHeader;
pub use plugins::PluginList;

use crate::actor::{ActorRecord, decode_actor, encode_actor};
use crate::changeform::{self, ChangeFlags, ChangeForm, LocatedChangeForm};
use crate::error::{CoreError, Result};
use crate::game::Game;
use crate::layout::{FileLayout, SectionId};
use crate::reader::{ByteReader, ByteWriter};
use crate::refid::FormContext;

pub const GLOBAL_DATA_REGIONS: usize = 4;
const RESERVED_WORDS: usize = 15;
const LOCATION_TABLE_LEN: usize = 10 * 4 + RESERVED_WORDS * 4;

/// The file location table. The six offsets are derived on encode; the
/// counts and the reserved words are data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileLocationTable {
    pub formid_array_count_offset: u32,
    pub unknown_table3_offset: u32,
    pub global_data_table1_offset: u32,
    pub global_data_table2_offset: u32,
    pub change_forms_offset: u32,
    pub global_data_table3_offset: u32,
    pub global_data_table1_count: u32,
    pub global_data_table2_count: u32,
    pub global_data_table3_count: u32,
    pub change_form_count: u32,
    pub reserved: [u32; RESERVED_WORDS],
}

impl FileLocationTable {
    fn decode(r: &mut ByteReader<'_>) -> Result<Self> {
        let mut table = Self {
            formid_array_count_offset: r.read_u32()?,
            unknown_table3_offset: r.read_u32()?,
            global_data_table1_offset: r.read_u32()?,
            global_data_table2_offset: r.read_u32()?,
            change_forms_offset: r.read_u32()?,
            global_data_table3_offset: r.read_u32()?,
            global_data_table1_count: r.read_u32()?,
            global_data_table2_count: r.read_u32()?,
            global_data_table3_count: r.read_u32()?,
            change_form_count: r.read_u32()?,
            reserved: [0; RESERVED_WORDS],
        };
        for word in &mut table.reserved {
            *word = r.read_u32()?;
        }
        Ok(table)
    }

    fn encode(&self, w: &mut ByteWriter) {
        w.put_u32(self.formid_array_count_offset);
        w.put_u32(self.unknown_table3_offset);
        w.put_u32(self.global_data_table1_offset);
        w.put_u32(self.global_data_table2_offset);
        w.put_u32(self.change_forms_offset);
        w.put_u32(self.global_data_table3_offset);
        w.put_u32(self.global_data_table1_count);
        w.put_u32(self.global_data_table2_count);
        w.put_u32(self.global_data_table3_count);
        w.put_u32(self.change_form_count);
        for word in self.reserved {
            w.put_u32(word);
        }
    }
}

/// A decoded save. Owns every byte of the file; nothing is shared.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveFile {
    pub game: Game,
    pub header: SaveHeader,
    pub screenshot: Vec<u8>,
    pub form_version: u8,
    /// Present only in Fallout 4 saves.
    pub game_version: Option<String>,
    pub plugins: PluginList,
    pub location_table: FileLocationTable,
    /// Regions 0..=2 precede the changeforms, region 3 follows them.
    pub global_data: [Vec<u8>; GLOBAL_DATA_REGIONS],
    pub change_forms: Vec<u8>,
    pub form_ids: Vec<u32>,
    pub worldspaces: Vec<u32>,
    pub unknown_table3: Vec<u8>,
}

/// The player's changeform and its decoded actor body.
#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub located: LocatedChangeForm,
    pub actor: ActorRecord,
}

impl Player {
    pub fn flags(&self) -> ChangeFlags {
        self.located.record.flags
    }
}

impl SaveFile {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Self::decode_with_layout(bytes).map(|(save, _)| save)
    }

    pub fn decode_with_layout(bytes: &[u8]) -> Result<(Self, FileLayout)> {
        let game = Game::detect(bytes)?;
        debug!("detected {game} save ({} bytes)", bytes.len());

        let mut layout = FileLayout {
            file_len: bytes.len(),
            sections: Vec::new(),
        };
        let mut r = ByteReader::new(bytes);

        r.read_bytes(game.magic().len())?;
        layout.record(SectionId::Magic, 0, r.position());

        let start = r.position();
        let header_size = r.read_u32()? as usize;
        let header_start = r.position();
        let block = r.read_bytes(header_size)?;
        let mut hr = ByteReader::new(block);
        let header = SaveHeader::decode(&mut hr).map_err(|e| e.in_field("header"))?;
        if !hr.is_empty() {
            return Err(CoreError::OffsetMismatch {
                table: "header_size",
                expected: header_start + hr.position(),
                actual: header_start + header_size,
            });
        }
        layout.record(SectionId::Header, start, r.position());

        let start = r.position();
        let shot_len = header
            .screenshot_len(game.screenshot_bpp())
            .ok_or_else(|| CoreError::corrupt(start, "screenshot dimensions overflow"))?;
        let screenshot = r
            .read_bytes(shot_len)
            .map_err(|e| e.in_field("screenshot"))?
            .to_vec();
        layout.record(SectionId::Screenshot, start, r.position());

        let start = r.position();
        let form_version = r.read_u8()?;
        layout.record(SectionId::FormVersion, start, r.position());

        let game_version = if game.has_game_version() {
            let start = r.position();
            let version = r.read_wstring()?;
            layout.record(SectionId::GameVersion, start, r.position());
            Some(version)
        } else {
            None
        };

        let start = r.position();
        let plugin_info_size = r.read_u32()? as usize;
        let block = r
            .read_bytes(plugin_info_size)
            .map_err(|e| e.in_field("plugin info"))?;
        let plugins = PluginList::decode(block).map_err(|e| e.in_field("plugin info"))?;
        layout.record(SectionId::PluginInfo, start, r.position());
        debug!("{} plugins in load order", plugins.len());

        let start = r.position();
        let location_table =
            FileLocationTable::decode(&mut r).map_err(|e| e.in_field("file location table"))?;
        layout.record(SectionId::FileLocationTable, start, r.position());

        let t = &location_table;
        let mut region = |r: &mut ByteReader<'_>, id: SectionId, end: u32| -> Result<Vec<u8>> {
            let start = r.position();
            let bytes = r.read_until(end as usize, section_name(id))?.to_vec();
            layout.record(id, start, r.position());
            Ok(bytes)
        };
        let g0 = region(&mut r, SectionId::GlobalData(0), t.global_data_table1_offset)?;
        let g1 = region(&mut r, SectionId::GlobalData(1), t.global_data_table2_offset)?;
        let g2 = region(&mut r, SectionId::GlobalData(2), t.change_forms_offset)?;
        let change_forms = region(&mut r, SectionId::ChangeForms, t.global_data_table3_offset)?;
        let g3 = region(&mut r, SectionId::GlobalData(3), t.formid_array_count_offset)?;

        let start = r.position();
        let count = r.read_u32()? as usize;
        let form_ids = r
            .read_u32_vec(count)
            .map_err(|e| e.in_field("formid array"))?;
        layout.record(SectionId::FormIdArray, start, r.position());

        let start = r.position();
        let count = r.read_u32()? as usize;
        let worldspaces = r
            .read_u32_vec(count)
            .map_err(|e| e.in_field("worldspace array"))?;
        layout.record(SectionId::WorldspaceArray, start, r.position());

        let start = r.position();
        if start != t.unknown_table3_offset as usize {
            return Err(CoreError::OffsetMismatch {
                table: "unknown_table3_offset",
                expected: start,
                actual: t.unknown_table3_offset as usize,
            });
        }
        let size = r.read_u32()? as usize;
        let unknown_table3 = r
            .read_bytes(size)
            .map_err(|e| e.in_field("unknown table 3"))?
            .to_vec();
        layout.record(SectionId::UnknownTable3, start, r.position());

        layout.validate()?;
        debug!(
            "changeform region spans {} bytes holding {} records",
            change_forms.len(),
            location_table.change_form_count
        );

        let save = Self {
            game,
            header,
            screenshot,
            form_version,
            game_version,
            plugins,
            location_table,
            global_data: [g0, g1, g2, g3],
            change_forms,
            form_ids,
            worldspaces,
            unknown_table3,
        };
        Ok((save, layout))
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        self.encode_with_layout().map(|(bytes, _)| bytes)
    }

    /// Encodes and reports where each section landed. For a file that came
    /// out of [`decode`](Self::decode) unmodified this is the decoded layout.
    pub fn encode_with_layout(&self) -> Result<(Vec<u8>, FileLayout)> {
        let game = self.game;
        let mut layout = FileLayout::default();
        let mut w = ByteWriter::with_capacity(self.estimated_len());

        w.put_bytes(game.magic());
        layout.record(SectionId::Magic, 0, w.position());

        let start = w.position();
        let mut hw = ByteWriter::new();
        self.header.encode(&mut hw)?;
        let header = hw.into_inner();
        w.put_len_u32(header.len(), "header")?;
        w.put_bytes(&header);
        layout.record(SectionId::Header, start, w.position());

        let expected_shot = self.header.screenshot_len(game.screenshot_bpp());
        if expected_shot != Some(self.screenshot.len()) {
            return Err(CoreError::corrupt(
                w.position(),
                format!(
                    "screenshot holds {} bytes but the header declares {}x{} at {} bytes per pixel",
                    self.screenshot.len(),
                    self.header.shot_width,
                    self.header.shot_height,
                    game.screenshot_bpp()
                ),
            ));
        }
        let start = w.position();
        w.put_bytes(&self.screenshot);
        layout.record(SectionId::Screenshot, start, w.position());

        let start = w.position();
        w.put_u8(self.form_version);
        layout.record(SectionId::FormVersion, start, w.position());

        match (&self.game_version, game.has_game_version()) {
            (Some(version), true) => {
                let start = w.position();
                w.put_wstring(version)?;
                layout.record(SectionId::GameVersion, start, w.position());
            }
            (None, false) => {}
            (_, needed) => {
                return Err(CoreError::corrupt(
                    w.position(),
                    format!("game version {} for a {game} save", presence(needed)),
                ));
            }
        }

        let start = w.position();
        let plugin_info = self.plugins.encode()?;
        w.put_len_u32(plugin_info.len(), "plugin info")?;
        w.put_bytes(&plugin_info);
        layout.record(SectionId::PluginInfo, start, w.position());

        let table_start = w.position();
        let table = self.derive_location_table(table_start)?;
        table.encode(&mut w);
        debug_assert_eq!(w.position(), table_start + LOCATION_TABLE_LEN);
        layout.record(SectionId::FileLocationTable, table_start, w.position());

        let [g0, g1, g2, g3] = &self.global_data;
        for (id, bytes) in [
            (SectionId::GlobalData(0), g0),
            (SectionId::GlobalData(1), g1),
            (SectionId::GlobalData(2), g2),
            (SectionId::ChangeForms, &self.change_forms),
            (SectionId::GlobalData(3), g3),
        ] {
            let start = w.position();
            w.put_bytes(bytes);
            layout.record(id, start, w.position());
        }
        debug_assert_eq!(w.position(), table.formid_array_count_offset as usize);

        for (id, values) in [
            (SectionId::FormIdArray, &self.form_ids),
            (SectionId::WorldspaceArray, &self.worldspaces),
        ] {
            let start = w.position();
            w.put_len_u32(values.len(), section_name(id))?;
            for &value in values {
                w.put_u32(value);
            }
            layout.record(id, start, w.position());
        }

        let start = w.position();
        debug_assert_eq!(start, table.unknown_table3_offset as usize);
        w.put_len_u32(self.unknown_table3.len(), "unknown table 3")?;
        w.put_bytes(&self.unknown_table3);
        layout.record(SectionId::UnknownTable3, start, w.position());

        let bytes = w.into_inner();
        layout.file_len = bytes.len();
        Ok((bytes, layout))
    }

    /// The layout this save encodes to.
    pub fn layout(&self) -> Result<FileLayout> {
        self.encode_with_layout().map(|(_, layout)| layout)
    }

    fn derive_location_table(&self, table_start: usize) -> Result<FileLocationTable> {
        let offset = |pos: usize, what: &'static str| {
            u32::try_from(pos)
                .map_err(|_| CoreError::corrupt(pos, format!("{what} offset exceeds u32")))
        };
        let [g0, g1, g2, g3] = &self.global_data;
        let table1 = table_start + LOCATION_TABLE_LEN + g0.len();
        let table2 = table1 + g1.len();
        let change_forms = table2 + g2.len();
        let table3 = change_forms + self.change_forms.len();
        let formid_count = table3 + g3.len();
        let unknown3 = formid_count + 4 + self.form_ids.len() * 4 + 4 + self.worldspaces.len() * 4;

        Ok(FileLocationTable {
            formid_array_count_offset: offset(formid_count, "formid array")?,
            unknown_table3_offset: offset(unknown3, "unknown table 3")?,
            global_data_table1_offset: offset(table1, "global data table 1")?,
            global_data_table2_offset: offset(table2, "global data table 2")?,
            change_forms_offset: offset(change_forms, "changeforms")?,
            global_data_table3_offset: offset(table3, "global data table 3")?,
            ..self.location_table.clone()
        })
    }

    fn estimated_len(&self) -> usize {
        self.screenshot.len()
            + self.change_forms.len()
            + self.global_data.iter().map(Vec::len).sum::<usize>()
            + (self.form_ids.len() + self.worldspaces.len()) * 4
            + self.unknown_table3.len()
            + 1024
    }

    pub fn form_context(&self) -> FormContext<'_> {
        FormContext::new(&self.plugins.names, &self.form_ids)
    }

    pub fn find_player_record(&self) -> Result<LocatedChangeForm> {
        changeform::find_player(
            &self.change_forms,
            self.location_table.change_form_count,
            &self.form_ids,
        )
        .map_err(|e| e.rebased(self.change_forms_start()))?
        .ok_or(CoreError::PlayerNotFound)
    }

    /// File offset of the changeform region as last decoded.
    fn change_forms_start(&self) -> usize {
        self.location_table.change_forms_offset as usize
    }

    pub fn player(&self) -> Result<Player> {
        let located = self.find_player_record()?;
        debug!(
            "player changeform at {}..{} in the changeform region, flags {}",
            located.range.start, located.range.end, located.record.flags
        );
        let record_start = self.change_forms_start() + located.range.start;
        let payload = located
            .record
            .payload()
            .map_err(|e| e.rebased(record_start))?;
        let actor = decode_actor(
            self.game,
            &payload,
            located.record.flags,
            &self.form_context(),
        )
        .map_err(|e| {
            if located.record.is_compressed() {
                e.pinned(record_start)
            } else {
                e.rebased(record_start + located.record.header_len())
            }
        })?;
        Ok(Player { located, actor })
    }

    /// Re-encodes `actor` into the player's changeform and splices it back,
    /// leaving every other changeform byte untouched.
    pub fn replace_player(&mut self, actor: &ActorRecord, flags: ChangeFlags) -> Result<()> {
        let located = self.find_player_record()?;
        let record_start = self.change_forms_start() + located.range.start;
        let (payload, flags) = encode_actor(actor, flags).map_err(|e| e.pinned(record_start))?;
        let mut record: ChangeForm = located.record;
        record.set_payload(&payload)?;
        record.flags = flags;
        self.change_forms = changeform::splice_record(&self.change_forms, located.range, &record)?;
        Ok(())
    }
}

fn section_name(id: SectionId) -> &'static str {
    match id {
        SectionId::GlobalData(0) => "global data table 1 offset",
        SectionId::GlobalData(1) => "global data table 2 offset",
        SectionId::GlobalData(2) => "changeforms offset",
        SectionId::ChangeForms => "global data table 3 offset",
        SectionId::GlobalData(_) => "formid array count offset",
        SectionId::FormIdArray => "formid array",
        SectionId::WorldspaceArray => "worldspace array",
        _ => "section",
    }
}

fn presence(needed: bool) -> &'static str {
    if needed { "missing" } else { "present" }
}
