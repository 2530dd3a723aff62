use std::fs;
use std::path::Path;

use log::warn;

use crate::actor::{Gate, fields_for};
use crate::error::{CoreError, Result};
use crate::game::Game;
use crate::layout::FileLayout;
use crate::save::{Player, SaveFile};

use super::types::{FieldEntry, PlayerReport, Screenshot, Summary};

#[derive(Debug, Default, Clone, Copy)]
pub struct Engine;

/// One decoded save plus the layout it was decoded from.
#[derive(Debug)]
pub struct Session {
    save: SaveFile,
    layout: FileLayout,
}

impl Engine {
    pub fn new() -> Self {
        Self
    }

    /// Decodes `bytes`. With a `hint`, a save of the other game is rejected.
    pub fn open_bytes<B: AsRef<[u8]>>(&self, bytes: B, hint: Option<Game>) -> Result<Session> {
        let bytes = bytes.as_ref();
        let game = Game::detect(bytes)?;
        if let Some(expected) = hint
            && expected != game
        {
            return Err(CoreError::UnrecognizedFormat {
                magic: bytes[..game.magic().len()].to_vec(),
            });
        }
        let (save, layout) = SaveFile::decode_with_layout(bytes)?;
        Ok(Session { save, layout })
    }

    pub fn open_path(&self, path: impl AsRef<Path>, hint: Option<Game>) -> Result<Session> {
        let bytes = fs::read(path)?;
        self.open_bytes(bytes, hint)
    }
}

impl Session {
    pub fn game(&self) -> Game {
        self.save.game
    }

    pub fn save(&self) -> &SaveFile {
        &self.save
    }

    pub fn into_save(self) -> SaveFile {
        self.save
    }

    pub fn layout(&self) -> &FileLayout {
        &self.layout
    }

    pub fn summary(&self) -> Summary {
        let h = &self.save.header;
        Summary {
            game: self.save.game,
            save_number: h.save_number,
            player_name: h.player_name.clone(),
            level: h.player_level,
            location: h.player_location.clone(),
            race: h.race_editor_id.clone(),
            sex: h.player_sex,
            play_time: h.game_date.clone(),
            screenshot: Screenshot {
                width: h.shot_width,
                height: h.shot_height,
                bytes_per_pixel: self.save.game.screenshot_bpp(),
                pixels: self.save.screenshot.clone(),
            },
        }
    }

    pub fn player(&self) -> Result<Player> {
        self.save.player()
    }

    pub fn player_report(&self) -> Result<PlayerReport> {
        let player = self.save.player()?;
        let record = &player.located.record;
        let header_sex = self.save.header.player_sex;
        if let Some(sex) = player.actor.female()
            && sex != header_sex
        {
            warn!("header says {header_sex} but the player record says {sex}");
        }
        let fields = fields_for(self.save.game)
            .iter()
            .filter_map(|spec| {
                player.actor.get(spec.key).map(|value| FieldEntry {
                    key: spec.key,
                    bit: match spec.gate {
                        Gate::Always => None,
                        Gate::Bit(n) => Some(n),
                    },
                    value: value.clone(),
                })
            })
            .collect();

        Ok(PlayerReport {
            game: self.save.game,
            form_type: record.form_type,
            version: record.version,
            compressed: record.is_compressed(),
            region_offset: player.located.range.start,
            record_len: player.located.range.len(),
            flags: record.flags.0,
            flag_bits: record.flags.bits(),
            fields,
            sex: player.actor.female(),
            tail_len: player.actor.tail.len(),
            required_plugins: player.actor.required_plugins(),
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.save.encode()
    }
}
