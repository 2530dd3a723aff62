#![allow(dead_code)]

use facetransfer_core::changeform::{ChangeFlags, ChangeForm};
use facetransfer_core::refid::RefId;
use facetransfer_core::save::{FileLocationTable, PluginList, SaveFile, SaveHeader};
use facetransfer_core::sex::Sex;
use facetransfer_core::Game;

pub const DAWNGUARD_HAIR: u32 = 0x0100_0D62;

/// Describes a synthetic save. Every byte is derived from these knobs.
#[derive(Debug, Clone)]
pub struct Fixture {
    pub game: Game,
    pub name: String,
    pub sex: Sex,
    pub race: String,
    pub seed: u8,
    pub compressed: bool,
    pub plugins: Vec<String>,
    pub form_ids: Vec<u32>,
    /// Use a plugin-owned hair color (form id array index 1).
    pub plugin_hair: bool,
    /// The player's first faction.
    pub faction: RefId,
}

impl Fixture {
    pub fn skyrim(name: &str, seed: u8) -> Self {
        Self {
            game: Game::Skyrim,
            name: name.to_string(),
            sex: Sex::Female,
            race: "NordRace".to_string(),
            seed,
            compressed: true,
            plugins: vec!["Dawnguard.esm".to_string(), "Hearthfires.esm".to_string()],
            form_ids: vec![DAWNGUARD_HAIR, 0x0001_2E46],
            plugin_hair: false,
            faction: RefId::MainGame(0x50),
        }
    }

    pub fn fallout4(name: &str, seed: u8) -> Self {
        Self {
            game: Game::Fallout4,
            race: "HumanRace".to_string(),
            plugins: vec!["DLCRobot.esm".to_string()],
            ..Self::skyrim(name, seed)
        }
    }

    pub fn flags(&self) -> ChangeFlags {
        let bits: &[u8] = match self.game {
            Game::Skyrim => &[1, 5, 6, 11, 24, 28],
            Game::Fallout4 => &[1, 5, 6, 11, 14, 24, 28],
        };
        bits.iter().fold(ChangeFlags(0), |f, &b| f.with(b, true))
    }

    fn hair_ref(&self) -> [u8; 3] {
        if self.plugin_hair {
            RefId::PluginIndexed(1).to_bytes()
        } else {
            RefId::MainGame(0x0001_0000 | self.seed as u32).to_bytes()
        }
    }

    fn female_byte(&self) -> u8 {
        self.sex.actor_byte().expect("fixture sex should fit the actor byte")
    }

    /// The player's actor body exactly as it sits on the wire.
    pub fn player_payload(&self) -> Vec<u8> {
        let s = self.seed;
        let mut p = Vec::new();
        p.extend_from_slice(&[s; 24]);
        p.push(8);
        p.extend_from_slice(&self.faction.to_bytes());
        p.extend_from_slice(&[2, 0x40, 0x00, 0x51, 0]);
        p.extend_from_slice(&(self.name.len() as u16).to_le_bytes());
        p.extend_from_slice(self.name.as_bytes());

        match self.game {
            Game::Skyrim => {
                p.push(1);
                p.extend_from_slice(&self.hair_ref());
                p.extend_from_slice(&[s, s.wrapping_add(1), s.wrapping_add(2)]);
                p.push(0);
                p.extend_from_slice(&RefId::MainGame(0x0002_0000 | s as u32).to_bytes());
                p.push(4);
                for part in 0..3u32 {
                    p.extend_from_slice(&RefId::MainGame(0x0003_0000 | part << 8 | s as u32).to_bytes());
                }
                p.extend_from_slice(&[s; 5]);
                p.extend_from_slice(&[s; 76]);
                p.extend_from_slice(&[s; 20]);
                p.push(self.female_byte());
            }
            Game::Fallout4 => {
                p.push(self.female_byte());
                p.push(s);
                p.extend_from_slice(&self.hair_ref());
                p.extend_from_slice(&[s, s, s, 0xFF]);
                p.extend_from_slice(&RefId::MainGame(0x0002_0000 | s as u32).to_bytes());
                p.push(4);
                for part in 0..3u32 {
                    p.extend_from_slice(&RefId::MainGame(0x0003_0000 | part << 8 | s as u32).to_bytes());
                }
                p.extend_from_slice(&[s; 5]);
                p.push(2 << 2);
                p.extend_from_slice(&[s; 16]);
                p.push(1 << 2);
                p.extend_from_slice(&[s; 8]);
                p.push(0);
                p.push(1 << 2);
                p.extend_from_slice(&[0xB0, 0xD1, 0xE5, s]);
                p.extend_from_slice(&[s; 12]);
            }
        }
        p.extend_from_slice(&[0xDE, 0xAD]);
        p
    }

    pub fn player_record(&self) -> ChangeForm {
        let payload = self.player_payload();
        if self.compressed {
            ChangeForm::new_compressed(RefId::PLAYER_BASE, self.flags(), 9, 74, &payload)
                .expect("fixture payload should compress")
        } else {
            ChangeForm::new_uncompressed(RefId::PLAYER_BASE, self.flags(), 9, 74, payload)
        }
    }

    /// Player record sandwiched between two unrelated records.
    pub fn change_forms(&self) -> Vec<u8> {
        let before = ChangeForm::new_uncompressed(
            RefId::PLAYER_REF,
            ChangeFlags(0x8000_0006),
            1,
            74,
            vec![0x11; 40],
        );
        let after = ChangeForm::new_compressed(
            RefId::MainGame(0x0001_3BA3),
            ChangeFlags(0x0000_0800),
            9,
            74,
            &[0x22; 300],
        )
        .expect("fixture record should compress");

        let mut region = before.encode().expect("fixture record should encode");
        region.extend(self.player_record().encode().expect("player should encode"));
        region.extend(after.encode().expect("fixture record should encode"));
        region
    }

    pub fn save(&self) -> SaveFile {
        let (width, height) = (3u32, 2u32);
        let bpp = self.game.screenshot_bpp();
        let screenshot = (0..width as usize * height as usize * bpp)
            .map(|i| (i as u8).wrapping_mul(self.seed | 1))
            .collect();

        SaveFile {
            game: self.game,
            header: SaveHeader {
                version: match self.game {
                    Game::Skyrim => 9,
                    Game::Fallout4 => 11,
                },
                save_number: 40 + self.seed as u32,
                player_name: self.name.clone(),
                player_level: 12,
                player_location: "Whiterun".to_string(),
                game_date: "002.11.45".to_string(),
                race_editor_id: self.race.clone(),
                player_sex: self.sex,
                current_exp: 150.5,
                level_up_exp: 1075.0,
                file_time: 0x01D6_1234_5678_9ABC,
                shot_width: width,
                shot_height: height,
            },
            screenshot,
            form_version: match self.game {
                Game::Skyrim => 74,
                Game::Fallout4 => 68,
            },
            game_version: match self.game {
                Game::Skyrim => None,
                Game::Fallout4 => Some("1.10.163.0".to_string()),
            },
            plugins: PluginList::new(self.plugins.clone()),
            location_table: FileLocationTable {
                global_data_table1_count: 9,
                global_data_table2_count: 14,
                global_data_table3_count: 5,
                change_form_count: 3,
                reserved: [0x0000_0001; 15],
                ..FileLocationTable::default()
            },
            global_data: [Vec::new(), vec![0x01; 24], vec![0x02; 17], vec![0x03; 9]],
            change_forms: self.change_forms(),
            form_ids: self.form_ids.clone(),
            worldspaces: vec![0x0000_003C, 0x0001_6BB4],
            unknown_table3: vec![0x09; 6],
        }
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.save().encode().expect("fixture save should encode")
    }
}
