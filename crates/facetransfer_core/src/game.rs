use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

pub const SKYRIM_MAGIC: &[u8] = b"TESV_SAVEGAME";
pub const FALLOUT4_MAGIC: &[u8] = b"FO4_SAVEGAME";

/// Save-file dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Game {
    Skyrim,
    Fallout4,
}

impl Game {
    /// Picks the dialect from the leading magic bytes.
    pub fn detect(bytes: &[u8]) -> Result<Self> {
        if bytes.starts_with(SKYRIM_MAGIC) {
            Ok(Self::Skyrim)
        } else if bytes.starts_with(FALLOUT4_MAGIC) {
            Ok(Self::Fallout4)
        } else {
            Err(CoreError::UnrecognizedFormat {
                magic: bytes[..bytes.len().min(SKYRIM_MAGIC.len())].to_vec(),
            })
        }
    }

    pub fn magic(&self) -> &'static [u8] {
        match self {
            Self::Skyrim => SKYRIM_MAGIC,
            Self::Fallout4 => FALLOUT4_MAGIC,
        }
    }

    /// Bytes per screenshot pixel: RGB for Skyrim, RGBA for Fallout 4.
    pub fn screenshot_bpp(&self) -> usize {
        match self {
            Self::Skyrim => 3,
            Self::Fallout4 => 4,
        }
    }

    pub fn has_game_version(&self) -> bool {
        matches!(self, Self::Fallout4)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Skyrim => "skyrim",
            Self::Fallout4 => "fallout4",
        }
    }
}

impl fmt::Display for Game {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
