use serde::Serialize;

use crate::error::Result;
use crate::reader::{ByteReader, ByteWriter};
use crate::sex::Sex;

/// The block framed by `header_size`. Identical in both dialects.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveHeader {
    pub version: u32,
    pub save_number: u32,
    pub player_name: String,
    pub player_level: u32,
    pub player_location: String,
    /// In-game play time as the game renders it, e.g. `"000.04.12"`.
    pub game_date: String,
    pub race_editor_id: String,
    pub player_sex: Sex,
    pub current_exp: f32,
    pub level_up_exp: f32,
    /// Windows FILETIME of the save.
    pub file_time: u64,
    pub shot_width: u32,
    pub shot_height: u32,
}

impl SaveHeader {
    pub fn decode(r: &mut ByteReader<'_>) -> Result<Self> {
        Ok(Self {
            version: r.read_u32()?,
            save_number: r.read_u32()?,
            player_name: r.read_wstring()?,
            player_level: r.read_u32()?,
            player_location: r.read_wstring()?,
            game_date: r.read_wstring()?,
            race_editor_id: r.read_wstring()?,
            player_sex: Sex::from_header(r.read_u16()?),
            current_exp: r.read_f32()?,
            level_up_exp: r.read_f32()?,
            file_time: r.read_u64()?,
            shot_width: r.read_u32()?,
            shot_height: r.read_u32()?,
        })
    }

    pub fn encode(&self, w: &mut ByteWriter) -> Result<()> {
        w.put_u32(self.version);
        w.put_u32(self.save_number);
        w.put_wstring(&self.player_name)?;
        w.put_u32(self.player_level);
        w.put_wstring(&self.player_location)?;
        w.put_wstring(&self.game_date)?;
        w.put_wstring(&self.race_editor_id)?;
        w.put_u16(self.player_sex.header_value());
        w.put_f32(self.current_exp);
        w.put_f32(self.level_up_exp);
        w.put_u64(self.file_time);
        w.put_u32(self.shot_width);
        w.put_u32(self.shot_height);
        Ok(())
    }

    /// Byte length of the screenshot that follows, or `None` on overflow.
    pub fn screenshot_len(&self, bytes_per_pixel: usize) -> Option<usize> {
        (self.shot_width as usize)
            .checked_mul(self.shot_height as usize)?
            .checked_mul(bytes_per_pixel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> SaveHeader {
        SaveHeader {
            version: 9,
            save_number: 12,
            player_name: "Lydia".to_string(),
            player_level: 7,
            player_location: "Whiterun".to_string(),
            game_date: "000.04.12".to_string(),
            race_editor_id: "NordRace".to_string(),
            player_sex: Sex::Female,
            current_exp: 12.5,
            level_up_exp: 400.0,
            file_time: 0x01D5_0000_0000_0000,
            shot_width: 2,
            shot_height: 3,
        }
    }

    #[test]
    fn header_fields_are_read_in_wire_order() {
        let mut w = ByteWriter::new();
        header().encode(&mut w).unwrap();
        let bytes = w.into_inner();

        assert_eq!(&bytes[0..4], &9u32.to_le_bytes());
        assert_eq!(&bytes[8..10], &5u16.to_le_bytes());
        assert_eq!(&bytes[10..15], b"Lydia");

        let mut r = ByteReader::new(&bytes);
        assert_eq!(SaveHeader::decode(&mut r).unwrap(), header());
        assert!(r.is_empty());
    }

    #[test]
    fn screenshot_len_scales_with_pixel_width() {
        assert_eq!(header().screenshot_len(3), Some(18));
        assert_eq!(header().screenshot_len(4), Some(24));
        let mut huge = header();
        huge.shot_width = u32::MAX;
        huge.shot_height = u32::MAX;
        assert_eq!(huge.screenshot_len(usize::MAX), None);
    }
}
