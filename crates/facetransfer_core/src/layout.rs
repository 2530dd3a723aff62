use std::fmt;

use serde::Serialize;

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ByteRange {
    pub start: usize,
    pub end: usize,
}

impl ByteRange {
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionId {
    Magic,
    Header,
    Screenshot,
    FormVersion,
    GameVersion,
    PluginInfo,
    FileLocationTable,
    GlobalData(u8),
    ChangeForms,
    FormIdArray,
    WorldspaceArray,
    UnknownTable3,
}

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Magic => f.write_str("magic"),
            Self::Header => f.write_str("header"),
            Self::Screenshot => f.write_str("screenshot"),
            Self::FormVersion => f.write_str("form_version"),
            Self::GameVersion => f.write_str("game_version"),
            Self::PluginInfo => f.write_str("plugin_info"),
            Self::FileLocationTable => f.write_str("file_location_table"),
            Self::GlobalData(n) => write!(f, "global_data_{n}"),
            Self::ChangeForms => f.write_str("change_forms"),
            Self::FormIdArray => f.write_str("formid_array"),
            Self::WorldspaceArray => f.write_str("worldspace_array"),
            Self::UnknownTable3 => f.write_str("unknown_table3"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SectionLayout {
    pub id: SectionId,
    pub range: ByteRange,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileLayout {
    pub file_len: usize,
    pub sections: Vec<SectionLayout>,
}

impl FileLayout {
    pub(crate) fn record(&mut self, id: SectionId, start: usize, end: usize) {
        self.sections.push(SectionLayout {
            id,
            range: ByteRange { start, end },
        });
    }

    pub fn section(&self, id: SectionId) -> Option<&SectionLayout> {
        self.sections.iter().find(|s| s.id == id)
    }

    /// Checks that the sections tile the file with no gap or overlap.
    pub fn validate(&self) -> Result<()> {
        let Some(first) = self.sections.first() else {
            return Err(CoreError::corrupt(0, "file layout has no sections"));
        };

        if first.range.start != 0 {
            return Err(CoreError::OffsetMismatch {
                table: "layout start",
                expected: 0,
                actual: first.range.start,
            });
        }

        let mut expected = 0usize;
        for section in &self.sections {
            if section.range.start != expected || section.range.end < section.range.start {
                return Err(CoreError::OffsetMismatch {
                    table: "section boundary",
                    expected,
                    actual: section.range.start,
                });
            }
            expected = section.range.end;
        }

        if expected != self.file_len {
            return Err(CoreError::OffsetMismatch {
                table: "layout end",
                expected: self.file_len,
                actual: expected,
            });
        }

        Ok(())
    }
}
