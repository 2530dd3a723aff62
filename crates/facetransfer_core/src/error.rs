use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreErrorCode {
    UnrecognizedFormat,
    UnexpectedEof,
    TruncatedRecord,
    InvalidDiscriminant,
    InvalidLengthClass,
    InvalidVsval,
    CorruptPayload,
    OffsetMismatch,
    FormIdOutOfRange,
    MissingPlugin,
    UnmappedForm,
    IncompleteFieldGroup,
    IncompatibleCharacters,
    PlayerNotFound,
    Io,
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unrecognized save format (magic {magic:02x?})")]
    UnrecognizedFormat { magic: Vec<u8> },

    #[error("unexpected end of data at offset {offset}: need {needed} bytes, {available} available")]
    UnexpectedEof {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("record truncated while reading `{field}` at offset {offset}")]
    TruncatedRecord { field: &'static str, offset: usize },

    #[error("invalid ref id discriminant 3 at offset {offset}")]
    InvalidDiscriminant { offset: usize },

    #[error("invalid changeform length class 3 at offset {offset}")]
    InvalidLengthClass { offset: usize },

    #[error("unsupported vsval width at offset {offset}")]
    InvalidVsval { offset: usize },

    #[error("corrupt payload at offset {offset}: {reason}")]
    CorruptPayload { offset: usize, reason: String },

    #[error("{table} offset mismatch: expected {expected}, found {actual}")]
    OffsetMismatch {
        table: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("formID array index {index} out of range (array has {len} entries)")]
    FormIdOutOfRange { index: usize, len: usize },

    #[error("plugin `{plugin}` is not loaded in the target save")]
    MissingPlugin { plugin: String },

    #[error("form {form_id:08x} from {} is not present in the target formID array", plugin_label(.plugin))]
    UnmappedForm {
        plugin: Option<String>,
        form_id: u32,
    },

    #[error("field group containing `{field}` is only partially populated")]
    IncompleteFieldGroup { field: &'static str },

    #[error("characters are incompatible: {reason}")]
    IncompatibleCharacters { reason: String },

    #[error("player changeform not found")]
    PlayerNotFound,

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

fn plugin_label(plugin: &Option<String>) -> &str {
    plugin.as_deref().unwrap_or("the main game")
}

impl CoreError {
    pub fn code(&self) -> CoreErrorCode {
        match self {
            Self::UnrecognizedFormat { .. } => CoreErrorCode::UnrecognizedFormat,
            Self::UnexpectedEof { .. } => CoreErrorCode::UnexpectedEof,
            Self::TruncatedRecord { .. } => CoreErrorCode::TruncatedRecord,
            Self::InvalidDiscriminant { .. } => CoreErrorCode::InvalidDiscriminant,
            Self::InvalidLengthClass { .. } => CoreErrorCode::InvalidLengthClass,
            Self::InvalidVsval { .. } => CoreErrorCode::InvalidVsval,
            Self::CorruptPayload { .. } => CoreErrorCode::CorruptPayload,
            Self::OffsetMismatch { .. } => CoreErrorCode::OffsetMismatch,
            Self::FormIdOutOfRange { .. } => CoreErrorCode::FormIdOutOfRange,
            Self::MissingPlugin { .. } => CoreErrorCode::MissingPlugin,
            Self::UnmappedForm { .. } => CoreErrorCode::UnmappedForm,
            Self::IncompleteFieldGroup { .. } => CoreErrorCode::IncompleteFieldGroup,
            Self::IncompatibleCharacters { .. } => CoreErrorCode::IncompatibleCharacters,
            Self::PlayerNotFound => CoreErrorCode::PlayerNotFound,
            Self::Io(_) => CoreErrorCode::Io,
        }
    }

    pub(crate) fn corrupt(offset: usize, reason: impl Into<String>) -> Self {
        Self::CorruptPayload {
            offset,
            reason: reason.into(),
        }
    }

    /// Moves a buffer-relative offset to one relative to the enclosing
    /// buffer, where the inner buffer starts at `base`.
    pub(crate) fn rebased(self, base: usize) -> Self {
        self.map_offset(|offset| base + offset)
    }

    /// Replaces the offset outright, for positions inside inflated data
    /// that have no counterpart in the file.
    pub(crate) fn pinned(self, at: usize) -> Self {
        self.map_offset(|_| at)
    }

    fn map_offset(self, f: impl FnOnce(usize) -> usize) -> Self {
        match self {
            Self::UnexpectedEof {
                offset,
                needed,
                available,
            } => Self::UnexpectedEof {
                offset: f(offset),
                needed,
                available,
            },
            Self::TruncatedRecord { field, offset } => Self::TruncatedRecord {
                field,
                offset: f(offset),
            },
            Self::InvalidDiscriminant { offset } => Self::InvalidDiscriminant { offset: f(offset) },
            Self::InvalidLengthClass { offset } => Self::InvalidLengthClass { offset: f(offset) },
            Self::InvalidVsval { offset } => Self::InvalidVsval { offset: f(offset) },
            Self::CorruptPayload { offset, reason } => Self::CorruptPayload {
                offset: f(offset),
                reason,
            },
            other => other,
        }
    }

    /// Offset carried by positional errors.
    pub fn offset(&self) -> Option<usize> {
        match self {
            Self::UnexpectedEof { offset, .. }
            | Self::TruncatedRecord { offset, .. }
            | Self::InvalidDiscriminant { offset }
            | Self::InvalidLengthClass { offset }
            | Self::InvalidVsval { offset }
            | Self::CorruptPayload { offset, .. } => Some(*offset),
            _ => None,
        }
    }

    /// Re-labels a low-level EOF as a truncated named field.
    pub(crate) fn in_field(self, field: &'static str) -> Self {
        match self {
            Self::UnexpectedEof { offset, .. } => Self::TruncatedRecord { field, offset },
            other => other,
        }
    }
}
