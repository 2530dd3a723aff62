mod engine;
mod transfer;
mod types;

pub use crate::actor::{FieldKey, FieldValue};
pub use crate::error::{CoreError, CoreErrorCode};
pub use crate::game::Game;
pub use crate::layout::{FileLayout, SectionId};
pub use crate::merge::{GenderSource, MergeOptions};
pub use crate::sex::Sex;
pub use engine::{Engine, Session};
pub use transfer::{
    get_summary, numbered_backup_path, plan_face_transfer, transfer_face, transfer_face_into,
    transfer_face_with,
};
pub use types::{FieldEntry, PlayerReport, Screenshot, Summary, TransferOptions, TransferOutcome};
