//! Save-file codec and face transfer for Skyrim and Fallout 4.
//!
//! [`save::SaveFile`] round-trips a whole file byte for byte. The player's
//! changeform is located with [`changeform::find_player`], its body decoded
//! by [`actor::decode_actor`], and [`merge::merge`] transplants the facial
//! fields of one actor onto another. [`core_api`] wraps the pipeline for
//! front ends.

pub mod actor;
pub mod changeform;
pub mod core_api;
pub mod error;
pub mod game;
pub mod layout;
pub mod merge;
pub mod primitives;
pub mod reader;
pub mod refid;
pub mod save;
pub mod sex;

pub use error::{CoreError, CoreErrorCode, Result};
pub use game::Game;
pub use save::SaveFile;
