//! Player sex. A save records it twice: as a u16 in the header, which
//! the save picker reads, and as the actor's `female` byte behind change
//! flag 24, which the game reads. The two are not kept in sync by anything
//! but the game itself.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sex {
    Male,
    Female,
    /// A value neither game writes, kept so it can be written back.
    Unknown(u16),
}

const MALE: u16 = 0;
const FEMALE: u16 = 1;

impl Sex {
    pub fn from_header(raw: u16) -> Self {
        match raw {
            MALE => Self::Male,
            FEMALE => Self::Female,
            other => Self::Unknown(other),
        }
    }

    pub fn header_value(&self) -> u16 {
        match *self {
            Self::Male => MALE,
            Self::Female => FEMALE,
            Self::Unknown(other) => other,
        }
    }

    /// Reads the actor record's `female` byte.
    pub fn from_actor_byte(raw: u8) -> Self {
        Self::from_header(u16::from(raw))
    }

    /// The `female` byte for this sex, `None` when an unknown header value
    /// does not fit in a byte.
    pub fn actor_byte(&self) -> Option<u8> {
        u8::try_from(self.header_value()).ok()
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Male => f.write_str("Male"),
            Self::Female => f.write_str("Female"),
            Self::Unknown(v) => write!(f, "Unknown ({v})"),
        }
    }
}
