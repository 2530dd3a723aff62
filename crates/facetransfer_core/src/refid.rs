//! Packed 3-byte reference ids and their resolution against a save's
//! formID array and plugin list.

use std::fmt;

use serde::Serialize;

use crate::error::{CoreError, Result};
use crate::primitives::decode_bytes;

pub const REFID_LEN: usize = 3;

const PAYLOAD_MASK: u32 = 0x003F_FFFF;
const RUNTIME_PREFIX: u32 = 0xFF00_0000;
const DISC_PLUGIN_INDEXED: u8 = 0;
const DISC_MAIN_GAME: u8 = 1;
const DISC_RUNTIME: u8 = 2;
/// Load-order byte shared by every light plugin; never a plugin-list slot.
const LIGHT_PLUGIN_SLOT: u32 = 0xFE;

/// A reference id as stored inside a changeform: a 2-bit discriminant in the
/// top of the first byte and a 22-bit big-endian payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RefId {
    /// 1-based index into the formID array; 0 is the null form.
    PluginIndexed(u32),
    /// The literal form id of a main-game form.
    MainGame(u32),
    /// Payload of a runtime-created form (`0xFF000000 | payload`).
    RuntimeCreated(u32),
}

impl RefId {
    pub const NULL: RefId = RefId::PluginIndexed(0);

    /// The player's base actor form.
    pub const PLAYER_BASE: RefId = RefId::MainGame(0x7);
    /// The player's placed reference.
    pub const PLAYER_REF: RefId = RefId::MainGame(0x14);

    pub fn from_bytes(bytes: [u8; REFID_LEN], offset: usize) -> Result<Self> {
        let payload =
            ((bytes[0] as u32 & 0x3F) << 16) | ((bytes[1] as u32) << 8) | bytes[2] as u32;
        match bytes[0] >> 6 {
            DISC_PLUGIN_INDEXED => Ok(Self::PluginIndexed(payload)),
            DISC_MAIN_GAME => Ok(Self::MainGame(payload)),
            DISC_RUNTIME => Ok(Self::RuntimeCreated(payload)),
            _ => Err(CoreError::InvalidDiscriminant { offset }),
        }
    }

    pub fn decode(buf: &[u8], offset: usize) -> Result<(Self, usize)> {
        let (raw, n) = decode_bytes(buf, offset, REFID_LEN)?;
        let bytes = [raw[0], raw[1], raw[2]];
        Ok((Self::from_bytes(bytes, offset)?, n))
    }

    pub fn to_bytes(&self) -> [u8; REFID_LEN] {
        let (disc, payload) = match *self {
            Self::PluginIndexed(p) => (DISC_PLUGIN_INDEXED, p),
            Self::MainGame(p) => (DISC_MAIN_GAME, p),
            Self::RuntimeCreated(p) => (DISC_RUNTIME, p),
        };
        debug_assert!(payload <= PAYLOAD_MASK, "ref id payload exceeds 22 bits");
        [
            disc << 6 | ((payload >> 16) as u8 & 0x3F),
            (payload >> 8) as u8,
            payload as u8,
        ]
    }

    /// Numeric form id, looking plugin-indexed refs up in `form_ids`.
    pub fn form_id(&self, form_ids: &[u32]) -> Result<u32> {
        match *self {
            Self::PluginIndexed(0) => Ok(0),
            Self::PluginIndexed(index) => form_ids
                .get(index as usize - 1)
                .copied()
                .ok_or(CoreError::FormIdOutOfRange {
                    index: index as usize,
                    len: form_ids.len(),
                }),
            Self::MainGame(id) => Ok(id),
            Self::RuntimeCreated(payload) => Ok(RUNTIME_PREFIX | payload),
        }
    }
}

impl fmt::Display for RefId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::PluginIndexed(i) => write!(f, "#{i}"),
            Self::MainGame(id) => write!(f, "{id:08x}"),
            Self::RuntimeCreated(p) => write!(f, "{:08x}", RUNTIME_PREFIX | p),
        }
    }
}

/// A form id attributed to its owner. `plugin` is `None` for main-game and
/// runtime-created forms; otherwise `form_id` has the load-order byte cleared.
///
/// A form whose load-order byte names no entry of the plugin list (light
/// plugins in slot 0xFE, or a short list) keeps its full id with `plugin`
/// set to `None`. See [`is_unattributed`](Self::is_unattributed).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ResolvedFormId {
    pub plugin: Option<String>,
    pub form_id: u32,
}

impl ResolvedFormId {
    /// True when the owning plugin could not be named.
    pub fn is_unattributed(&self) -> bool {
        self.plugin.is_none() && !matches!(self.form_id >> 24, 0x00 | 0xFF)
    }

    fn unattributed_label(&self) -> String {
        format!("<unlisted load order {:#04x}>", self.form_id >> 24)
    }
}

impl fmt::Display for ResolvedFormId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.plugin {
            Some(plugin) => write!(f, "{plugin}:{:06x}", self.form_id),
            None => write!(f, "{:08x}", self.form_id),
        }
    }
}

/// An embedded reference kept both as stored and as resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormRef {
    pub raw: RefId,
    pub resolved: ResolvedFormId,
}

impl fmt::Display for FormRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.resolved, self.raw)
    }
}

/// The per-file tables a ref id is resolved against. Borrowed read-only.
#[derive(Debug, Clone, Copy)]
pub struct FormContext<'a> {
    pub plugins: &'a [String],
    pub form_ids: &'a [u32],
}

impl<'a> FormContext<'a> {
    pub fn new(plugins: &'a [String], form_ids: &'a [u32]) -> Self {
        Self { plugins, form_ids }
    }

    /// Attributes `raw` to its owner. Only an out-of-range formID index
    /// fails; a load-order byte with no listed plugin resolves unattributed.
    pub fn resolve(&self, raw: RefId) -> Result<ResolvedFormId> {
        let full = raw.form_id(self.form_ids)?;
        let plugin = match full >> 24 {
            0x00 | 0xFF | LIGHT_PLUGIN_SLOT => None,
            load_order => self.plugins.get(load_order as usize - 1),
        };
        Ok(match plugin {
            Some(plugin) => ResolvedFormId {
                plugin: Some(plugin.clone()),
                form_id: full & 0x00FF_FFFF,
            },
            None => ResolvedFormId {
                plugin: None,
                form_id: full,
            },
        })
    }

    pub fn resolve_bytes(&self, bytes: [u8; REFID_LEN], offset: usize) -> Result<FormRef> {
        let raw = RefId::from_bytes(bytes, offset)?;
        Ok(FormRef {
            raw,
            resolved: self.resolve(raw)?,
        })
    }

    /// Inverse of [`resolve`](Self::resolve) for this file's tables.
    pub fn encode(&self, resolved: &ResolvedFormId) -> Result<RefId> {
        if resolved.is_unattributed() {
            return Err(CoreError::MissingPlugin {
                plugin: resolved.unattributed_label(),
            });
        }
        let full = match &resolved.plugin {
            None => resolved.form_id,
            Some(name) => {
                let index = self
                    .plugins
                    .iter()
                    .position(|p| p.eq_ignore_ascii_case(name))
                    .filter(|&i| i + 1 < LIGHT_PLUGIN_SLOT as usize)
                    .ok_or_else(|| CoreError::MissingPlugin {
                        plugin: name.clone(),
                    })?;
                ((index as u32 + 1) << 24) | (resolved.form_id & 0x00FF_FFFF)
            }
        };

        if full == 0 {
            return Ok(RefId::NULL);
        }
        if full >> 24 == 0 && full <= PAYLOAD_MASK {
            return Ok(RefId::MainGame(full));
        }
        if full & RUNTIME_PREFIX == RUNTIME_PREFIX && full & !RUNTIME_PREFIX <= PAYLOAD_MASK {
            return Ok(RefId::RuntimeCreated(full & PAYLOAD_MASK));
        }

        self.form_ids
            .iter()
            .position(|&id| id == full)
            .map(|pos| RefId::PluginIndexed(pos as u32 + 1))
            .ok_or_else(|| CoreError::UnmappedForm {
                plugin: resolved.plugin.clone(),
                form_id: resolved.form_id,
            })
    }

    /// Re-expresses `form` in this file's tables, keeping the stored bytes
    /// whenever they already point at the same form here. An unattributed
    /// form cannot be matched across load orders and fails with
    /// `MissingPlugin`.
    pub fn rebind(&self, form: &FormRef) -> Result<FormRef> {
        if form.resolved.is_unattributed() {
            return Err(CoreError::MissingPlugin {
                plugin: form.resolved.unattributed_label(),
            });
        }
        if let Ok(here) = self.resolve(form.raw)
            && here == form.resolved
        {
            return Ok(form.clone());
        }
        Ok(FormRef {
            raw: self.encode(&form.resolved)?,
            resolved: form.resolved.clone(),
        })
    }
}
