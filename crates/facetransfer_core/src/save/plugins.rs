use serde::Serialize;

use crate::error::{CoreError, Result};
use crate::reader::{ByteReader, ByteWriter};

/// Load order as stored in the plugin-info block. A form whose top byte is
/// `n` (other than 0x00 and 0xFF) belongs to `names[n - 1]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PluginList {
    pub names: Vec<String>,
    /// Bytes inside the block after the last name, kept verbatim.
    pub trailing: Vec<u8>,
}

impl PluginList {
    pub fn new(names: Vec<String>) -> Self {
        Self {
            names,
            trailing: Vec::new(),
        }
    }

    /// Decodes the whole block framed by `plugin_info_size`.
    pub fn decode(block: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(block);
        let count = r.read_u8()?;
        let mut names = Vec::with_capacity(count as usize);
        for _ in 0..count {
            names.push(r.read_wstring()?);
        }
        Ok(Self {
            names,
            trailing: r.read_rest().to_vec(),
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let count = u8::try_from(self.names.len()).map_err(|_| {
            CoreError::corrupt(0, format!("{} plugins exceed the u8 count", self.names.len()))
        })?;
        let mut w = ByteWriter::new();
        w.put_u8(count);
        for name in &self.names {
            w.put_wstring(name)?;
        }
        w.put_bytes(&self.trailing);
        Ok(w.into_inner())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
