//! The `ASF ` header chunk.

use crate::codec::{ByteReader, ByteWriter};
use crate::state::{Snapshottable, StateError};

/// Reserved header version. Always written as zero.
pub const ASF_VERSION: u32 = 0;

/// Identification block at the start of every snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AsfHeader {
    pub version: u32,
    pub emulator: String,
    pub emulator_version: String,
    pub description: String,
}

impl AsfHeader {
    #[must_use]
    pub fn new(emulator: &str, emulator_version: &str, description: &str) -> Self {
        Self {
            version: ASF_VERSION,
            emulator: emulator.to_owned(),
            emulator_version: emulator_version.to_owned(),
            description: description.to_owned(),
        }
    }
}

fn cstr_len(text: &str) -> usize {
    text.bytes().position(|b| b == 0).unwrap_or(text.len()) + 1
}

impl Snapshottable for AsfHeader {
    fn state_size(&self) -> Option<usize> {
        Some(
            4 + cstr_len(&self.emulator)
                + cstr_len(&self.emulator_version)
                + cstr_len(&self.description),
        )
    }

    fn save_state(&self, w: &mut ByteWriter<'_>) {
        w.write_u32(self.version);
        w.write_string(&self.emulator);
        w.write_string(&self.emulator_version);
        w.write_string(&self.description);
    }

    fn restore_state(&mut self, r: &mut ByteReader<'_>) -> Result<(), StateError> {
        if r.remaining() < 4 {
            return Err(StateError::Truncated {
                needed: 4,
                available: r.remaining(),
            });
        }
        self.version = r.read_u32();
        self.emulator = r.read_string();
        self.emulator_version = r.read_string();
        self.description = r.read_string();
        Ok(())
    }
}
