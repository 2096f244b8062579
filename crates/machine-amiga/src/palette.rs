//! AGA 256-entry 24-bit palette (`AGAC` chunk).

use format_asf::{ByteReader, ByteWriter, Snapshottable, StateError};

pub const AGA_COLORS: usize = 256;
const STATE_SIZE: usize = AGA_COLORS * 4;

/// Expand a 12-bit OCS colour to 0x00RRGGBB.
#[must_use]
pub fn expand_rgb12(value: u16) -> u32 {
    let r = u32::from((value >> 8) & 0xF);
    let g = u32::from((value >> 4) & 0xF);
    let b = u32::from(value & 0xF);
    (r * 0x11) << 16 | (g * 0x11) << 8 | (b * 0x11)
}

pub struct AgaPalette {
    pub colors: [u32; AGA_COLORS],
}

impl AgaPalette {
    #[must_use]
    pub fn new() -> Self {
        Self {
            colors: [0; AGA_COLORS],
        }
    }
}

impl Default for AgaPalette {
    fn default() -> Self {
        Self::new()
    }
}

impl Snapshottable for AgaPalette {
    fn state_size(&self) -> Option<usize> {
        Some(STATE_SIZE)
    }

    fn save_state(&self, w: &mut ByteWriter<'_>) {
        for &c in &self.colors {
            w.write_u32(c);
        }
    }

    fn restore_state(&mut self, r: &mut ByteReader<'_>) -> Result<(), StateError> {
        if r.remaining() < STATE_SIZE {
            return Err(StateError::Truncated {
                needed: STATE_SIZE,
                available: r.remaining(),
            });
        }
        for c in &mut self.colors {
            *c = r.read_u32() & 0x00FF_FFFF;
        }
        Ok(())
    }
}
