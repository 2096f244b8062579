//! Autoconfig board bases (`EXPA` chunk).

use format_asf::{ByteReader, ByteWriter, Snapshottable, StateError};

pub const FAST_RAM_BASE: u32 = 0x0020_0000;
pub const Z3_RAM_BASE: u32 = 0x4000_0000;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Expansion {
    pub fast_base: u32,
    pub z3_base: u32,
}

impl Expansion {
    /// Bases as autoconfig assigns them for the given board sizes.
    #[must_use]
    pub fn configured(fast_ram: usize, z3_ram: usize) -> Self {
        Self {
            fast_base: if fast_ram > 0 { FAST_RAM_BASE } else { 0 },
            z3_base: if z3_ram > 0 { Z3_RAM_BASE } else { 0 },
        }
    }
}

impl Snapshottable for Expansion {
    fn state_size(&self) -> Option<usize> {
        Some(8)
    }

    fn save_state(&self, w: &mut ByteWriter<'_>) {
        w.write_u32(self.fast_base);
        w.write_u32(self.z3_base);
    }

    fn restore_state(&mut self, r: &mut ByteReader<'_>) -> Result<(), StateError> {
        if r.remaining() < 8 {
            return Err(StateError::Truncated {
                needed: 8,
                available: r.remaining(),
            });
        }
        self.fast_base = r.read_u32();
        self.z3_base = r.read_u32();
        Ok(())
    }
}
