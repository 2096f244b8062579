//! Sprite channel registers ($120-$17E, `SPRn` chunks).

use format_asf::{ByteReader, ByteWriter, Snapshottable, StateError};

const STATE_SIZE: usize = 4 + 2 * 4 + 3 * 4 + 1;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpriteChannel {
    pub pt: u32,
    pub pos: u16,
    pub ctl: u16,
    pub data: u16,
    pub datb: u16,
    /// Extra AGA data words for 32/64-pixel sprites.
    pub data_wide: [u16; 3],
    pub datb_wide: [u16; 3],
    pub armed: bool,
}

impl SpriteChannel {
    /// Register write at `reg` (offset within $140+n*8: 0 POS, 2 CTL, 4 DATA,
    /// 6 DATB).
    pub fn write(&mut self, reg: u16, value: u16) {
        match reg & 6 {
            0 => self.pos = value,
            2 => {
                self.ctl = value;
                self.armed = false;
            }
            4 => {
                self.data = value;
                self.armed = true;
            }
            _ => self.datb = value,
        }
    }

    pub fn write_pointer(&mut self, high: bool, value: u16) {
        self.pt = if high {
            (self.pt & 0xFFFF) | (u32::from(value) << 16)
        } else {
            (self.pt & 0xFFFF_0000) | u32::from(value & 0xFFFE)
        };
    }
}

impl Snapshottable for SpriteChannel {
    fn state_size(&self) -> Option<usize> {
        Some(STATE_SIZE)
    }

    fn save_state(&self, w: &mut ByteWriter<'_>) {
        w.write_u32(self.pt);
        w.write_u16(self.pos);
        w.write_u16(self.ctl);
        w.write_u16(self.data);
        w.write_u16(self.datb);
        for i in 0..3 {
            w.write_u16(self.data_wide[i]);
            w.write_u16(self.datb_wide[i]);
        }
        w.write_bool(self.armed);
    }

    fn restore_state(&mut self, r: &mut ByteReader<'_>) -> Result<(), StateError> {
        if r.remaining() < STATE_SIZE {
            return Err(StateError::Truncated {
                needed: STATE_SIZE,
                available: r.remaining(),
            });
        }
        self.pt = r.read_u32();
        self.pos = r.read_u16();
        self.ctl = r.read_u16();
        self.data = r.read_u16();
        self.datb = r.read_u16();
        for i in 0..3 {
            self.data_wide[i] = r.read_u16();
            self.datb_wide[i] = r.read_u16();
        }
        self.armed = r.read_bool();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use format_asf::save_to_vec;

    #[test]
    fn ctl_disarms_and_data_arms() {
        let mut spr = SpriteChannel::default();
        spr.write(4, 0xF0F0);
        assert!(spr.armed);
        spr.write(2, 0x3A00);
        assert!(!spr.armed);
        assert_eq!(spr.ctl, 0x3A00);
    }

    #[test]
    fn state_survives_save_and_restore() {
        let mut spr = SpriteChannel::default();
        spr.write_pointer(true, 0x0001);
        spr.write_pointer(false, 0x2345);
        spr.write(0, 0x2C40);
        spr.write(4, 0x8001);
        spr.datb_wide[2] = 0x1111;
        let bytes = save_to_vec(&spr).expect("sprite");
        assert_eq!(bytes.len(), 25);

        let mut back = SpriteChannel::default();
        back.restore_state(&mut ByteReader::new(&bytes)).expect("valid");
        assert_eq!(back, spr);
        assert_eq!(back.pt, 0x0001_2344);
    }
}
