//! Paula audio channel DMA state (`AUDn` chunks).
//!
//! Each running channel fetches one word per period. `evtime` holds the
//! cycles left until the next fetch, measured from the audio event's last
//! processed cycle. The machine keeps one scheduler entry for all four
//! channels, due at the smallest `evtime`.

use format_asf::{ByteReader, ByteWriter, Snapshottable, StateError};

const STATE_SIZE: usize = 24;

/// Lowest period DMA can sustain, in colour clocks.
pub const MIN_PERIOD: u16 = 124;

const STATE_IDLE: u8 = 0;
const STATE_RUNNING: u8 = 1;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioChannel {
    pub state: u8,
    pub vol: u8,
    /// Interrupt raised and not yet taken.
    pub irq: bool,
    /// A data word is waiting in AUDxDAT.
    pub data_written: bool,
    /// Words left in the current pass.
    pub len: u16,
    /// AUDxLEN as written.
    pub audlen: u16,
    pub per: u16,
    pub audper: u16,
    pub lc: u32,
    pub audlc: u32,
    pub evtime: u32,
}

impl AudioChannel {
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state != STATE_IDLE
    }

    /// Register write at `reg` (offset within $0A0+n*16).
    pub fn write(&mut self, reg: u16, value: u16) {
        match reg & 0xE {
            0x0 => self.audlc = (self.audlc & 0xFFFF) | (u32::from(value & 0x1F) << 16),
            0x2 => self.audlc = (self.audlc & 0xFFFF_0000) | u32::from(value & 0xFFFE),
            0x4 => self.audlen = value,
            0x6 => self.audper = value,
            0x8 => self.vol = (value & 0x7F).min(64) as u8,
            0xA => self.data_written = true,
            _ => {}
        }
    }

    /// CPU cycles per fetch.
    #[must_use]
    pub fn period_cycles(&self) -> u32 {
        u32::from(self.per.max(MIN_PERIOD)) * 2
    }

    /// DMA switched on: load the location and length, raise the start
    /// interrupt.
    pub fn start(&mut self) {
        self.state = STATE_RUNNING;
        self.lc = self.audlc;
        self.len = self.audlen;
        self.per = self.audper;
        self.evtime = self.period_cycles();
        self.irq = true;
    }

    pub fn stop(&mut self) {
        self.state = STATE_IDLE;
        self.evtime = 0;
        self.data_written = false;
    }

    /// Run the channel for `cycles`. Returns true when the sample pass
    /// wrapped and the channel interrupt should be raised.
    pub fn advance(&mut self, cycles: u64) -> bool {
        if !self.is_running() {
            return false;
        }
        let mut left = cycles;
        let mut wrapped = false;
        while left >= u64::from(self.evtime) {
            left -= u64::from(self.evtime);
            wrapped |= self.fetch();
            self.per = self.audper;
            self.evtime = self.period_cycles();
        }
        self.evtime -= left as u32;
        if wrapped {
            self.irq = true;
        }
        wrapped
    }

    fn fetch(&mut self) -> bool {
        self.lc = self.lc.wrapping_add(2);
        self.len = self.len.wrapping_sub(1);
        if self.len == 0 {
            self.lc = self.audlc;
            self.len = self.audlen;
            true
        } else {
            false
        }
    }
}

impl Snapshottable for AudioChannel {
    fn state_size(&self) -> Option<usize> {
        Some(STATE_SIZE)
    }

    fn save_state(&self, w: &mut ByteWriter<'_>) {
        w.write_u8(self.state);
        w.write_u8(self.vol);
        w.write_bool(self.irq);
        w.write_bool(self.data_written);
        w.write_u16(self.len);
        w.write_u16(self.audlen);
        w.write_u16(self.per);
        w.write_u16(self.audper);
        w.write_u32(self.lc);
        w.write_u32(self.audlc);
        w.write_u32(self.evtime);
    }

    fn restore_state(&mut self, r: &mut ByteReader<'_>) -> Result<(), StateError> {
        if r.remaining() < STATE_SIZE {
            return Err(StateError::Truncated {
                needed: STATE_SIZE,
                available: r.remaining(),
            });
        }
        let state = r.read_u8();
        if state > STATE_RUNNING {
            return Err(StateError::Unsupported {
                what: "audio channel state",
                value: u32::from(state),
            });
        }
        self.state = state;
        self.vol = r.read_u8();
        self.irq = r.read_bool();
        self.data_written = r.read_bool();
        self.len = r.read_u16();
        self.audlen = r.read_u16();
        self.per = r.read_u16();
        self.audper = r.read_u16();
        self.lc = r.read_u32();
        self.audlc = r.read_u32();
        self.evtime = r.read_u32();
        if self.is_running() && self.evtime == 0 {
            // A running channel always has a fetch ahead of it.
            self.evtime = self.period_cycles();
        }
        Ok(())
    }
}
