//! Paula's disk controller: the serial shifter between the selected drive
//! and the DSKDATR/DSKBYTR registers.
//!
//! Bits arrive every 2µs, which is 7 colour clocks. A line of 227 colour
//! clocks therefore takes 32 or 33 bits; the leftover phase carries into
//! the next line through `next_hpos`.

use format_asf::{ByteReader, ByteWriter, Snapshottable, StateError};

use crate::AmigaFloppyDrive;

const CCK_PER_LINE: u32 = 227;
const CCK_PER_BIT: u32 = 7;
const STATE_SIZE: usize = 6;

/// DSKLEN write sequence. DMA starts on the second write with DMAEN set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaState {
    Off,
    Armed,
    Read,
    Write,
}

impl DmaState {
    fn to_u8(self) -> u8 {
        match self {
            Self::Off => 0,
            Self::Armed => 1,
            Self::Read => 2,
            Self::Write => 3,
        }
    }

    fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::Off,
            1 => Self::Armed,
            2 => Self::Read,
            3 => Self::Write,
            _ => return None,
        })
    }
}

/// What one line of shifting produced.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LineEvents {
    /// Last complete word assembled this line.
    pub word: Option<u16>,
    /// DSKSYNC matched at least once.
    pub sync: bool,
}

pub struct DiskController {
    word: u16,
    bit_offset: u8,
    sync_found: bool,
    next_hpos: u8,
    dma: DmaState,
}

impl DiskController {
    #[must_use]
    pub fn new() -> Self {
        Self {
            word: 0,
            bit_offset: 0,
            sync_found: false,
            next_hpos: 0,
            dma: DmaState::Off,
        }
    }

    pub fn write_dsklen(&mut self, value: u16) {
        self.dma = if value & 0x8000 == 0 {
            DmaState::Off
        } else if self.dma == DmaState::Off {
            DmaState::Armed
        } else if value & 0x4000 != 0 {
            DmaState::Write
        } else {
            DmaState::Read
        };
        self.sync_found = false;
    }

    /// Shift one line's worth of bits from `drive`.
    pub fn clock_line(&mut self, drive: &mut AmigaFloppyDrive, sync_word: u16) -> LineEvents {
        let mut events = LineEvents::default();
        let mut hpos = u32::from(self.next_hpos);
        while hpos < CCK_PER_LINE {
            self.word = (self.word << 1) | u16::from(drive.next_bit());
            self.bit_offset = (self.bit_offset + 1) & 15;
            if self.word == sync_word {
                self.sync_found = true;
                self.bit_offset = 0;
                events.sync = true;
            }
            if self.bit_offset == 0 {
                events.word = Some(self.word);
            }
            hpos += CCK_PER_BIT;
        }
        self.next_hpos = (hpos - CCK_PER_LINE) as u8;
        events
    }

    #[must_use]
    pub fn dma(&self) -> DmaState {
        self.dma
    }

    #[must_use]
    pub fn word(&self) -> u16 {
        self.word
    }

    #[must_use]
    pub fn sync_found(&self) -> bool {
        self.sync_found
    }
}

impl Default for DiskController {
    fn default() -> Self {
        Self::new()
    }
}

impl Snapshottable for DiskController {
    fn state_size(&self) -> Option<usize> {
        Some(STATE_SIZE)
    }

    fn save_state(&self, w: &mut ByteWriter<'_>) {
        w.write_u16(self.word);
        w.write_u8(self.bit_offset);
        w.write_bool(self.sync_found);
        w.write_u8(self.next_hpos);
        w.write_u8(self.dma.to_u8());
    }

    fn restore_state(&mut self, r: &mut ByteReader<'_>) -> Result<(), StateError> {
        if r.remaining() < STATE_SIZE {
            return Err(StateError::Truncated {
                needed: STATE_SIZE,
                available: r.remaining(),
            });
        }
        self.word = r.read_u16();
        self.bit_offset = r.read_u8() & 15;
        self.sync_found = r.read_bool();
        self.next_hpos = (u32::from(r.read_u8()) % CCK_PER_BIT) as u8;
        let dma = r.read_u8();
        self.dma = DmaState::from_u8(dma).ok_or(StateError::Unsupported {
            what: "DSKLEN state",
            value: u32::from(dma),
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DiskImage;
    use format_asf::save_to_vec;

    fn spinning_drive(fill: u8) -> AmigaFloppyDrive {
        let mut drive = AmigaFloppyDrive::new();
        drive.insert_disk(DiskImage::new("t.adf", vec![fill; 4096]));
        drive.update_control(false, false, false, true, true);
        drive
    }

    #[test]
    fn dma_needs_two_writes() {
        let mut ctl = DiskController::new();
        ctl.write_dsklen(0x8000 | 0x1000);
        assert_eq!(ctl.dma(), DmaState::Armed);
        ctl.write_dsklen(0x8000 | 0x1000);
        assert_eq!(ctl.dma(), DmaState::Read);
        ctl.write_dsklen(0);
        assert_eq!(ctl.dma(), DmaState::Off);
    }

    #[test]
    fn line_phase_carries_over() {
        let mut ctl = DiskController::new();
        let mut drive = spinning_drive(0);
        ctl.clock_line(&mut drive, 0x4489);
        assert_eq!(drive.bit_pos(), 33);
        ctl.clock_line(&mut drive, 0x4489);
        assert_eq!(drive.bit_pos(), 65);
    }

    #[test]
    fn sync_word_is_detected() {
        let mut ctl = DiskController::new();
        let mut drive = AmigaFloppyDrive::new();
        drive.insert_disk(DiskImage::new("sync.adf", vec![0x44, 0x89, 0x00, 0x00]));
        drive.update_control(false, false, false, true, true);
        let events = ctl.clock_line(&mut drive, 0x4489);
        assert!(events.sync);
        assert!(ctl.sync_found());
    }

    #[test]
    fn state_survives_save_and_restore() {
        let mut ctl = DiskController::new();
        let mut drive = spinning_drive(0x5A);
        ctl.write_dsklen(0x8000);
        ctl.write_dsklen(0xC000);
        ctl.clock_line(&mut drive, 0x4489);
        let bytes = save_to_vec(&ctl).expect("controller");

        let mut back = DiskController::new();
        back.restore_state(&mut ByteReader::new(&bytes))
            .expect("valid");
        assert_eq!(back.dma(), DmaState::Write);
        assert_eq!(back.word(), ctl.word());
        assert_eq!(save_to_vec(&back).expect("controller"), bytes);
    }

    #[test]
    fn unknown_dma_state_is_rejected() {
        let mut back = DiskController::new();
        let bytes = [0, 0, 0, 0, 0, 9];
        assert!(back.restore_state(&mut ByteReader::new(&bytes)).is_err());
    }
}
