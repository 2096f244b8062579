//! Custom chipset register file ($DFF000-$DFF1FE).
//!
//! Registers are stored by word index. The SET/CLR registers (DMACON,
//! INTENA, INTREQ, ADKCON) keep their current value in the write slot; the
//! matching read registers are computed. Audio and sprite registers live in
//! their own channel state and are not part of this file.

use format_asf::{ByteReader, ByteWriter, Snapshottable, StateError};

use crate::config::Chipset;

pub const DMACONR: u16 = 0x002;
pub const VPOSR: u16 = 0x004;
pub const VHPOSR: u16 = 0x006;
pub const DSKDATR: u16 = 0x008;
pub const ADKCONR: u16 = 0x010;
pub const DSKBYTR: u16 = 0x01A;
pub const INTENAR: u16 = 0x01C;
pub const INTREQR: u16 = 0x01E;
pub const DSKPTH: u16 = 0x020;
pub const DSKPTL: u16 = 0x022;
pub const DSKLEN: u16 = 0x024;
pub const VPOSW: u16 = 0x02A;
pub const VHPOSW: u16 = 0x02C;
pub const DSKSYNC: u16 = 0x07E;
pub const DMACON: u16 = 0x096;
pub const INTENA: u16 = 0x09A;
pub const INTREQ: u16 = 0x09C;
pub const ADKCON: u16 = 0x09E;
pub const BPLCON0: u16 = 0x100;
pub const COLOR00: u16 = 0x180;
pub const BEAMCON0: u16 = 0x1DC;

pub const DMAF_SETCLR: u16 = 0x8000;
pub const DMAF_AUD0: u16 = 0x0001;
pub const DMAF_DISK: u16 = 0x0010;
pub const DMAF_SPRITE: u16 = 0x0020;
pub const DMAF_RASTER: u16 = 0x0100;
pub const DMAF_MASTER: u16 = 0x0200;

pub const INT_DSKBLK: u16 = 1;
pub const INT_PORTS: u16 = 3;
pub const INT_VERTB: u16 = 5;
pub const INT_AUD0: u16 = 7;
pub const INT_DSKSYN: u16 = 12;
pub const INT_EXTER: u16 = 13;

pub const ADKF_WORDSYNC: u16 = 0x0400;

/// Word registers in the `CHIP` chunk: 256 minus audio and sprite ranges.
pub const SAVED_REGS: usize = 256 - 32 - 48;
pub const STATE_SIZE: usize = 4 + SAVED_REGS * 2;

fn is_channel_reg(offset: u16) -> bool {
    (0x0A0..=0x0DE).contains(&offset) || (0x120..=0x17E).contains(&offset)
}

fn set_clr(reg: &mut u16, value: u16) {
    if value & 0x8000 != 0 {
        *reg |= value & 0x7FFF;
    } else {
        *reg &= !value;
    }
}

pub struct CustomRegs {
    chipset: Chipset,
    regs: [u16; 256],
    pub vpos: u16,
    /// Colour clock within the line.
    pub hpos: u16,
    pub lof: bool,
}

impl CustomRegs {
    #[must_use]
    pub fn new(chipset: Chipset) -> Self {
        Self {
            chipset,
            regs: [0; 256],
            vpos: 0,
            hpos: 0,
            lof: true,
        }
    }

    fn slot(offset: u16) -> usize {
        usize::from((offset & 0x1FE) >> 1)
    }

    /// Raw slot contents.
    #[must_use]
    pub fn get(&self, offset: u16) -> u16 {
        self.regs[Self::slot(offset)]
    }

    /// Overwrite a slot without register side effects.
    pub fn set(&mut self, offset: u16, value: u16) {
        self.regs[Self::slot(offset)] = value;
    }

    pub fn read(&self, offset: u16) -> u16 {
        match offset & 0x1FE {
            DMACONR => self.get(DMACON),
            ADKCONR => self.get(ADKCON),
            INTENAR => self.get(INTENA),
            INTREQR => self.get(INTREQ),
            VPOSR => {
                let id = match self.chipset {
                    Chipset::Ocs => 0x00,
                    Chipset::Ecs => 0x20,
                    Chipset::Aga => 0x23,
                };
                (u16::from(self.lof) << 15) | (id << 8) | ((self.vpos >> 8) & 0x07)
            }
            VHPOSR => ((self.vpos & 0xFF) << 8) | (self.hpos & 0xFF),
            off => self.get(off),
        }
    }

    pub fn write(&mut self, offset: u16, value: u16) {
        let offset = offset & 0x1FE;
        match offset {
            DMACON | INTENA | INTREQ | ADKCON => {
                set_clr(&mut self.regs[Self::slot(offset)], value);
            }
            VPOSW => {
                self.lof = value & 0x8000 != 0;
                self.vpos = (self.vpos & 0xFF) | ((value & 0x07) << 8);
            }
            VHPOSW => {
                self.vpos = (self.vpos & 0x700) | (value >> 8);
                self.hpos = value & 0xFF;
            }
            _ => self.set(offset, value),
        }
    }

    #[must_use]
    pub fn chipset(&self) -> Chipset {
        self.chipset
    }

    #[must_use]
    pub fn dmacon(&self) -> u16 {
        self.get(DMACON)
    }

    /// DMA channel enabled, master enable included.
    #[must_use]
    pub fn dma_enabled(&self, mask: u16) -> bool {
        let dmacon = self.dmacon();
        dmacon & DMAF_MASTER != 0 && dmacon & mask == mask
    }

    pub fn request_interrupt(&mut self, bit: u16) {
        self.regs[Self::slot(INTREQ)] |= 1 << bit;
    }

    #[must_use]
    pub fn intreq(&self) -> u16 {
        self.get(INTREQ)
    }

    #[must_use]
    pub fn intena(&self) -> u16 {
        self.get(INTENA)
    }

    #[must_use]
    pub fn bplcon0(&self) -> u16 {
        self.get(BPLCON0)
    }

    #[must_use]
    pub fn beamcon0(&self) -> u16 {
        self.get(BEAMCON0)
    }

    /// 12-bit colour register.
    #[must_use]
    pub fn color(&self, index: usize) -> u16 {
        self.regs[Self::slot(COLOR00) + (index & 31)] & 0x0FFF
    }

    #[must_use]
    pub fn disk_pointer(&self) -> u32 {
        (u32::from(self.get(DSKPTH)) << 16) | u32::from(self.get(DSKPTL))
    }

    pub fn set_disk_pointer(&mut self, addr: u32) {
        self.set(DSKPTH, (addr >> 16) as u16);
        self.set(DSKPTL, addr as u16);
    }
}

impl Snapshottable for CustomRegs {
    fn state_size(&self) -> Option<usize> {
        Some(STATE_SIZE)
    }

    fn save_state(&self, w: &mut ByteWriter<'_>) {
        w.write_u32(self.chipset.flags());
        for offset in (0u16..0x200).step_by(2) {
            if is_channel_reg(offset) {
                continue;
            }
            let value = match offset {
                VPOSR | VHPOSR => self.read(offset),
                _ => self.get(offset),
            };
            w.write_u16(value);
        }
    }

    fn restore_state(&mut self, r: &mut ByteReader<'_>) -> Result<(), StateError> {
        if r.remaining() < STATE_SIZE {
            return Err(StateError::Truncated {
                needed: STATE_SIZE,
                available: r.remaining(),
            });
        }
        let flags = r.read_u32();
        if flags != self.chipset.flags() {
            log::warn!(
                "CHIP: snapshot chipset flags {flags:#x}, machine has {:#x}",
                self.chipset.flags()
            );
        }
        for offset in (0u16..0x200).step_by(2) {
            if is_channel_reg(offset) {
                continue;
            }
            let value = r.read_u16();
            match offset {
                VPOSR => {
                    self.lof = value & 0x8000 != 0;
                    self.vpos = (self.vpos & 0xFF) | ((value & 0x07) << 8);
                }
                VHPOSR => {
                    self.vpos = (self.vpos & 0x700) | (value >> 8);
                    self.hpos = value & 0xFF;
                }
                _ => self.set(offset, value),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use format_asf::save_to_vec;

    #[test]
    fn setclr_registers_accumulate() {
        let mut regs = CustomRegs::new(Chipset::Ocs);
        regs.write(DMACON, DMAF_SETCLR | DMAF_MASTER | DMAF_DISK);
        regs.write(DMACON, DMAF_SETCLR | DMAF_RASTER);
        regs.write(DMACON, DMAF_DISK);
        assert_eq!(regs.read(DMACONR), DMAF_MASTER | DMAF_RASTER);
        assert!(regs.dma_enabled(DMAF_RASTER));
        assert!(!regs.dma_enabled(DMAF_DISK));
    }

    #[test]
    fn chunk_excludes_channel_registers() {
        assert_eq!(SAVED_REGS, 176);
        let regs = CustomRegs::new(Chipset::Ecs);
        let bytes = save_to_vec(&regs).expect("chip");
        assert_eq!(bytes.len(), 356);
        assert_eq!(&bytes[..4], &[0, 0, 0, 3]);
    }

    #[test]
    fn beam_position_travels_in_vposr_vhposr() {
        let mut regs = CustomRegs::new(Chipset::Ocs);
        regs.vpos = 0x12C;
        regs.hpos = 0x40;
        regs.lof = false;
        regs.write(BPLCON0, 0x9200);
        regs.write(COLOR00 + 2, 0x0F80);
        let bytes = save_to_vec(&regs).expect("chip");

        let mut back = CustomRegs::new(Chipset::Ocs);
        back.restore_state(&mut ByteReader::new(&bytes)).expect("valid");
        assert_eq!(back.vpos, 0x12C);
        assert_eq!(back.hpos, 0x40);
        assert!(!back.lof);
        assert_eq!(back.bplcon0(), 0x9200);
        assert_eq!(back.color(1), 0x0F80);
    }

    #[test]
    fn short_chunk_is_rejected() {
        let mut regs = CustomRegs::new(Chipset::Ocs);
        let err = regs.restore_state(&mut ByteReader::new(&[0; 40])).unwrap_err();
        assert_eq!(
            err,
            StateError::Truncated {
                needed: STATE_SIZE,
                available: 40
            }
        );
    }
}
