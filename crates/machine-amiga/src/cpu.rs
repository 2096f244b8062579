//! 680x0 register file as carried in the `CPU ` chunk.
//!
//! Instruction execution is outside this crate; the register file is what a
//! snapshot needs to carry.

use format_asf::{ByteReader, ByteWriter, Snapshottable, StateError};

use crate::config::CpuModel;

const BASE_SIZE: usize = 4 + 4 + 16 * 4 + 5 * 4 + 2 + 4;
const M68010_EXTRA: usize = 3 * 4;
const M68020_EXTRA: usize = 3 * 4;

const RUN_HALTED: u32 = 0x01;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuState {
    pub model: CpuModel,
    pub d: [u32; 8],
    pub a: [u32; 8],
    pub pc: u32,
    pub prefetch_pc: u32,
    pub prefetch: u32,
    pub usp: u32,
    pub isp: u32,
    pub sr: u16,
    pub halted: bool,
    // 68010+
    pub dfc: u32,
    pub sfc: u32,
    pub vbr: u32,
    // 68020
    pub caar: u32,
    pub cacr: u32,
    pub msp: u32,
}

impl CpuState {
    #[must_use]
    pub fn new(model: CpuModel) -> Self {
        Self {
            model,
            d: [0; 8],
            a: [0; 8],
            pc: 0,
            prefetch_pc: 0,
            prefetch: 0,
            usp: 0,
            isp: 0,
            sr: 0x2700,
            halted: false,
            dfc: 0,
            sfc: 0,
            vbr: 0,
            caar: 0,
            cacr: 0,
            msp: 0,
        }
    }

    /// Load SSP and PC from the reset vectors.
    pub fn reset_to(&mut self, ssp: u32, pc: u32) {
        self.a[7] = ssp;
        self.isp = ssp;
        self.pc = pc;
        self.prefetch_pc = pc;
        self.sr = 0x2700;
        self.halted = false;
    }

    /// Interrupt priority mask from SR.
    #[must_use]
    pub fn ipl_mask(&self) -> u8 {
        ((self.sr >> 8) & 7) as u8
    }

    fn size_for(model: CpuModel) -> usize {
        match model {
            CpuModel::M68000 => BASE_SIZE,
            CpuModel::M68010 => BASE_SIZE + M68010_EXTRA,
            CpuModel::M68020 => BASE_SIZE + M68010_EXTRA + M68020_EXTRA,
        }
    }
}

impl Snapshottable for CpuState {
    fn state_size(&self) -> Option<usize> {
        Some(Self::size_for(self.model))
    }

    fn save_state(&self, w: &mut ByteWriter<'_>) {
        w.write_u32(self.model.number());
        w.write_u32(0);
        for &r in self.d.iter().chain(&self.a) {
            w.write_u32(r);
        }
        w.write_u32(self.pc);
        w.write_u32(self.prefetch_pc);
        w.write_u32(self.prefetch);
        w.write_u32(self.usp);
        w.write_u32(self.isp);
        w.write_u16(self.sr);
        w.write_u32(if self.halted { RUN_HALTED } else { 0 });
        if self.model != CpuModel::M68000 {
            w.write_u32(self.dfc);
            w.write_u32(self.sfc);
            w.write_u32(self.vbr);
        }
        if self.model == CpuModel::M68020 {
            w.write_u32(self.caar);
            w.write_u32(self.cacr);
            w.write_u32(self.msp);
        }
    }

    fn restore_state(&mut self, r: &mut ByteReader<'_>) -> Result<(), StateError> {
        let number = r.read_u32();
        let model = CpuModel::from_number(number).ok_or(StateError::Unsupported {
            what: "CPU model",
            value: number,
        })?;
        let needed = Self::size_for(model) - 4;
        if r.remaining() < needed {
            return Err(StateError::Truncated {
                needed,
                available: r.remaining(),
            });
        }
        if model != self.model {
            log::warn!("CPU: snapshot is for a {number}, running one");
        }
        self.model = model;
        let _flags = r.read_u32();
        for reg in self.d.iter_mut().chain(self.a.iter_mut()) {
            *reg = r.read_u32();
        }
        self.pc = r.read_u32();
        self.prefetch_pc = r.read_u32();
        self.prefetch = r.read_u32();
        self.usp = r.read_u32();
        self.isp = r.read_u32();
        self.sr = r.read_u16();
        self.halted = r.read_u32() & RUN_HALTED != 0;
        if model != CpuModel::M68000 {
            self.dfc = r.read_u32();
            self.sfc = r.read_u32();
            self.vbr = r.read_u32();
        }
        if model == CpuModel::M68020 {
            self.caar = r.read_u32();
            self.cacr = r.read_u32();
            self.msp = r.read_u32();
        }
        Ok(())
    }
}
