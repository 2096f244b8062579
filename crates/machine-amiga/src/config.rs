//! Configuration for the Amiga machine crate.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chipset {
    Ocs,
    Ecs,
    Aga,
}

impl Chipset {
    /// `CHIP` chunk chipset flags: bit 0 ECS Agnus, bit 1 ECS Denise, bit 2 AGA.
    #[must_use]
    pub fn flags(self) -> u32 {
        match self {
            Self::Ocs => 0,
            Self::Ecs => 0b011,
            Self::Aga => 0b111,
        }
    }

    #[must_use]
    pub fn is_aga(self) -> bool {
        self == Self::Aga
    }

    #[must_use]
    pub fn is_ecs_or_aga(self) -> bool {
        self != Self::Ocs
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuModel {
    M68000,
    M68010,
    M68020,
}

impl CpuModel {
    /// Model number as stored in the `CPU ` chunk.
    #[must_use]
    pub fn number(self) -> u32 {
        match self {
            Self::M68000 => 68000,
            Self::M68010 => 68010,
            Self::M68020 => 68020,
        }
    }

    #[must_use]
    pub fn from_number(n: u32) -> Option<Self> {
        Some(match n {
            68000 => Self::M68000,
            68010 => Self::M68010,
            68020 => Self::M68020,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Pal,
    Ntsc,
}

impl Region {
    #[must_use]
    pub fn lines_per_frame(self) -> u16 {
        match self {
            Self::Pal => 313,
            Self::Ntsc => 263,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MachineConfig {
    pub chipset: Chipset,
    pub cpu: CpuModel,
    pub region: Region,
    pub chip_ram: usize,
    /// Slow ("bogo") RAM at $C00000.
    pub bogo_ram: usize,
    pub fast_ram: usize,
    pub z3_ram: usize,
    /// Connected floppy drives, DF0: upwards (1..=4).
    pub drives: usize,
}

impl Default for MachineConfig {
    /// A500: OCS, 68000, PAL, 512K chip, one drive.
    fn default() -> Self {
        Self {
            chipset: Chipset::Ocs,
            cpu: CpuModel::M68000,
            region: Region::Pal,
            chip_ram: 512 * 1024,
            bogo_ram: 0,
            fast_ram: 0,
            z3_ram: 0,
            drives: 1,
        }
    }
}

impl MachineConfig {
    /// A1200: AGA, 68020, 2MB chip.
    #[must_use]
    pub fn a1200() -> Self {
        Self {
            chipset: Chipset::Aga,
            cpu: CpuModel::M68020,
            chip_ram: 2 * 1024 * 1024,
            ..Self::default()
        }
    }
}
