//! RAM banks: chip, slow ("bogo"), Zorro II fast and Zorro III fast.

use amiga_savestate::{RamLayout, SnapshotState};
use format_asf::RamRegion;
use log::info;

pub const CHIP_RAM_BASE: u32 = 0x00_0000;
pub const BOGO_RAM_BASE: u32 = 0xC0_0000;
const BOGO_RAM_END: u32 = 0xE0_0000;

pub struct MemoryBanks {
    banks: [Vec<u8>; 4],
    /// Sizes from the machine configuration.
    configured: [usize; 4],
    /// Zorro II fast RAM base, assigned by autoconfig.
    pub fast_base: u32,
}

impl MemoryBanks {
    #[must_use]
    pub fn new(chip: usize, bogo: usize, fast: usize, z3: usize) -> Self {
        let configured = [chip, bogo, fast, z3];
        Self {
            banks: configured.map(|size| vec![0; size]),
            configured,
            fast_base: 0,
        }
    }

    /// Size every bank from the configuration, or from `layout` while a
    /// restore is in progress. Banks whose size does not change keep their
    /// contents.
    pub fn allocate(&mut self, layout: &RamLayout, state: SnapshotState) {
        for region in RamRegion::ALL {
            let i = region.index();
            let size = match state {
                SnapshotState::Restoring => layout.size(region).unwrap_or(self.configured[i]),
                SnapshotState::Idle => self.configured[i],
            };
            if self.banks[i].len() != size {
                info!(
                    "{}: resizing {} -> {} bytes",
                    region.chunk_id(),
                    self.banks[i].len(),
                    size
                );
                self.banks[i] = vec![0; size];
            }
        }
    }

    #[must_use]
    pub fn bank(&self, region: RamRegion) -> &[u8] {
        &self.banks[region.index()]
    }

    pub fn bank_mut(&mut self, region: RamRegion) -> &mut [u8] {
        &mut self.banks[region.index()]
    }

    /// Map a CPU address to a bank and offset.
    fn decode(&self, addr: u32) -> Option<(usize, usize)> {
        let addr = addr & 0xFF_FFFF;
        let chip = &self.banks[RamRegion::Chip.index()];
        let bogo = &self.banks[RamRegion::Bogo.index()];
        let fast = &self.banks[RamRegion::Fast.index()];
        if (addr as usize) < chip.len() {
            Some((RamRegion::Chip.index(), addr as usize))
        } else if (BOGO_RAM_BASE..BOGO_RAM_END).contains(&addr) && !bogo.is_empty() {
            // Slow RAM mirrors through its window.
            let offset = (addr - BOGO_RAM_BASE) as usize % bogo.len();
            Some((RamRegion::Bogo.index(), offset))
        } else if self.fast_base != 0
            && addr >= self.fast_base
            && ((addr - self.fast_base) as usize) < fast.len()
        {
            Some((RamRegion::Fast.index(), (addr - self.fast_base) as usize))
        } else {
            None
        }
    }

    #[must_use]
    pub fn read_byte(&self, addr: u32) -> u8 {
        self.decode(addr)
            .map_or(0xFF, |(bank, offset)| self.banks[bank][offset])
    }

    pub fn write_byte(&mut self, addr: u32, value: u8) {
        if let Some((bank, offset)) = self.decode(addr) {
            self.banks[bank][offset] = value;
        }
    }

    #[must_use]
    pub fn read_word(&self, addr: u32) -> u16 {
        u16::from_be_bytes([self.read_byte(addr), self.read_byte(addr.wrapping_add(1))])
    }

    pub fn write_word(&mut self, addr: u32, value: u16) {
        let [hi, lo] = value.to_be_bytes();
        self.write_byte(addr, hi);
        self.write_byte(addr.wrapping_add(1), lo);
    }

    /// Chip RAM as seen by DMA: the address wraps at the installed size.
    pub fn write_chip_word(&mut self, addr: u32, value: u16) {
        let chip = &mut self.banks[RamRegion::Chip.index()];
        if chip.len() < 2 {
            return;
        }
        let offset = (addr as usize & !1) % chip.len();
        let [hi, lo] = value.to_be_bytes();
        chip[offset] = hi;
        if let Some(byte) = chip.get_mut(offset + 1) {
            *byte = lo;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bogo_ram_read_write_roundtrip() {
        let mut mem = MemoryBanks::new(512 * 1024, 512 * 1024, 0, 0);
        mem.write_byte(0xC0_0000, 0x42);
        mem.write_byte(0xC0_0001, 0xAB);
        assert_eq!(mem.read_word(0xC0_0000), 0x42AB);
    }

    #[test]
    fn bogo_ram_unmapped_when_absent() {
        let mem = MemoryBanks::new(512 * 1024, 0, 0, 0);
        assert_eq!(mem.read_byte(0xC0_0000), 0xFF, "should be open bus");
    }

    #[test]
    fn bogo_ram_address_wrapping() {
        let mut mem = MemoryBanks::new(512 * 1024, 512 * 1024, 0, 0);
        mem.write_byte(0xC0_0000, 0xEE);
        assert_eq!(mem.read_byte(0xC8_0000), 0xEE, "should wrap at 512K boundary");
    }

    #[test]
    fn fast_ram_follows_its_base() {
        let mut mem = MemoryBanks::new(512 * 1024, 0, 64 * 1024, 0);
        mem.write_word(0x20_0000, 0x1234);
        assert_eq!(mem.bank(RamRegion::Fast)[0], 0, "unmapped before autoconfig");
        mem.fast_base = 0x20_0000;
        mem.write_word(0x20_0000, 0x1234);
        assert_eq!(&mem.bank(RamRegion::Fast)[..2], &[0x12, 0x34]);
    }

    #[test]
    fn layout_applies_only_while_restoring() {
        let mut mem = MemoryBanks::new(512 * 1024, 0, 0, 0);
        let mut layout = RamLayout::default();
        layout.set(RamRegion::Chip, 1024 * 1024);
        layout.set(RamRegion::Fast, 256 * 1024);

        mem.allocate(&layout, SnapshotState::Idle);
        assert_eq!(mem.bank(RamRegion::Chip).len(), 512 * 1024);

        mem.allocate(&layout, SnapshotState::Restoring);
        assert_eq!(mem.bank(RamRegion::Chip).len(), 1024 * 1024);
        assert_eq!(mem.bank(RamRegion::Fast).len(), 256 * 1024);
        assert!(mem.bank(RamRegion::Bogo).is_empty());
    }

    #[test]
    fn dma_writes_wrap_at_chip_size() {
        let mut mem = MemoryBanks::new(0x1000, 0, 0, 0);
        mem.write_chip_word(0x1002, 0xBEEF);
        assert_eq!(mem.read_word(0x0002), 0xBEEF);
    }
}
