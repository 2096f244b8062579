//! State-level Amiga.
//!
//! Models the parts of the machine a snapshot carries (CPU registers,
//! chipset registers, sprite and audio channels, both CIAs, floppy drives
//! and the disk controller, autoconfig bases, RAM) and drives them from a
//! cycle-based event scheduler. The scheduler state, timer countdowns and
//! display caches are derived and never saved; after a restore the snapshot
//! engine rebuilds them through [`ResyncTarget`].
//!
//! [`Amiga::run_cycles`] checks the derived state against the saved state
//! before every step, so a restore that skips a repair fails loudly on the
//! next emulated cycle instead of drifting.

pub mod audio;
pub mod config;
pub mod cpu;
pub mod custom;
pub mod events;
pub mod expansion;
pub mod memory;
pub mod palette;
pub mod sprite;
pub mod video;

use amiga_savestate::{RamLayout, ResyncTarget, SnapshotState, SnapshotTarget};
use drive_amiga_floppy::{AmigaFloppyDrive, DiskController, DiskImage, DmaState};
use format_asf::{ChunkId, RamRegion, Snapshottable};
use log::{debug, info};
use mos_cia_8520::Cia8520;

use crate::audio::AudioChannel;
use crate::config::{MachineConfig, Region};
use crate::cpu::CpuState;
use crate::custom::{
    ADKCON, ADKF_WORDSYNC, BEAMCON0, COLOR00, CustomRegs, DMACON, DMAF_AUD0, DMAF_DISK,
    DMAF_MASTER, DSKBYTR, DSKDATR, DSKLEN, DSKSYNC, INT_AUD0, INT_DSKBLK, INT_DSKSYN, INT_EXTER,
    INT_PORTS,
};
use crate::events::{EventKind, EventScheduler};
use crate::expansion::Expansion;
use crate::memory::MemoryBanks;
use crate::palette::{AgaPalette, expand_rgb12};
use crate::sprite::SpriteChannel;
use crate::video::Video;

/// CPU cycles per raster line (227 colour clocks).
pub const CYCLES_PER_LINE: u64 = 454;
pub const CCKS_PER_LINE: u16 = 227;
/// E-clock ticks fed to the drive motors each line.
const ECLOCKS_PER_LINE: u32 = 45;

/// Kickstart 1.x entry point, used as the power-on PC.
pub const RESET_PC: u32 = 0x00FC_00D2;
pub const RESET_SSP: u32 = 0x0000_0400;

const BEAMCON0_PAL: u16 = 0x0020;

/// Derived state that disagrees with the saved state it was derived from.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MachineError {
    #[error("{cia}: cached timer countdown {cached:#x}, timers imply {expected:#x}")]
    TimerDesync {
        cia: &'static str,
        cached: u32,
        expected: u32,
    },
    #[error("CIA event scheduled at {scheduled:?}, timers due at {due:?}")]
    TimerEventMismatch {
        scheduled: Option<u64>,
        due: Option<u64>,
    },
    #[error("audio event scheduled at {scheduled:?}, channels due at {due:?}")]
    AudioDesync {
        scheduled: Option<u64>,
        due: Option<u64>,
    },
    #[error("{kind:?} event at cycle {evtime} is behind the clock ({now})")]
    StaleEvent {
        kind: EventKind,
        evtime: u64,
        now: u64,
    },
}

pub struct Amiga {
    pub config: MachineConfig,
    pub cpu: CpuState,
    pub custom: CustomRegs,
    pub palette: AgaPalette,
    pub sprites: [SpriteChannel; 8],
    pub audio: [AudioChannel; 4],
    pub cia_a: Cia8520,
    pub cia_b: Cia8520,
    pub drives: [AmigaFloppyDrive; 4],
    pub disk: DiskController,
    pub expansion: Expansion,
    pub memory: MemoryBanks,
    pub events: EventScheduler,
    pub video: Video,
    snapshot_state: SnapshotState,
    frame: u64,
}

impl Amiga {
    #[must_use]
    pub fn new(config: MachineConfig) -> Self {
        let mut cpu = CpuState::new(config.cpu);
        cpu.reset_to(RESET_SSP, RESET_PC);

        let mut custom = CustomRegs::new(config.chipset);
        if config.chipset.is_ecs_or_aga() && config.region == Region::Pal {
            custom.set(BEAMCON0, BEAMCON0_PAL);
        }

        let mut cia_a = Cia8520::new("CIA-A");
        // /OVL and /LED high, drive status lines idle.
        cia_a.external_a = 0xEB; // 0b_1110_1011
        let cia_b = Cia8520::new("CIA-B");

        let connected = config.drives.clamp(1, 4);
        let drives = std::array::from_fn(|n| {
            if n < connected {
                AmigaFloppyDrive::new()
            } else {
                AmigaFloppyDrive::disconnected()
            }
        });

        let expansion = Expansion::configured(config.fast_ram, config.z3_ram);
        let mut memory =
            MemoryBanks::new(config.chip_ram, config.bogo_ram, config.fast_ram, config.z3_ram);
        memory.fast_base = expansion.fast_base;

        let mut video = Video::new(config.region);
        video.reinit_timing(&custom, config.region);

        let mut events = EventScheduler::new();
        events.schedule(EventKind::Hsync, CYCLES_PER_LINE);

        let mut amiga = Self {
            config,
            cpu,
            custom,
            palette: AgaPalette::new(),
            sprites: Default::default(),
            audio: Default::default(),
            cia_a,
            cia_b,
            drives,
            disk: DiskController::new(),
            expansion,
            memory,
            events,
            video,
            snapshot_state: SnapshotState::Idle,
            frame: 0,
        };
        amiga.update_drive_status();
        amiga
    }

    /// Cycles since power-on.
    #[must_use]
    pub fn cycle(&self) -> u64 {
        self.events.now()
    }

    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frame
    }

    /// Run for `cycles` CPU cycles.
    ///
    /// # Errors
    ///
    /// Returns [`MachineError`] as soon as the derived event state disagrees
    /// with the chip state it was derived from. The machine stops at the
    /// cycle where the disagreement was found.
    pub fn run_cycles(&mut self, cycles: u64) -> Result<(), MachineError> {
        let end = self.events.now() + cycles;
        while self.events.now() < end {
            self.check_consistency()?;
            let now = self.events.now();
            let next = self.events.next_due().map_or(end, |t| t.min(end));
            self.advance(next.saturating_sub(now));
            self.events.set_now(next);
            self.update_hpos();
            self.dispatch_events();
        }
        self.sync_audio();
        self.schedule_audio_event();
        Ok(())
    }

    /// Run until the beam wraps to line 0.
    ///
    /// # Errors
    ///
    /// See [`Amiga::run_cycles`].
    pub fn run_frame(&mut self) -> Result<(), MachineError> {
        let frame = self.frame;
        while self.frame == frame {
            let hsync = self.events.entry(EventKind::Hsync);
            let step = if hsync.active {
                hsync.evtime.saturating_sub(self.events.now()).max(1)
            } else {
                CYCLES_PER_LINE
            };
            self.run_cycles(step)?;
        }
        Ok(())
    }

    /// Compare every piece of derived event state with its source.
    ///
    /// # Errors
    ///
    /// Returns the first disagreement found.
    pub fn check_consistency(&self) -> Result<(), MachineError> {
        let now = self.events.now();
        for kind in EventKind::ALL {
            let entry = self.events.entry(kind);
            if entry.active && entry.evtime < now {
                return Err(MachineError::StaleEvent {
                    kind,
                    evtime: entry.evtime,
                    now,
                });
            }
        }

        for cia in [&self.cia_a, &self.cia_b] {
            let cached = cia.event_countdown();
            let expected = cia.expected_countdown();
            if cached != expected {
                return Err(MachineError::TimerDesync {
                    cia: cia.label(),
                    cached,
                    expected,
                });
            }
        }
        let entry = self.events.entry(EventKind::Cia);
        let scheduled = entry.active.then_some(entry.evtime);
        let due = self.timer_due().map(|n| now + n);
        if scheduled != due {
            return Err(MachineError::TimerEventMismatch { scheduled, due });
        }

        let entry = self.events.entry(EventKind::Audio);
        let scheduled = entry.active.then_some(entry.evtime);
        let due = self.audio_due().map(|n| entry.oldcycles + u64::from(n));
        if scheduled != due {
            return Err(MachineError::AudioDesync { scheduled, due });
        }
        Ok(())
    }

    fn advance(&mut self, cycles: u64) {
        if cycles == 0 {
            return;
        }
        self.cia_a.advance_cycles(cycles);
        self.cia_b.advance_cycles(cycles);
        self.poll_cia_interrupts();
    }

    fn update_hpos(&mut self) {
        let hsync = self.events.entry(EventKind::Hsync);
        let to_hsync = hsync.evtime.saturating_sub(self.events.now()) / 2;
        self.custom.hpos = CCKS_PER_LINE.saturating_sub(to_hsync.min(u64::from(CCKS_PER_LINE)) as u16);
    }

    fn dispatch_events(&mut self) {
        if self.events.is_due(EventKind::Hsync) {
            self.hsync();
        }
        if self.events.is_due(EventKind::Cia) {
            self.schedule_timer_event();
        }
        if self.events.is_due(EventKind::Audio) {
            self.sync_audio();
            self.schedule_audio_event();
        }
    }

    fn hsync(&mut self) {
        let now = self.events.now();
        self.clock_disk();
        for drive in &mut self.drives {
            drive.advance_eclocks(ECLOCKS_PER_LINE);
        }
        self.cia_b.tod_pulse();
        self.video
            .hsync(self.custom.vpos, &self.custom, &self.palette);

        self.custom.vpos += 1;
        if self.custom.vpos >= self.video.lines_per_frame() {
            self.vsync();
        }
        self.custom.hpos = 0;

        let entry = self.events.entry_mut(EventKind::Hsync);
        entry.oldcycles = now;
        self.events.schedule(EventKind::Hsync, now + CYCLES_PER_LINE);
        self.update_drive_status();
        self.poll_cia_interrupts();
    }

    fn vsync(&mut self) {
        self.custom.vpos = 0;
        self.frame += 1;
        self.cia_a.tod_pulse();
        self.custom.request_interrupt(custom::INT_VERTB);
    }

    fn poll_cia_interrupts(&mut self) {
        if self.cia_a.irq_active() {
            self.custom.request_interrupt(INT_PORTS);
        }
        if self.cia_b.irq_active() {
            self.custom.request_interrupt(INT_EXTER);
        }
    }

    // CIA timer event

    fn timer_due(&self) -> Option<u64> {
        [self.cia_a.cycles_until_event(), self.cia_b.cycles_until_event()]
            .into_iter()
            .flatten()
            .min()
    }

    fn schedule_timer_event(&mut self) {
        match self.timer_due() {
            Some(n) => {
                let now = self.events.now();
                self.events.schedule(EventKind::Cia, now + n);
            }
            None => self.events.disable(EventKind::Cia),
        }
    }

    // Audio event

    fn audio_due(&self) -> Option<u32> {
        self.audio
            .iter()
            .filter(|ch| ch.is_running())
            .map(|ch| ch.evtime)
            .min()
    }

    /// Catch the channels up with the clock.
    fn sync_audio(&mut self) {
        let now = self.events.now();
        let entry = self.events.entry_mut(EventKind::Audio);
        let elapsed = now.saturating_sub(entry.oldcycles);
        entry.oldcycles = now;
        for (n, ch) in self.audio.iter_mut().enumerate() {
            if ch.advance(elapsed) {
                self.custom.request_interrupt(INT_AUD0 + n as u16);
            }
        }
    }

    fn schedule_audio_event(&mut self) {
        match self.audio_due() {
            Some(n) => {
                let base = self.events.entry(EventKind::Audio).oldcycles;
                self.events.schedule(EventKind::Audio, base + u64::from(n));
            }
            None => self.events.disable(EventKind::Audio),
        }
    }

    fn update_audio_dma(&mut self, dmacon_before: u16) {
        for n in 0..4 {
            let mask = DMAF_AUD0 << n;
            let was = dmacon_before & DMAF_MASTER != 0 && dmacon_before & mask != 0;
            let now = self.custom.dma_enabled(mask);
            if now && !was {
                self.audio[n].start();
                self.custom.request_interrupt(INT_AUD0 + n as u16);
            } else if was && !now {
                self.audio[n].stop();
            }
        }
    }

    // Floppy

    fn clock_disk(&mut self) {
        let Some(n) = self.selected_drives().next() else {
            return;
        };
        let sync_word = self.custom.get(DSKSYNC);
        let events = self.disk.clock_line(&mut self.drives[n], sync_word);
        if events.sync {
            self.custom.request_interrupt(INT_DSKSYN);
        }

        let mut dskbytr = self.disk.word() & 0x00FF;
        if let Some(word) = events.word {
            self.custom.set(DSKDATR, word);
            dskbytr |= 0x8000;
            self.disk_dma_word(word);
        }
        match self.disk.dma() {
            DmaState::Read => dskbytr |= 0x4000,
            DmaState::Write => dskbytr |= 0x6000,
            DmaState::Off | DmaState::Armed => {}
        }
        if self.disk.sync_found() {
            dskbytr |= 0x1000;
        }
        self.custom.set(DSKBYTR, dskbytr);
    }

    fn disk_dma_word(&mut self, word: u16) {
        if self.disk.dma() != DmaState::Read || !self.custom.dma_enabled(DMAF_DISK) {
            return;
        }
        if self.custom.get(ADKCON) & ADKF_WORDSYNC != 0 && !self.disk.sync_found() {
            return;
        }
        let dsklen = self.custom.get(DSKLEN);
        let words = dsklen & 0x3FFF;
        if words == 0 {
            return;
        }
        let ptr = self.custom.disk_pointer();
        self.memory.write_chip_word(ptr, word);
        self.custom.set_disk_pointer(ptr.wrapping_add(2));
        let left = words - 1;
        self.custom.set(DSKLEN, (dsklen & 0xC000) | left);
        if left == 0 {
            self.disk.write_dsklen(0);
            self.custom.set(DSKLEN, 0);
            self.custom.request_interrupt(INT_DSKBLK);
            debug!("disk DMA block done at {ptr:#08x}");
        }
    }

    /// Connected drives whose /DSKSELn line CIA-B is driving low. The select
    /// lines come from the saved port state, so they hold across a restore.
    fn selected_drives(&self) -> impl Iterator<Item = usize> + '_ {
        let prb = self.cia_b.port_b_output();
        (0..4).filter(move |&n| prb & (0x08 << n) == 0 && self.drives[n].is_connected())
    }

    /// Drive control lines from CIA-B PRB (all active low).
    fn update_drive_control(&mut self) {
        let prb = self.cia_b.port_b_output();
        let step = prb & 0x01 == 0; // PB0: /DSKSTEP
        let dir_inward = prb & 0x02 == 0; // PB1: /DSKDIREC
        let side_upper = prb & 0x04 == 0; // PB2: /DSKSIDE
        let motor = prb & 0x80 == 0; // PB7: /DSKMOTOR
        for (n, drive) in self.drives.iter_mut().enumerate() {
            let sel = prb & (0x08 << n) == 0; // PB3-PB6: /DSKSELn
            drive.update_control(step, dir_inward, side_upper, sel, motor);
        }
        self.update_drive_status();
    }

    /// Feed the selected drives' status into CIA-A PRA (active low).
    fn update_drive_status(&mut self) {
        let mut lines = 0x3C;
        for n in self.selected_drives() {
            let status = self.drives[n].status();
            for (asserted, bit) in [
                (status.disk_change, 0x04), // PA2: /DSKCHANGE
                (status.write_protect, 0x08), // PA3: /DSKPROT
                (status.track0, 0x10),      // PA4: /DSKTRACK0
                (status.ready, 0x20),       // PA5: /DSKRDY
            ] {
                if asserted {
                    lines &= !bit;
                }
            }
        }
        self.cia_a.external_a = (self.cia_a.external_a & !0x3C) | lines;
    }

    // Register access

    pub fn write_custom_reg(&mut self, offset: u16, value: u16) {
        let offset = offset & 0x1FE;
        match offset {
            0x0A0..=0x0DE => {
                self.sync_audio();
                self.audio[usize::from((offset - 0x0A0) / 16)].write(offset & 0xF, value);
                self.schedule_audio_event();
            }
            0x120..=0x13E => {
                let n = usize::from((offset - 0x120) / 4);
                self.sprites[n].write_pointer(offset & 2 == 0, value);
            }
            0x140..=0x17E => {
                let n = usize::from((offset - 0x140) / 8);
                self.sprites[n].write(offset & 6, value);
            }
            DMACON => {
                self.sync_audio();
                let before = self.custom.dmacon();
                self.custom.write(DMACON, value);
                self.update_audio_dma(before);
                self.schedule_audio_event();
            }
            DSKLEN => {
                self.custom.write(DSKLEN, value);
                self.disk.write_dsklen(value);
            }
            BEAMCON0 => {
                self.custom.write(BEAMCON0, value);
                self.video.reinit_timing(&self.custom, self.config.region);
            }
            _ if (COLOR00..COLOR00 + 64).contains(&offset) => {
                self.custom.write(offset, value);
                if self.config.chipset.is_aga() {
                    self.palette.colors[usize::from((offset - COLOR00) / 2)] =
                        expand_rgb12(value);
                }
            }
            _ => self.custom.write(offset, value),
        }
    }

    /// Custom register read. Audio and sprite registers are write-only.
    #[must_use]
    pub fn read_custom_reg(&self, offset: u16) -> u16 {
        match offset & 0x1FE {
            0x0A0..=0x0DE | 0x120..=0x17E => 0,
            off => self.custom.read(off),
        }
    }

    pub fn read_cia_a(&mut self, reg: u8) -> u8 {
        self.cia_a.read(reg)
    }

    pub fn write_cia_a(&mut self, reg: u8, value: u8) {
        self.cia_a.write(reg, value);
        self.schedule_timer_event();
    }

    pub fn read_cia_b(&mut self, reg: u8) -> u8 {
        self.cia_b.read(reg)
    }

    pub fn write_cia_b(&mut self, reg: u8, value: u8) {
        self.cia_b.write(reg, value);
        if matches!(reg & 0x0F, 0x01 | 0x03) {
            self.update_drive_control();
        }
        self.schedule_timer_event();
    }

    /// Insert a disk into drive `n` (0 = DF0:).
    pub fn insert_disk(&mut self, n: usize, image: DiskImage) {
        info!("DF{n}: inserted {:?}", image.name());
        self.drives[n].insert_disk(image);
        self.update_drive_status();
    }

    pub fn eject_disk(&mut self, n: usize) -> Option<DiskImage> {
        let image = self.drives[n].eject_disk();
        self.update_drive_status();
        image
    }
}

fn index_of(id: ChunkId, table: &[ChunkId]) -> Option<usize> {
    table.iter().position(|&t| t == id)
}

impl SnapshotTarget for Amiga {
    fn subsystem(&self, id: ChunkId) -> Option<&dyn Snapshottable> {
        let sub: &dyn Snapshottable = match id {
            ChunkId::CPU => &self.cpu,
            ChunkId::DISK => &self.disk,
            ChunkId::CHIP => &self.custom,
            ChunkId::AGAC if self.config.chipset.is_aga() => &self.palette,
            ChunkId::CIAA => &self.cia_a,
            ChunkId::CIAB => &self.cia_b,
            ChunkId::EXPA => &self.expansion,
            _ => {
                if let Some(n) = index_of(id, &ChunkId::DSK) {
                    &self.drives[n]
                } else if let Some(n) = index_of(id, &ChunkId::SPR) {
                    &self.sprites[n]
                } else if let Some(n) = index_of(id, &ChunkId::AUD) {
                    &self.audio[n]
                } else {
                    return None;
                }
            }
        };
        Some(sub)
    }

    fn subsystem_mut(&mut self, id: ChunkId) -> Option<&mut dyn Snapshottable> {
        let sub: &mut dyn Snapshottable = match id {
            ChunkId::CPU => &mut self.cpu,
            ChunkId::DISK => &mut self.disk,
            ChunkId::CHIP => &mut self.custom,
            ChunkId::AGAC if self.config.chipset.is_aga() => &mut self.palette,
            ChunkId::CIAA => &mut self.cia_a,
            ChunkId::CIAB => &mut self.cia_b,
            ChunkId::EXPA => &mut self.expansion,
            _ => {
                if let Some(n) = index_of(id, &ChunkId::DSK) {
                    &mut self.drives[n]
                } else if let Some(n) = index_of(id, &ChunkId::SPR) {
                    &mut self.sprites[n]
                } else if let Some(n) = index_of(id, &ChunkId::AUD) {
                    &mut self.audio[n]
                } else {
                    return None;
                }
            }
        };
        Some(sub)
    }

    fn ram(&self, region: RamRegion) -> &[u8] {
        self.memory.bank(region)
    }

    fn ram_mut(&mut self, region: RamRegion) -> &mut [u8] {
        self.memory.bank_mut(region)
    }

    fn allocate_ram(&mut self, layout: &RamLayout) {
        self.memory.allocate(layout, self.snapshot_state);
        self.memory.fast_base = self.expansion.fast_base;
    }

    fn snapshot_state(&self) -> SnapshotState {
        self.snapshot_state
    }

    fn set_snapshot_state(&mut self, state: SnapshotState) {
        let leaving_restore =
            self.snapshot_state == SnapshotState::Restoring && state == SnapshotState::Idle;
        self.snapshot_state = state;
        if leaving_restore {
            self.update_drive_status();
        }
    }
}

impl ResyncTarget for Amiga {
    fn disable_timer_events(&mut self) {
        self.events.disable(EventKind::Cia);
    }

    fn resync_event_clocks(&mut self) {
        self.events.resync_clocks();
        let hpos = self.custom.hpos.min(CCKS_PER_LINE);
        let now = self.events.now();
        self.events.schedule(
            EventKind::Hsync,
            now + u64::from(CCKS_PER_LINE - hpos) * 2,
        );
    }

    fn reset_timer_carry(&mut self) {
        self.cia_a.reset_divider();
        self.cia_b.reset_divider();
    }

    fn force_timer_countdowns(&mut self) {
        self.cia_a.force_countdown_sentinel();
        self.cia_b.force_countdown_sentinel();
    }

    fn recompute_timer_events(&mut self) {
        self.cia_a.recompute_countdown();
        self.cia_b.recompute_countdown();
        self.schedule_timer_event();
    }

    fn disable_audio_event(&mut self) {
        self.events.disable(EventKind::Audio);
    }

    fn resync_audio_clock(&mut self) {
        let now = self.events.now();
        self.events.entry_mut(EventKind::Audio).oldcycles = now;
    }

    fn recompute_audio_event(&mut self) {
        self.schedule_audio_event();
    }

    fn invalidate_display(&mut self) {
        self.video.invalidate();
    }

    fn reinit_display_timing(&mut self) {
        self.video.reinit_timing(&self.custom, self.config.region);
    }
}
