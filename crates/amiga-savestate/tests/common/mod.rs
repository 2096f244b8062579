//! A small fake machine and an in-memory filesystem for engine tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use amiga_savestate::io::{FirmwareFile, FirmwareFs, OpenMode};
use amiga_savestate::{RamLayout, ResyncTarget, SnapshotState, SnapshotTarget};
use format_asf::{ByteReader, ByteWriter, ChunkId, RamRegion, Snapshottable, StateError};

/// Fixed-size register file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Regs(pub Vec<u16>);

impl Snapshottable for Regs {
    fn state_size(&self) -> Option<usize> {
        Some(self.0.len() * 2)
    }

    fn save_state(&self, w: &mut ByteWriter<'_>) {
        for &word in &self.0 {
            w.write_u16(word);
        }
    }

    fn restore_state(&mut self, r: &mut ByteReader<'_>) -> Result<(), StateError> {
        for word in &mut self.0 {
            *word = r.read_u16();
        }
        Ok(())
    }
}

/// Length-prefixed blob; absent when empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Blob(pub Vec<u8>);

impl Snapshottable for Blob {
    fn state_size(&self) -> Option<usize> {
        (!self.0.is_empty()).then(|| 4 + self.0.len())
    }

    fn save_state(&self, w: &mut ByteWriter<'_>) {
        w.write_u32(self.0.len() as u32);
        w.write_bytes(&self.0);
    }

    fn restore_state(&mut self, r: &mut ByteReader<'_>) -> Result<(), StateError> {
        let len = r.read_u32() as usize;
        if len > r.remaining() {
            return Err(StateError::Truncated {
                needed: len,
                available: r.remaining(),
            });
        }
        self.0 = vec![0; len];
        r.read_bytes(&mut self.0);
        Ok(())
    }
}

pub struct FakeMachine {
    pub cpu: Regs,
    pub chip: Regs,
    pub cia_a: Blob,
    pub configured: [usize; 4],
    pub banks: [Vec<u8>; 4],
    pub state: SnapshotState,
    /// Resync hooks in call order.
    pub calls: Vec<&'static str>,
    /// Snapshot state seen by each `allocate_ram` call.
    pub alloc_states: Vec<SnapshotState>,
}

impl FakeMachine {
    pub fn new(chip_ram: usize, fast_ram: usize) -> Self {
        let configured = [chip_ram, 0, fast_ram, 0];
        Self {
            cpu: Regs(vec![0; 8]),
            chip: Regs(vec![0; 4]),
            cia_a: Blob::default(),
            configured,
            banks: configured.map(|size| vec![0; size]),
            state: SnapshotState::Idle,
            calls: Vec::new(),
            alloc_states: Vec::new(),
        }
    }

    /// A machine with recognisable contents everywhere.
    pub fn populated() -> Self {
        let mut m = Self::new(0x1000, 0x800);
        m.cpu = Regs((0..8).map(|i| 0x1111 * (i + 1)).collect());
        m.chip = Regs(vec![0xDFF0, 0x0200, 0x8000, 0x7FFF]);
        m.cia_a = Blob(b"timer".to_vec());
        for (i, b) in m.banks[0].iter_mut().enumerate() {
            *b = (i * 7) as u8;
        }
        m.banks[2].fill(0x5A);
        m
    }

    pub fn bank(&self, region: RamRegion) -> &[u8] {
        &self.banks[region.index()]
    }
}

impl ResyncTarget for FakeMachine {
    fn disable_timer_events(&mut self) {
        self.calls.push("disable_timer_events");
    }
    fn resync_event_clocks(&mut self) {
        self.calls.push("resync_event_clocks");
    }
    fn reset_timer_carry(&mut self) {
        self.calls.push("reset_timer_carry");
    }
    fn force_timer_countdowns(&mut self) {
        self.calls.push("force_timer_countdowns");
    }
    fn recompute_timer_events(&mut self) {
        self.calls.push("recompute_timer_events");
    }
    fn disable_audio_event(&mut self) {
        self.calls.push("disable_audio_event");
    }
    fn resync_audio_clock(&mut self) {
        self.calls.push("resync_audio_clock");
    }
    fn recompute_audio_event(&mut self) {
        self.calls.push("recompute_audio_event");
    }
    fn invalidate_display(&mut self) {
        self.calls.push("invalidate_display");
    }
    fn reinit_display_timing(&mut self) {
        self.calls.push("reinit_display_timing");
    }
}

impl SnapshotTarget for FakeMachine {
    fn subsystem(&self, id: ChunkId) -> Option<&dyn Snapshottable> {
        match id {
            ChunkId::CPU => Some(&self.cpu),
            ChunkId::CHIP => Some(&self.chip),
            ChunkId::CIAA => Some(&self.cia_a),
            _ => None,
        }
    }

    fn subsystem_mut(&mut self, id: ChunkId) -> Option<&mut dyn Snapshottable> {
        match id {
            ChunkId::CPU => Some(&mut self.cpu),
            ChunkId::CHIP => Some(&mut self.chip),
            ChunkId::CIAA => Some(&mut self.cia_a),
            _ => None,
        }
    }

    fn ram(&self, region: RamRegion) -> &[u8] {
        &self.banks[region.index()]
    }

    fn ram_mut(&mut self, region: RamRegion) -> &mut [u8] {
        &mut self.banks[region.index()]
    }

    fn allocate_ram(&mut self, layout: &RamLayout) {
        self.alloc_states.push(self.state);
        for region in RamRegion::ALL {
            let size = match self.state {
                SnapshotState::Restoring => layout
                    .size(region)
                    .unwrap_or(self.configured[region.index()]),
                SnapshotState::Idle => self.configured[region.index()],
            };
            self.banks[region.index()] = vec![0; size];
        }
    }

    fn snapshot_state(&self) -> SnapshotState {
        self.state
    }

    fn set_snapshot_state(&mut self, state: SnapshotState) {
        if state == SnapshotState::Idle && self.state == SnapshotState::Restoring {
            self.calls.push("clear_restoring");
        }
        self.state = state;
    }
}

/// Files shared between a [`MemFs`] and the test that inspects them.
pub type Files = Arc<Mutex<HashMap<PathBuf, Vec<u8>>>>;

/// In-memory firmware filesystem.
#[derive(Default)]
pub struct MemFs {
    pub files: Files,
    pub syncs: usize,
    /// Fail writes after this many bytes.
    pub write_limit: Option<usize>,
}

pub struct MemFile {
    path: PathBuf,
    files: Files,
    data: Vec<u8>,
    pos: usize,
    writable: bool,
    write_limit: Option<usize>,
}

impl FirmwareFile for MemFile {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let start = self.pos.min(self.data.len());
        let n = out.len().min(self.data.len() - start);
        out[..n].copy_from_slice(&self.data[start..start + n]);
        self.pos += n;
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if !self.writable {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"));
        }
        if let Some(limit) = self.write_limit {
            if self.pos + data.len() > limit {
                return Err(io::Error::other("disk full"));
            }
        }
        let end = self.pos + data.len();
        if self.data.len() < end {
            self.data.resize(end, 0);
        }
        self.data[self.pos..end].copy_from_slice(data);
        self.pos = end;
        Ok(data.len())
    }

    fn lseek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => n as i64,
            SeekFrom::Current(d) => self.pos as i64 + d,
            SeekFrom::End(d) => self.data.len() as i64 + d,
        };
        if target < 0 {
            return Err(io::ErrorKind::InvalidInput.into());
        }
        self.pos = target as usize;
        Ok(self.pos as u64)
    }

    fn close(self) -> io::Result<()> {
        if self.writable {
            self.files
                .lock()
                .expect("files lock")
                .insert(self.path, self.data);
        }
        Ok(())
    }
}

impl FirmwareFs for MemFs {
    type File = MemFile;

    fn open(&mut self, path: &Path, mode: OpenMode) -> io::Result<MemFile> {
        let data = match mode {
            OpenMode::Read => self
                .files
                .lock()
                .expect("files lock")
                .get(path)
                .cloned()
                .ok_or(io::ErrorKind::NotFound)?,
            OpenMode::Write => Vec::new(),
        };
        Ok(MemFile {
            path: path.to_path_buf(),
            files: Arc::clone(&self.files),
            data,
            pos: 0,
            writable: mode == OpenMode::Write,
            write_limit: self.write_limit,
        })
    }

    fn sync(&mut self) -> io::Result<()> {
        self.syncs += 1;
        Ok(())
    }
}

pub const RESYNC_CALLS: [&str; 11] = [
    "disable_timer_events",
    "resync_event_clocks",
    "reset_timer_carry",
    "force_timer_countdowns",
    "recompute_timer_events",
    "disable_audio_event",
    "resync_audio_clock",
    "recompute_audio_event",
    "invalidate_display",
    "reinit_display_timing",
    "clear_restoring",
];
