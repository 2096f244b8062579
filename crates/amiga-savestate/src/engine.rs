//! The snapshot orchestrator and its public entry points.

use std::path::Path;

use format_asf::{
    AsfHeader, ByteReader, ByteWriter, CHUNK_HEADER_LEN, ChunkId, RamRegion, Snapshottable,
    save_to_vec,
};
use log::{debug, error, info, warn};

use crate::arena::Arena;
use crate::chunk::{
    Chunk, ChunkReader, Payload, deflate_bound, write_chunk, write_chunk_compressed, write_end,
};
use crate::config::{AllocStrategy, RamLimits, SnapshotConfig};
use crate::error::{Notice, SnapshotError};
use crate::io::{
    BufferBackend, FileBackend, FirmwareFs, HostFs, IoMode, OpenMode, SnapshotIo,
};
use crate::plan::{RamChunk, RestorePlan};
use crate::resync::resynchronize;
use crate::target::{SnapshotState, SnapshotTarget};

/// Header description written by buffer saves.
pub const BUFFER_DESCRIPTION: &str = "libretro";

/// Subsystem chunks in emission order, between the header and the RAM banks.
pub const SAVE_ORDER: [ChunkId; 23] = [
    ChunkId::CPU,
    ChunkId::DSK0,
    ChunkId::DSK1,
    ChunkId::DSK2,
    ChunkId::DSK3,
    ChunkId::DISK,
    ChunkId::CHIP,
    ChunkId::AGAC,
    ChunkId::SPR0,
    ChunkId::SPR1,
    ChunkId::SPR2,
    ChunkId::SPR3,
    ChunkId::SPR4,
    ChunkId::SPR5,
    ChunkId::SPR6,
    ChunkId::SPR7,
    ChunkId::AUD0,
    ChunkId::AUD1,
    ChunkId::AUD2,
    ChunkId::AUD3,
    ChunkId::CIAA,
    ChunkId::CIAB,
    ChunkId::EXPA,
];

/// Outcome of parsing a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    pub header: AsfHeader,
    /// Subsystem chunks applied.
    pub applied: usize,
    /// Unknown, ignored or oversized chunks.
    pub skipped: usize,
    /// Chunks whose subsystem failed or consumed a different length.
    pub mismatched: usize,
    /// The `END ` marker was reached.
    pub complete: bool,
}

struct PendingRestore<H> {
    io: FileBackend<H>,
    plan: RestorePlan,
    report: RestoreReport,
}

/// Owns the arena, the scratch buffer and at most one open session.
///
/// Every operation takes `&mut self`, so a second snapshot operation cannot
/// start while one is running. A file restore stays open between
/// [`Self::restore_from_file`] and [`Self::restore_finish`]; other operations
/// report [`SnapshotError::Busy`] until it is finished.
pub struct SnapshotEngine<F: FirmwareFs = HostFs> {
    config: SnapshotConfig,
    arena: Arena,
    reader: ChunkReader,
    fs: F,
    pending: Option<PendingRestore<F::File>>,
    restores: u32,
    notice: Option<Notice>,
}

impl SnapshotEngine<HostFs> {
    #[must_use]
    pub fn new(config: SnapshotConfig) -> Self {
        Self::with_fs(config, HostFs)
    }
}

impl<F: FirmwareFs> SnapshotEngine<F> {
    #[must_use]
    pub fn with_fs(config: SnapshotConfig, fs: F) -> Self {
        Self {
            arena: Arena::new(config.arena_capacity),
            reader: ChunkReader::new(config.scratch_capacity),
            config,
            fs,
            pending: None,
            restores: 0,
            notice: None,
        }
    }

    #[must_use]
    pub fn config(&self) -> &SnapshotConfig {
        &self.config
    }

    #[must_use]
    pub fn fs(&self) -> &F {
        &self.fs
    }

    pub fn fs_mut(&mut self) -> &mut F {
        &mut self.fs
    }

    #[must_use]
    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    /// Buffer size callers must provide. The engine never computes the
    /// actual size ahead of a save.
    #[must_use]
    pub fn serialize_size(&self) -> usize {
        self.config.max_snapshot_size
    }

    /// Restores completed since the engine was created.
    #[must_use]
    pub fn restore_count(&self) -> u32 {
        self.restores
    }

    #[must_use]
    pub fn notice(&self) -> Option<Notice> {
        self.notice
    }

    pub fn take_notice(&mut self) -> Option<Notice> {
        self.notice.take()
    }

    #[must_use]
    pub fn has_pending_restore(&self) -> bool {
        self.pending.is_some()
    }

    fn ensure_idle(&self) -> Result<(), SnapshotError> {
        if self.pending.is_some() {
            return Err(SnapshotError::Busy);
        }
        Ok(())
    }

    /// Save into `buf`. Returns the bytes written, or 0 on failure.
    pub fn save_to_buffer<T: SnapshotTarget + ?Sized>(&mut self, target: &T, buf: &mut [u8]) -> usize {
        match self.try_save_to_buffer(target, buf) {
            Ok(n) => {
                self.notice = Some(Notice::Saved);
                n
            }
            Err(e) => {
                error!("snapshot: save to buffer failed: {e}");
                self.notice = Some(Notice::SaveFailed);
                0
            }
        }
    }

    pub fn try_save_to_buffer<T: SnapshotTarget + ?Sized>(
        &mut self,
        target: &T,
        buf: &mut [u8],
    ) -> Result<usize, SnapshotError> {
        self.ensure_idle()?;
        self.arena.reset();
        let mut io = BufferBackend::writer(buf);
        write_snapshot(&mut self.arena, &self.config, &mut io, target, BUFFER_DESCRIPTION)?;
        let n = io.written();
        info!(
            "snapshot: saved {n} bytes to buffer, arena {}/{}",
            self.arena.used(),
            self.arena.capacity()
        );
        Ok(n)
    }

    /// Restore from `data`. Returns true when the whole snapshot was applied.
    pub fn restore_from_buffer<T: SnapshotTarget + ?Sized>(&mut self, target: &mut T, data: &[u8]) -> bool {
        match self.try_restore_from_buffer(target, data) {
            Ok(report) if report.complete => {
                self.notice = Some(Notice::Restored);
                true
            }
            Ok(_) => {
                self.notice = Some(Notice::RestoreFailed);
                false
            }
            Err(e) => {
                error!("snapshot: restore from buffer failed: {e}");
                self.notice = Some(Notice::RestoreFailed);
                false
            }
        }
    }

    /// Parse, copy RAM and resynchronize in one call.
    ///
    /// A stream that stops before `END ` still gets its RAM pass and
    /// resynchronization so the machine is left runnable; the report says
    /// `complete: false`.
    pub fn try_restore_from_buffer<T: SnapshotTarget + ?Sized>(
        &mut self,
        target: &mut T,
        data: &[u8],
    ) -> Result<RestoreReport, SnapshotError> {
        self.ensure_idle()?;
        let mut io = BufferBackend::reader(data);
        let limits = self.config.ram_limits;
        let (report, plan) = match read_snapshot(&mut self.reader, &mut io, target, &limits) {
            Ok(parsed) => parsed,
            Err(e) => {
                target.set_snapshot_state(SnapshotState::Idle);
                return Err(e);
            }
        };
        self.complete_restore(&mut io, target, &plan)?;
        Ok(report)
    }

    /// Save to `path`. Failures are logged and surfaced as a notice.
    pub fn save_to_file<T: SnapshotTarget + ?Sized>(&mut self, target: &T, path: &Path, description: &str) {
        match self.try_save_to_file(target, path, description) {
            Ok(_) => self.notice = Some(Notice::Saved),
            Err(e) => {
                error!("snapshot: save to {} failed: {e}", path.display());
                self.notice = Some(Notice::SaveFailed);
            }
        }
    }

    pub fn try_save_to_file<T: SnapshotTarget + ?Sized>(
        &mut self,
        target: &T,
        path: &Path,
        description: &str,
    ) -> Result<u64, SnapshotError> {
        self.ensure_idle()?;
        let mut io = FileBackend::new(self.fs.open(path, OpenMode::Write)?);
        let written = write_snapshot(&mut self.arena, &self.config, &mut io, target, description);
        let len = io.tell();
        let closed = io.close();
        written?;
        closed?;
        self.fs.sync()?;
        info!("snapshot: saved {len} bytes to {}", path.display());
        Ok(len)
    }

    /// Start a file restore. The chunks are applied now; RAM contents and
    /// resynchronization wait for [`Self::restore_finish`], which also
    /// reports a file without an `END ` marker as failed.
    pub fn restore_from_file<T: SnapshotTarget + ?Sized>(&mut self, target: &mut T, path: &Path) {
        match self.try_restore_from_file(target, path) {
            Ok(report) if !report.complete => {
                warn!("snapshot: {} has no END marker", path.display());
            }
            Ok(_) => {}
            Err(e) => {
                error!("snapshot: restore from {} failed: {e}", path.display());
                self.notice = Some(Notice::RestoreFailed);
            }
        }
    }

    pub fn try_restore_from_file<T: SnapshotTarget + ?Sized>(
        &mut self,
        target: &mut T,
        path: &Path,
    ) -> Result<RestoreReport, SnapshotError> {
        self.ensure_idle()?;
        let mut io = FileBackend::new(self.fs.open(path, OpenMode::Read)?);
        let limits = self.config.ram_limits;
        match read_snapshot(&mut self.reader, &mut io, target, &limits) {
            Ok((report, plan)) => {
                self.pending = Some(PendingRestore {
                    io,
                    plan,
                    report: report.clone(),
                });
                Ok(report)
            }
            Err(e) => {
                target.set_snapshot_state(SnapshotState::Idle);
                if let Err(close) = io.close() {
                    warn!("snapshot: closing {} failed: {close}", path.display());
                }
                Err(e)
            }
        }
    }

    /// Complete a pending file restore: copy RAM, resynchronize, close the
    /// file. Returns true when the whole snapshot was applied. Without a
    /// pending restore this does nothing and returns false.
    pub fn restore_finish<T: SnapshotTarget + ?Sized>(&mut self, target: &mut T) -> bool {
        match self.try_restore_finish(target) {
            Ok(Some(report)) if report.complete => {
                self.notice = Some(Notice::Restored);
                true
            }
            Ok(Some(_)) => {
                self.notice = Some(Notice::RestoreFailed);
                false
            }
            Ok(None) => false,
            Err(e) => {
                error!("snapshot: finishing restore failed: {e}");
                self.notice = Some(Notice::RestoreFailed);
                false
            }
        }
    }

    /// The report of the finished restore, or `None` when nothing was
    /// pending. An incomplete stream still gets its RAM pass and
    /// resynchronization; the report says `complete: false`.
    pub fn try_restore_finish<T: SnapshotTarget + ?Sized>(
        &mut self,
        target: &mut T,
    ) -> Result<Option<RestoreReport>, SnapshotError> {
        let Some(PendingRestore { mut io, plan, report }) = self.pending.take() else {
            return Ok(None);
        };
        let result = self.complete_restore(&mut io, target, &plan);
        let closed = io.close();
        result?;
        closed?;
        Ok(Some(report))
    }

    fn complete_restore<I, T>(&mut self, io: &mut I, target: &mut T, plan: &RestorePlan) -> Result<(), SnapshotError>
    where
        I: SnapshotIo + ?Sized,
        T: SnapshotTarget + ?Sized,
    {
        if let Err(e) = plan.apply(io, target, &self.config.ram_limits) {
            target.set_snapshot_state(SnapshotState::Idle);
            return Err(e);
        }
        let steps = resynchronize(target, self.config.display_reinit, self.restores);
        self.restores += 1;
        debug!("snapshot: restore #{} resynchronized in {} steps", self.restores, steps.len());
        Ok(())
    }
}

fn write_snapshot<I, T>(
    arena: &mut Arena,
    config: &SnapshotConfig,
    io: &mut I,
    target: &T,
    description: &str,
) -> Result<(), SnapshotError>
where
    I: SnapshotIo + ?Sized,
    T: SnapshotTarget + ?Sized,
{
    let strategy = match io.mode() {
        IoMode::Buffer => config.buffer_alloc,
        IoMode::File => AllocStrategy::Heap,
    };
    let compress_chip = io.mode() == IoMode::File && config.compress_chip_ram;

    let capacity = io.write_capacity_left();
    let header = AsfHeader::new(&config.emulator_name, &config.emulator_version, description);
    if !emit(arena, strategy, io, ChunkId::ASF, &header)? {
        return Err(SnapshotError::BufferTooSmall {
            capacity: capacity.unwrap_or(0) as usize,
        });
    }

    for id in SAVE_ORDER {
        if let Some(sub) = target.subsystem(id) {
            emit(arena, strategy, io, id, sub)?;
        }
    }

    for region in RamRegion::ALL {
        let bank = target.ram(region);
        if bank.is_empty() {
            continue;
        }
        let id = region.chunk_id();
        if compress_chip && region == RamRegion::Chip {
            write_chunk_compressed(io, id, bank)?;
        } else {
            write_chunk(io, id, Some(bank))?;
        }
    }

    write_end(io)
}

/// Serialize one subsystem and write its chunk.
fn emit<I: SnapshotIo + ?Sized>(
    arena: &mut Arena,
    strategy: AllocStrategy,
    io: &mut I,
    id: ChunkId,
    sub: &dyn Snapshottable,
) -> Result<bool, SnapshotError> {
    let Some(len) = sub.state_size() else {
        return write_chunk(io, id, None);
    };
    match strategy {
        AllocStrategy::Arena => match arena.alloc(len) {
            Ok(buf) => {
                sub.save_state(&mut ByteWriter::new(&mut *buf));
                write_chunk(io, id, Some(buf))
            }
            Err(e) => {
                error!("{id}: {e}");
                write_chunk(io, id, None)
            }
        },
        AllocStrategy::Heap => write_chunk(io, id, save_to_vec(sub).as_deref()),
    }
}

/// Phase one of a restore: check the header, then apply every chunk and
/// record RAM chunk positions.
fn read_snapshot<I, T>(
    reader: &mut ChunkReader,
    io: &mut I,
    target: &mut T,
    limits: &RamLimits,
) -> Result<(RestoreReport, RestorePlan), SnapshotError>
where
    I: SnapshotIo + ?Sized,
    T: SnapshotTarget + ?Sized,
{
    let scratch = reader.capacity();
    let first = reader.read_chunk(io)?;
    if first.id != ChunkId::ASF {
        return Err(SnapshotError::BadMagic(first.id));
    }
    let bytes = match first.payload {
        Payload::Data(bytes) => bytes,
        Payload::Oversized => {
            return Err(SnapshotError::HeaderTooLarge {
                len: first.len,
                capacity: scratch,
            });
        }
        Payload::Deferred | Payload::Empty => &[],
    };
    let mut header = AsfHeader::default();
    header.restore_state(&mut ByteReader::new(bytes))?;
    info!(
        "snapshot: saved with '{} {}', description '{}'",
        header.emulator, header.emulator_version, header.description
    );

    target.set_snapshot_state(SnapshotState::Restoring);

    let mut report = RestoreReport {
        header,
        applied: 0,
        skipped: 0,
        mismatched: 0,
        complete: false,
    };
    let mut plan = RestorePlan::default();
    loop {
        let chunk = match reader.read_chunk(io) {
            Ok(chunk) => chunk,
            Err(SnapshotError::Truncated { offset }) => {
                warn!("snapshot: stream ends at offset {offset} without END marker");
                break;
            }
            Err(e) => return Err(e),
        };
        if chunk.id == ChunkId::END {
            report.complete = true;
            break;
        }
        dispatch(&chunk, target, &mut plan, &mut report, limits);
    }
    Ok((report, plan))
}

fn dispatch<T: SnapshotTarget + ?Sized>(
    chunk: &Chunk<'_>,
    target: &mut T,
    plan: &mut RestorePlan,
    report: &mut RestoreReport,
    limits: &RamLimits,
) {
    let id = chunk.id;
    let bytes = match chunk.payload {
        Payload::Deferred => {
            if let Some(region) = id.ram_region() {
                let limit = limits.get(region);
                let stored_limit = if chunk.compressed() { deflate_bound(limit) } else { limit };
                if chunk.len > stored_limit {
                    warn!("{id}: {} byte bank exceeds the {limit} byte limit, skipped", chunk.len);
                    report.skipped += 1;
                    return;
                }
                plan.record(RamChunk {
                    region,
                    offset: chunk.payload_offset,
                    len: chunk.len,
                    compressed: chunk.compressed(),
                });
            }
            return;
        }
        Payload::Oversized => {
            report.skipped += 1;
            return;
        }
        Payload::Data(bytes) => bytes,
        Payload::Empty => &[],
    };

    if id == ChunkId::ROM {
        debug!("{id}: ignored");
        report.skipped += 1;
        return;
    }
    let Some(sub) = target.subsystem_mut(id) else {
        warn!("unknown chunk '{id}' size {} bytes", chunk.len);
        report.skipped += 1;
        return;
    };

    let mut r = ByteReader::new(bytes);
    if let Err(e) = sub.restore_state(&mut r) {
        warn!("{id}: {e}");
        report.mismatched += 1;
        return;
    }
    if r.position() != chunk.len || r.overrun() {
        warn!(
            "Chunk '{id}' total size {} bytes but read {} bytes!",
            chunk.len + CHUNK_HEADER_LEN,
            r.position() + CHUNK_HEADER_LEN
        );
        report.mismatched += 1;
    }
    report.applied += 1;
}
