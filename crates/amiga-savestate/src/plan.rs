//! Deferred RAM restore.
//!
//! Phase one records where each RAM chunk sits in the stream. Phase two,
//! once the whole stream has been parsed, sizes the memory banks from those
//! records and copies the contents in.

use std::io::SeekFrom;

use format_asf::RamRegion;
use log::{debug, warn};

use crate::chunk::inflate;
use crate::config::RamLimits;
use crate::error::SnapshotError;
use crate::io::{SnapshotIo, read_full};
use crate::target::SnapshotTarget;

/// One recorded RAM chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RamChunk {
    pub region: RamRegion,
    /// Stream offset of the first payload byte.
    pub offset: u64,
    /// Stored payload length.
    pub len: usize,
    pub compressed: bool,
}

/// Bank sizes a snapshot asks for. `None` keeps the configured size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RamLayout {
    sizes: [Option<usize>; 4],
}

impl RamLayout {
    #[must_use]
    pub fn size(&self, region: RamRegion) -> Option<usize> {
        self.sizes[region.index()]
    }

    pub fn set(&mut self, region: RamRegion, size: usize) {
        self.sizes[region.index()] = Some(size);
    }
}

#[derive(Debug, Default)]
pub struct RestorePlan {
    chunks: [Option<RamChunk>; 4],
}

impl RestorePlan {
    pub fn record(&mut self, chunk: RamChunk) {
        let slot = &mut self.chunks[chunk.region.index()];
        if slot.is_some() {
            warn!("{}: repeated, later chunk wins", chunk.region.chunk_id());
        }
        *slot = Some(chunk);
    }

    pub fn chunks(&self) -> impl Iterator<Item = &RamChunk> {
        self.chunks.iter().flatten()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks().next().is_none()
    }

    /// Phase two: size the banks and fill them from the stream.
    ///
    /// Compressed chunks are inflated first because their bank size is only
    /// known afterwards. A chunk that cannot be read, or inflates past its
    /// region's limit, leaves its bank as allocated.
    pub fn apply<I, T>(&self, io: &mut I, target: &mut T, limits: &RamLimits) -> Result<RamLayout, SnapshotError>
    where
        I: SnapshotIo + ?Sized,
        T: SnapshotTarget + ?Sized,
    {
        let mut layout = RamLayout::default();
        let mut inflated: [Option<Vec<u8>>; 4] = Default::default();

        for chunk in self.chunks() {
            if !chunk.compressed {
                layout.set(chunk.region, chunk.len);
                continue;
            }
            let mut packed = vec![0u8; chunk.len];
            io.seek(SeekFrom::Start(chunk.offset))?;
            if read_full(io, &mut packed)? < chunk.len {
                warn!("{}: compressed payload truncated", chunk.region.chunk_id());
                continue;
            }
            match inflate(&packed, limits.get(chunk.region)) {
                Ok(data) => {
                    layout.set(chunk.region, data.len());
                    inflated[chunk.region.index()] = Some(data);
                }
                Err(e) => warn!("{}: cannot inflate ({e})", chunk.region.chunk_id()),
            }
        }

        target.allocate_ram(&layout);

        for chunk in self.chunks() {
            let id = chunk.region.chunk_id();
            let bank = target.ram_mut(chunk.region);
            if chunk.compressed {
                let Some(data) = &inflated[chunk.region.index()] else {
                    continue;
                };
                let n = data.len().min(bank.len());
                bank[..n].copy_from_slice(&data[..n]);
                if n < data.len() {
                    warn!("{id}: bank holds {n} of {} bytes", data.len());
                }
            } else {
                let n = chunk.len.min(bank.len());
                io.seek(SeekFrom::Start(chunk.offset))?;
                let got = read_full(io, &mut bank[..n])?;
                if got < chunk.len {
                    warn!("{id}: restored {got} of {} bytes", chunk.len);
                }
            }
            debug!("{id}: restored into {} byte bank", bank.len());
        }
        Ok(layout)
    }
}
