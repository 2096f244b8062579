//! Byte-stream backends.
//!
//! The chunk codec talks to one [`SnapshotIo`] per session. File sessions go
//! through the firmware file primitives in [`file`]; buffer sessions copy
//! into or out of a caller-owned slice in [`buffer`].

mod buffer;
mod file;

pub use buffer::BufferBackend;
pub use file::{FileBackend, FirmwareFile, FirmwareFs, HostFile, HostFs, OpenMode};

use std::io::{self, SeekFrom};

/// Which kind of session is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoMode {
    File,
    Buffer,
}

pub trait SnapshotIo {
    fn mode(&self) -> IoMode;

    /// Write up to `data.len()` bytes, returning how many were accepted.
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Read up to `out.len()` bytes, returning how many were produced.
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize>;

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64>;

    fn tell(&self) -> u64;

    /// Bytes that can still be written, or `None` when unbounded.
    fn write_capacity_left(&self) -> Option<u64> {
        None
    }
}

/// Write all of `data` or fail with `WriteZero`.
pub(crate) fn write_all<I: SnapshotIo + ?Sized>(io: &mut I, mut data: &[u8]) -> io::Result<()> {
    while !data.is_empty() {
        let n = io.write(data)?;
        if n == 0 {
            return Err(io::ErrorKind::WriteZero.into());
        }
        data = &data[n..];
    }
    Ok(())
}

/// Read until `out` is full or the stream ends. Returns bytes read.
pub(crate) fn read_full<I: SnapshotIo + ?Sized>(io: &mut I, out: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < out.len() {
        let n = io.read(&mut out[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
