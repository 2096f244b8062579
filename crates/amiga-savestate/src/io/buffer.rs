use std::io::{self, SeekFrom};

use super::{IoMode, SnapshotIo};

enum Storage<'a> {
    Read(&'a [u8]),
    Write(&'a mut [u8]),
}

/// Session over a caller-owned fixed-size buffer.
///
/// Reads and writes stop at the buffer boundary without failing, and seeks
/// clamp into `[0, capacity]`.
pub struct BufferBackend<'a> {
    storage: Storage<'a>,
    pos: usize,
    written: usize,
}

impl<'a> BufferBackend<'a> {
    #[must_use]
    pub fn reader(data: &'a [u8]) -> Self {
        Self {
            storage: Storage::Read(data),
            pos: 0,
            written: 0,
        }
    }

    #[must_use]
    pub fn writer(buf: &'a mut [u8]) -> Self {
        Self {
            storage: Storage::Write(buf),
            pos: 0,
            written: 0,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        match &self.storage {
            Storage::Read(data) => data.len(),
            Storage::Write(buf) => buf.len(),
        }
    }

    /// Furthest byte written.
    #[must_use]
    pub fn written(&self) -> usize {
        self.written
    }
}

impl SnapshotIo for BufferBackend<'_> {
    fn mode(&self) -> IoMode {
        IoMode::Buffer
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let Storage::Write(buf) = &mut self.storage else {
            return Ok(0);
        };
        let n = data.len().min(buf.len() - self.pos);
        buf[self.pos..self.pos + n].copy_from_slice(&data[..n]);
        self.pos += n;
        self.written = self.written.max(self.pos);
        Ok(n)
    }

    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let src: &[u8] = match &self.storage {
            Storage::Read(data) => data,
            Storage::Write(buf) => buf,
        };
        let n = out.len().min(src.len() - self.pos);
        out[..n].copy_from_slice(&src[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let cap = self.capacity() as i128;
        let target = match pos {
            SeekFrom::Start(n) => i128::from(n),
            SeekFrom::Current(d) => self.pos as i128 + i128::from(d),
            SeekFrom::End(d) => cap + i128::from(d),
        };
        self.pos = target.clamp(0, cap) as usize;
        Ok(self.pos as u64)
    }

    fn tell(&self) -> u64 {
        self.pos as u64
    }

    fn write_capacity_left(&self) -> Option<u64> {
        match self.storage {
            Storage::Read(_) => Some(0),
            Storage::Write(ref buf) => Some((buf.len() - self.pos) as u64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_truncates_at_capacity() {
        let mut buf = [0u8; 4];
        let mut io = BufferBackend::writer(&mut buf);
        assert_eq!(io.write(&[1, 2, 3]).expect("infallible"), 3);
        assert_eq!(io.write(&[4, 5, 6]).expect("infallible"), 1);
        assert_eq!(io.write(&[7]).expect("infallible"), 0);
        assert_eq!(io.written(), 4);
        drop(io);
        assert_eq!(buf, [1, 2, 3, 4]);
    }

    #[test]
    fn read_stops_at_end() {
        let data = [9u8, 8, 7];
        let mut io = BufferBackend::reader(&data);
        let mut out = [0u8; 5];
        assert_eq!(io.read(&mut out).expect("infallible"), 3);
        assert_eq!(io.read(&mut out).expect("infallible"), 0);
    }

    #[test]
    fn seek_clamps_into_buffer() {
        let data = [0u8; 10];
        let mut io = BufferBackend::reader(&data);
        assert_eq!(io.seek(SeekFrom::Current(-3)).expect("infallible"), 0);
        assert_eq!(io.seek(SeekFrom::Start(50)).expect("infallible"), 10);
        assert_eq!(io.seek(SeekFrom::End(-4)).expect("infallible"), 6);
        assert_eq!(io.tell(), 6);
    }

    #[test]
    fn reader_refuses_writes() {
        let data = [0u8; 4];
        let mut io = BufferBackend::reader(&data);
        assert_eq!(io.write(&[1]).expect("infallible"), 0);
        assert_eq!(io.write_capacity_left(), Some(0));
    }
}
