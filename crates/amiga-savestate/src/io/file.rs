//! File sessions over the firmware's narrow file API.
//!
//! The firmware offers open/read/write/lseek/close and a global sync. It has
//! no tell, so [`FileBackend`] tracks the position itself.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use super::{IoMode, SnapshotIo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    /// Create or truncate.
    Write,
}

pub trait FirmwareFile {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize>;
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;
    /// Returns the new absolute offset.
    fn lseek(&mut self, pos: SeekFrom) -> io::Result<u64>;
    fn close(self) -> io::Result<()>;
}

pub trait FirmwareFs {
    type File: FirmwareFile;

    fn open(&mut self, path: &Path, mode: OpenMode) -> io::Result<Self::File>;

    /// Flush filesystem buffers to the medium.
    fn sync(&mut self) -> io::Result<()>;
}

/// The host filesystem through `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostFs;

pub struct HostFile {
    file: File,
    writable: bool,
}

impl FirmwareFile for HostFile {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        self.file.read(out)
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.file.write(data)
    }

    fn lseek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }

    /// A written file reaches the medium before close returns.
    fn close(mut self) -> io::Result<()> {
        if self.writable {
            self.file.flush()?;
            self.file.sync_all()?;
        }
        Ok(())
    }
}

impl FirmwareFs for HostFs {
    type File = HostFile;

    fn open(&mut self, path: &Path, mode: OpenMode) -> io::Result<HostFile> {
        let file = match mode {
            OpenMode::Read => File::open(path)?,
            OpenMode::Write => OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)?,
        };
        Ok(HostFile {
            file,
            writable: mode == OpenMode::Write,
        })
    }

    /// Host files are synced one by one as they are closed.
    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// An open file session with a manually tracked position.
pub struct FileBackend<H> {
    file: H,
    pos: u64,
}

impl<H: FirmwareFile> FileBackend<H> {
    #[must_use]
    pub fn new(file: H) -> Self {
        Self { file, pos: 0 }
    }

    pub fn close(self) -> io::Result<()> {
        self.file.close()
    }
}

impl<H: FirmwareFile> SnapshotIo for FileBackend<H> {
    fn mode(&self) -> IoMode {
        IoMode::File
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let n = self.file.write(data)?;
        self.pos += n as u64;
        Ok(n)
    }

    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let n = self.file.read(out)?;
        self.pos += n as u64;
        Ok(n)
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.pos = self.file.lseek(pos)?;
        Ok(self.pos)
    }

    fn tell(&self) -> u64 {
        self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("amiga-savestate-{}-{name}", std::process::id()))
    }

    #[test]
    fn position_follows_reads_writes_and_seeks() {
        let path = temp_path("pos.bin");
        let mut fs = HostFs;

        let mut out = FileBackend::new(fs.open(&path, OpenMode::Write).expect("create"));
        assert_eq!(out.write(b"hello world").expect("write"), 11);
        assert_eq!(out.tell(), 11);
        out.close().expect("close");

        let mut io = FileBackend::new(fs.open(&path, OpenMode::Read).expect("open"));
        let mut buf = [0u8; 5];
        assert_eq!(io.read(&mut buf).expect("read"), 5);
        assert_eq!(io.tell(), 5);
        assert_eq!(io.seek(SeekFrom::Current(1)).expect("seek"), 6);
        assert_eq!(io.read(&mut buf).expect("read"), 5);
        assert_eq!(&buf, b"world");
        assert_eq!(io.read(&mut buf).expect("read"), 0);
        assert_eq!(io.tell(), 11);
        io.close().expect("close");

        std::fs::remove_file(&path).expect("cleanup");
    }

    #[test]
    fn closing_syncs_written_files_only() {
        let path = temp_path("sync.bin");
        let mut fs = HostFs;

        let mut file = fs.open(&path, OpenMode::Write).expect("create");
        assert!(file.writable);
        assert_eq!(file.write(b"ASF ").expect("write"), 4);
        file.close().expect("flush and sync");
        fs.sync().expect("sync");

        let reader = fs.open(&path, OpenMode::Read).expect("open");
        assert!(!reader.writable);
        reader.close().expect("close");
        assert_eq!(std::fs::read(&path).expect("read back"), b"ASF ");

        std::fs::remove_file(&path).expect("cleanup");
    }

    #[test]
    fn missing_file_fails_to_open() {
        let path = temp_path("does-not-exist.asf");
        assert!(HostFs.open(&path, OpenMode::Read).is_err());
    }
}
