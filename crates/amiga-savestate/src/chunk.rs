//! Chunk writer and reader on top of a [`SnapshotIo`] session.

use std::io::{Read, SeekFrom, Write};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use format_asf::{
    CHUNK_HEADER_LEN, ChunkHeader, ChunkId, END_MARKER, FLAG_COMPRESSED, SHORT_HEADER_LEN,
    encode_header, padding,
};
use log::{trace, warn};

use crate::error::SnapshotError;
use crate::io::{SnapshotIo, read_full, write_all};

const ZEROS: [u8; 3] = [0; 3];

/// Room kept free for the `END ` marker on bounded backends.
const END_RESERVE: u64 = END_MARKER.len() as u64;

/// Write one chunk. `None` skips it. On a bounded backend a chunk that would
/// not leave room for the end marker is dropped with a warning.
///
/// Returns whether the chunk was written.
pub fn write_chunk<I: SnapshotIo + ?Sized>(
    io: &mut I,
    id: ChunkId,
    payload: Option<&[u8]>,
) -> Result<bool, SnapshotError> {
    let Some(payload) = payload else {
        trace!("{id}: nothing to save");
        return Ok(false);
    };
    write_framed(io, id, payload, 0)
}

/// Write one chunk with a zlib-compressed payload and flag bit 0 set.
/// Falls back to a plain chunk if compression fails.
pub fn write_chunk_compressed<I: SnapshotIo + ?Sized>(
    io: &mut I,
    id: ChunkId,
    payload: &[u8],
) -> Result<bool, SnapshotError> {
    match deflate(payload) {
        Ok(packed) => {
            trace!("{id}: {} bytes packed to {}", payload.len(), packed.len());
            write_framed(io, id, &packed, FLAG_COMPRESSED)
        }
        Err(e) => {
            warn!("{id}: compression failed ({e}), storing uncompressed");
            write_framed(io, id, payload, 0)
        }
    }
}

pub fn write_end<I: SnapshotIo + ?Sized>(io: &mut I) -> Result<(), SnapshotError> {
    write_all(io, &END_MARKER)?;
    Ok(())
}

fn write_framed<I: SnapshotIo + ?Sized>(
    io: &mut I,
    id: ChunkId,
    payload: &[u8],
    flags: u32,
) -> Result<bool, SnapshotError> {
    let pad = padding(payload.len());
    let total = (CHUNK_HEADER_LEN + payload.len() + pad) as u64;
    if let Some(left) = io.write_capacity_left() {
        if total + END_RESERVE > left {
            warn!("{id}: {total} bytes do not fit in the {left} bytes left, chunk dropped");
            return Ok(false);
        }
    }
    let Ok(len) = u32::try_from(payload.len()) else {
        warn!("{id}: {} byte payload exceeds the chunk length field, chunk dropped", payload.len());
        return Ok(false);
    };
    write_all(io, &encode_header(id, len, flags))?;
    write_all(io, payload)?;
    write_all(io, &ZEROS[..pad])?;
    trace!("{id}: wrote {len} bytes");
    Ok(true)
}

fn deflate(payload: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut enc = ZlibEncoder::new(Vec::with_capacity(payload.len() / 2), Compression::best());
    enc.write_all(payload)?;
    enc.finish()
}

/// Inflate a compressed chunk payload of at most `max` bytes.
pub fn inflate(packed: &[u8], max: usize) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    ZlibDecoder::new(packed)
        .take(max as u64 + 1)
        .read_to_end(&mut out)?;
    if out.len() > max {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("inflates past {max} bytes"),
        ));
    }
    Ok(out)
}

/// Largest zlib stream `len` bytes can deflate to.
#[must_use]
pub(crate) const fn deflate_bound(len: usize) -> usize {
    len + (len >> 12) + (len >> 14) + (len >> 25) + 13
}

/// What the reader did with a chunk's payload.
#[derive(Debug, PartialEq, Eq)]
pub enum Payload<'a> {
    /// Staged in the scratch buffer.
    Data(&'a [u8]),
    /// A RAM bank: left in the stream for the second restore phase.
    Deferred,
    /// Larger than the scratch buffer: skipped.
    Oversized,
    /// Header-only chunk.
    Empty,
}

#[derive(Debug)]
pub struct Chunk<'a> {
    pub id: ChunkId,
    pub flags: u32,
    /// Declared payload length.
    pub len: usize,
    /// Stream offset of the chunk header.
    pub offset: u64,
    /// Stream offset of the first payload byte.
    pub payload_offset: u64,
    pub payload: Payload<'a>,
}

impl Chunk<'_> {
    #[must_use]
    pub fn compressed(&self) -> bool {
        self.flags & FLAG_COMPRESSED != 0
    }
}

/// Chunk reader with its fixed scratch buffer.
pub struct ChunkReader {
    scratch: Box<[u8]>,
}

impl ChunkReader {
    #[must_use]
    pub fn new(scratch_capacity: usize) -> Self {
        Self {
            scratch: vec![0; scratch_capacity].into_boxed_slice(),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.scratch.len()
    }

    /// Read the next chunk, leaving the stream at the start of the one after
    /// it (past any padding).
    pub fn read_chunk<I: SnapshotIo + ?Sized>(
        &mut self,
        io: &mut I,
    ) -> Result<Chunk<'_>, SnapshotError> {
        let offset = io.tell();
        let mut prefix = [0u8; SHORT_HEADER_LEN];
        if read_full(io, &mut prefix)? < SHORT_HEADER_LEN {
            return Err(SnapshotError::Truncated { offset });
        }
        let mut header = ChunkHeader::from_prefix(prefix);
        if header.is_short() {
            return Ok(Chunk {
                id: header.id,
                flags: 0,
                len: 0,
                offset,
                payload_offset: io.tell(),
                payload: Payload::Empty,
            });
        }

        let mut flags = [0u8; 4];
        if read_full(io, &mut flags)? < flags.len() {
            return Err(SnapshotError::Truncated { offset });
        }
        header.flags = u32::from_be_bytes(flags);

        let len = header.payload_len();
        let stored = (len + padding(len)) as u64;
        let payload_offset = io.tell();
        let id = header.id;

        let payload = if id.is_ram() {
            skip(io, stored, offset)?;
            Payload::Deferred
        } else if len > self.scratch.len() {
            warn!(
                "{id}: {len} byte chunk exceeds the {} byte scratch buffer, skipped",
                self.scratch.len()
            );
            skip(io, stored, offset)?;
            Payload::Oversized
        } else {
            if read_full(io, &mut self.scratch[..len])? < len {
                return Err(SnapshotError::Truncated { offset });
            }
            skip(io, padding(len) as u64, offset)?;
            Payload::Data(&self.scratch[..len])
        };
        trace!("{id}: {len} bytes at {offset}");

        Ok(Chunk {
            id,
            flags: header.flags,
            len,
            offset,
            payload_offset,
            payload,
        })
    }
}

/// Seek forward `count` bytes, failing if the stream ends first.
///
/// Files seek past their end without complaint, so the last skipped byte is
/// read back to prove it exists.
fn skip<I: SnapshotIo + ?Sized>(io: &mut I, count: u64, offset: u64) -> Result<(), SnapshotError> {
    if count == 0 {
        return Ok(());
    }
    let last = io.tell() + count - 1;
    let Ok(delta) = i64::try_from(count - 1) else {
        return Err(SnapshotError::Truncated { offset });
    };
    if io.seek(SeekFrom::Current(delta))? < last {
        return Err(SnapshotError::Truncated { offset });
    }
    let mut byte = [0u8; 1];
    if read_full(io, &mut byte)? < 1 {
        return Err(SnapshotError::Truncated { offset });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::BufferBackend;

    fn write_stream(chunks: &[(ChunkId, &[u8])]) -> Vec<u8> {
        let mut buf = vec![0u8; 4096];
        let mut io = BufferBackend::writer(&mut buf);
        for &(id, payload) in chunks {
            assert!(write_chunk(&mut io, id, Some(payload)).expect("buffer io"));
        }
        write_end(&mut io).expect("buffer io");
        let n = io.written();
        buf.truncate(n);
        buf
    }

    #[test]
    fn framing_and_padding() {
        let bytes = write_stream(&[(ChunkId::CPU, &[1, 2, 3, 4, 5])]);
        assert_eq!(&bytes[..4], b"CPU ");
        assert_eq!(&bytes[4..8], &17u32.to_be_bytes());
        assert_eq!(&bytes[8..12], &[0, 0, 0, 0]);
        assert_eq!(&bytes[12..17], &[1, 2, 3, 4, 5]);
        assert_eq!(&bytes[17..20], &[0, 0, 0]);
        assert_eq!(&bytes[20..], b"END \0\0\0\0");
    }

    #[test]
    fn none_payload_writes_nothing() {
        let mut buf = [0u8; 32];
        let mut io = BufferBackend::writer(&mut buf);
        assert!(!write_chunk(&mut io, ChunkId::AGAC, None).expect("buffer io"));
        assert_eq!(io.tell(), 0);
    }

    #[test]
    fn chunk_that_would_crowd_out_end_is_dropped() {
        let mut buf = [0u8; 24];
        let mut io = BufferBackend::writer(&mut buf);
        assert!(!write_chunk(&mut io, ChunkId::CHIP, Some(&[0; 8])).expect("buffer io"));
        assert!(write_chunk(&mut io, ChunkId::EXPA, Some(&[0; 4])).expect("buffer io"));
        write_end(&mut io).expect("buffer io");
        assert_eq!(io.written(), 24);
    }

    #[test]
    fn reader_stages_payload_and_consumes_padding() {
        let bytes = write_stream(&[(ChunkId::CIAA, &[7; 29]), (ChunkId::EXPA, &[1; 8])]);
        let mut io = BufferBackend::reader(&bytes);
        let mut reader = ChunkReader::new(64);

        let c = reader.read_chunk(&mut io).expect("chunk");
        assert_eq!(c.id, ChunkId::CIAA);
        assert_eq!(c.len, 29);
        assert_eq!(c.payload, Payload::Data(&[7; 29]));
        assert_eq!(io.tell(), 44);

        let c = reader.read_chunk(&mut io).expect("chunk");
        assert_eq!(c.id, ChunkId::EXPA);
        assert_eq!(c.offset, 44);

        let c = reader.read_chunk(&mut io).expect("end");
        assert_eq!(c.id, ChunkId::END);
        assert_eq!(c.payload, Payload::Empty);
        assert_eq!(io.tell(), bytes.len() as u64);
    }

    #[test]
    fn ram_chunks_are_deferred_with_position() {
        let bytes = write_stream(&[(ChunkId::EXPA, &[0; 8]), (ChunkId::CRAM, &[0xAB; 1024])]);
        let mut io = BufferBackend::reader(&bytes);
        let mut reader = ChunkReader::new(16);
        reader.read_chunk(&mut io).expect("expa");
        let c = reader.read_chunk(&mut io).expect("cram");
        assert_eq!(c.payload, Payload::Deferred);
        assert_eq!(c.payload_offset, 20 + 12);
        assert_eq!(c.len, 1024);
        assert_eq!(reader.read_chunk(&mut io).expect("end").id, ChunkId::END);
    }

    #[test]
    fn oversized_chunk_is_skipped() {
        let bytes = write_stream(&[(ChunkId::CHIP, &[1; 100]), (ChunkId::EXPA, &[2; 8])]);
        let mut io = BufferBackend::reader(&bytes);
        let mut reader = ChunkReader::new(32);
        assert_eq!(reader.read_chunk(&mut io).expect("chip").payload, Payload::Oversized);
        let c = reader.read_chunk(&mut io).expect("expa");
        assert_eq!(c.payload, Payload::Data(&[2; 8]));
    }

    #[test]
    fn short_length_field_clamps_payload() {
        let bytes = *b"CHIP\0\0\0\x0A\0\0\0\0END \0\0\0\x08";
        let mut io = BufferBackend::reader(&bytes);
        let mut reader = ChunkReader::new(32);
        let c = reader.read_chunk(&mut io).expect("short");
        assert_eq!(c.len, 0);
        assert_eq!(c.payload, Payload::Empty);
        assert_eq!(io.tell(), 8);
    }

    #[test]
    fn truncated_payload_is_reported() {
        let bytes = write_stream(&[(ChunkId::CPU, &[9; 40])]);
        let mut io = BufferBackend::reader(&bytes[..30]);
        let mut reader = ChunkReader::new(64);
        assert!(matches!(
            reader.read_chunk(&mut io),
            Err(SnapshotError::Truncated { offset: 0 })
        ));
    }

    #[test]
    fn compressed_chunk_inflates_back() {
        let ram = vec![0x5Au8; 4096];
        let mut buf = vec![0u8; 8192];
        let mut io = BufferBackend::writer(&mut buf);
        write_chunk_compressed(&mut io, ChunkId::CRAM, &ram).expect("buffer io");
        write_end(&mut io).expect("buffer io");
        let n = io.written();
        assert!(n < 256, "uniform RAM packs small");

        let mut io = BufferBackend::reader(&buf[..n]);
        let mut reader = ChunkReader::new(64);
        let c = reader.read_chunk(&mut io).expect("cram");
        assert!(c.compressed());
        let (start, len) = (c.payload_offset as usize, c.len);
        assert_eq!(inflate(&buf[start..start + len], ram.len()).expect("zlib"), ram);
        assert!(inflate(&buf[start..start + len], ram.len() - 1).is_err());
    }

    #[test]
    fn ram_chunk_past_end_of_stream_is_truncated() {
        let mut bytes = encode_header(ChunkId::FRAM, 0x4000_0000, 0).to_vec();
        bytes.extend_from_slice(&[0; 36]);
        let mut io = BufferBackend::reader(&bytes);
        let mut reader = ChunkReader::new(64);
        assert!(matches!(
            reader.read_chunk(&mut io),
            Err(SnapshotError::Truncated { offset: 0 })
        ));
    }

    #[test]
    fn incompressible_data_stays_within_bound() {
        let noise: Vec<u8> = (0..4096u32).map(|i| (i.wrapping_mul(2_654_435_761) >> 13) as u8).collect();
        let packed = deflate(&noise).expect("zlib");
        assert!(packed.len() <= deflate_bound(noise.len()));
    }
}
