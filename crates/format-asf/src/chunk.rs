//! Chunk names and framing.

use std::fmt;

/// Full chunk header: name, total length, flags.
pub const CHUNK_HEADER_LEN: usize = 12;
/// Header of a chunk with no flags word (only `END ` in practice).
pub const SHORT_HEADER_LEN: usize = 8;
/// Flags bit 0: payload is zlib-compressed.
pub const FLAG_COMPRESSED: u32 = 1;
/// The stream terminator: name plus a zero length word, no flags. Readers
/// take any length below 12 as header-only, so streams ending in a length of
/// 8 load too.
pub const END_MARKER: [u8; 8] = *b"END \0\0\0\0";

/// Four-character chunk name.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkId([u8; 4]);

impl ChunkId {
    pub const ASF: Self = Self(*b"ASF ");
    pub const CPU: Self = Self(*b"CPU ");
    pub const DSK0: Self = Self(*b"DSK0");
    pub const DSK1: Self = Self(*b"DSK1");
    pub const DSK2: Self = Self(*b"DSK2");
    pub const DSK3: Self = Self(*b"DSK3");
    pub const DISK: Self = Self(*b"DISK");
    pub const CHIP: Self = Self(*b"CHIP");
    pub const AGAC: Self = Self(*b"AGAC");
    pub const SPR0: Self = Self(*b"SPR0");
    pub const SPR1: Self = Self(*b"SPR1");
    pub const SPR2: Self = Self(*b"SPR2");
    pub const SPR3: Self = Self(*b"SPR3");
    pub const SPR4: Self = Self(*b"SPR4");
    pub const SPR5: Self = Self(*b"SPR5");
    pub const SPR6: Self = Self(*b"SPR6");
    pub const SPR7: Self = Self(*b"SPR7");
    pub const AUD0: Self = Self(*b"AUD0");
    pub const AUD1: Self = Self(*b"AUD1");
    pub const AUD2: Self = Self(*b"AUD2");
    pub const AUD3: Self = Self(*b"AUD3");
    pub const CIAA: Self = Self(*b"CIAA");
    pub const CIAB: Self = Self(*b"CIAB");
    pub const EXPA: Self = Self(*b"EXPA");
    pub const CRAM: Self = Self(*b"CRAM");
    pub const BRAM: Self = Self(*b"BRAM");
    pub const FRAM: Self = Self(*b"FRAM");
    pub const ZRAM: Self = Self(*b"ZRAM");
    pub const ROM: Self = Self(*b"ROM ");
    pub const END: Self = Self(*b"END ");

    pub const DSK: [Self; 4] = [Self::DSK0, Self::DSK1, Self::DSK2, Self::DSK3];
    pub const SPR: [Self; 8] = [
        Self::SPR0,
        Self::SPR1,
        Self::SPR2,
        Self::SPR3,
        Self::SPR4,
        Self::SPR5,
        Self::SPR6,
        Self::SPR7,
    ];
    pub const AUD: [Self; 4] = [Self::AUD0, Self::AUD1, Self::AUD2, Self::AUD3];

    #[must_use]
    pub const fn new(name: [u8; 4]) -> Self {
        Self(name)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// RAM bank this chunk carries, if any. RAM payloads are never staged
    /// through the scratch buffer.
    #[must_use]
    pub fn ram_region(self) -> Option<RamRegion> {
        RamRegion::ALL.into_iter().find(|r| r.chunk_id() == self)
    }

    #[must_use]
    pub fn is_ram(self) -> bool {
        self.ram_region().is_some()
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            let c = if b.is_ascii_graphic() || b == b' ' { b as char } else { '?' };
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkId(\"{self}\")")
    }
}

/// The four RAM banks, in save order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RamRegion {
    /// Chip RAM (`CRAM`).
    Chip,
    /// Slow "bogo" RAM at $C00000 (`BRAM`).
    Bogo,
    /// Zorro II fast RAM (`FRAM`).
    Fast,
    /// Zorro III fast RAM (`ZRAM`).
    Z3,
}

impl RamRegion {
    pub const ALL: [Self; 4] = [Self::Chip, Self::Bogo, Self::Fast, Self::Z3];

    #[must_use]
    pub const fn chunk_id(self) -> ChunkId {
        match self {
            Self::Chip => ChunkId::CRAM,
            Self::Bogo => ChunkId::BRAM,
            Self::Fast => ChunkId::FRAM,
            Self::Z3 => ChunkId::ZRAM,
        }
    }

    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Chip => 0,
            Self::Bogo => 1,
            Self::Fast => 2,
            Self::Z3 => 3,
        }
    }
}

/// Zero bytes needed after a payload of `len` bytes.
#[must_use]
pub const fn padding(len: usize) -> usize {
    (4 - len % 4) % 4
}

/// Payload length rounded up to the chunk alignment.
#[must_use]
pub const fn aligned_len(len: usize) -> usize {
    len + padding(len)
}

/// Encode the 12-byte header for a payload of `payload_len` bytes.
#[must_use]
pub fn encode_header(id: ChunkId, payload_len: u32, flags: u32) -> [u8; CHUNK_HEADER_LEN] {
    let total = payload_len.wrapping_add(CHUNK_HEADER_LEN as u32);
    let mut out = [0u8; CHUNK_HEADER_LEN];
    out[..4].copy_from_slice(id.as_bytes());
    out[4..8].copy_from_slice(&total.to_be_bytes());
    out[8..].copy_from_slice(&flags.to_be_bytes());
    out
}

/// A decoded chunk header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub id: ChunkId,
    /// Declared length including the header itself.
    pub total_len: u32,
    pub flags: u32,
}

impl ChunkHeader {
    /// Decode name and total length from the first eight header bytes.
    /// The flags word, when present, is read separately.
    #[must_use]
    pub fn from_prefix(prefix: [u8; SHORT_HEADER_LEN]) -> Self {
        let [a, b, c, d, l0, l1, l2, l3] = prefix;
        Self {
            id: ChunkId::new([a, b, c, d]),
            total_len: u32::from_be_bytes([l0, l1, l2, l3]),
            flags: 0,
        }
    }

    /// A declared length shorter than the full header marks an 8-byte
    /// header-only chunk with no flags word.
    #[must_use]
    pub fn is_short(&self) -> bool {
        (self.total_len as usize) < CHUNK_HEADER_LEN
    }

    /// Payload length, clamped at zero for corrupt framing.
    #[must_use]
    pub fn payload_len(&self) -> usize {
        (self.total_len as usize).saturating_sub(CHUNK_HEADER_LEN)
    }

    #[must_use]
    pub fn compressed(&self) -> bool {
        self.flags & FLAG_COMPRESSED != 0
    }
}
