//! Amiga State File (ASF) format.
//!
//! An ASF snapshot is an IFF-like sequence of chunks. Every chunk starts with
//! a 12-byte header (4-byte name, big-endian total length including the
//! header, big-endian flags word) followed by the payload, zero-padded to a
//! 4-byte boundary. The stream opens with an `ASF ` header chunk and closes
//! with an 8-byte `END ` marker that has no flags word.
//!
//! This crate is pure: it knows the framing and the payload codec, but not
//! where the bytes go. Emulated chips implement [`Snapshottable`] to produce
//! and consume their own chunk payloads.

mod chunk;
mod codec;
mod header;
mod state;

pub use chunk::{
    CHUNK_HEADER_LEN, ChunkHeader, ChunkId, END_MARKER, FLAG_COMPRESSED, RamRegion,
    SHORT_HEADER_LEN, aligned_len, encode_header, padding,
};
pub use codec::{ByteReader, ByteWriter};
pub use header::{ASF_VERSION, AsfHeader};
pub use state::{Snapshottable, StateError, save_to_vec};
