//! Save and restore engine for Amiga State File snapshots.
//!
//! A save walks the machine's subsystems in a fixed order and streams each
//! chunk to a file or a caller-owned buffer. A restore runs in two phases:
//! the first applies every subsystem chunk and records where the RAM banks
//! sit in the stream; the second sizes the banks, copies them in, and then
//! rebuilds the scheduler and display state a snapshot never carries.
//!
//! The machine side is abstracted behind [`SnapshotTarget`] and
//! [`ResyncTarget`]; storage behind [`io::SnapshotIo`].

mod arena;
mod chunk;
mod config;
mod engine;
mod error;
pub mod io;
mod plan;
pub mod resync;
mod target;

pub use arena::{ARENA_ALIGN, Arena, ArenaError};
pub use chunk::{
    Chunk, ChunkReader, Payload, inflate, write_chunk, write_chunk_compressed, write_end,
};
pub use config::{AllocStrategy, DisplayReinit, RamLimits, SnapshotConfig};
pub use engine::{BUFFER_DESCRIPTION, RestoreReport, SAVE_ORDER, SnapshotEngine};
pub use error::{Notice, SnapshotError};
pub use plan::{RamChunk, RamLayout, RestorePlan};
pub use resync::{ResyncStep, resynchronize};
pub use target::{ResyncTarget, SnapshotState, SnapshotTarget};
