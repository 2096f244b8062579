use std::fmt;
use std::io;

use format_asf::{ChunkId, StateError};

use crate::arena::ArenaError;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("not a snapshot: expected 'ASF ' header, found '{0}'")]
    BadMagic(ChunkId),
    #[error("snapshot header of {len} bytes exceeds the {capacity}-byte scratch buffer")]
    HeaderTooLarge { len: usize, capacity: usize },
    #[error("snapshot header: {0}")]
    Header(#[from] StateError),
    #[error("stream ends at offset {offset} inside a chunk header")]
    Truncated { offset: u64 },
    #[error("a file restore is waiting for restore_finish")]
    Busy,
    #[error("{capacity}-byte buffer cannot hold a snapshot")]
    BufferTooSmall { capacity: usize },
    #[error(transparent)]
    Arena(#[from] ArenaError),
    #[error("configuration: {0}")]
    Config(#[from] serde_json::Error),
}

/// Short user-visible outcome of the last public operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    Saved,
    Restored,
    SaveFailed,
    RestoreFailed,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Saved => "State saved",
            Self::Restored => "Restored",
            Self::SaveFailed => "Error savestate",
            Self::RestoreFailed => "Error loadstate",
        })
    }
}
