//! The contract between the snapshot engine and each emulated subsystem.

use crate::codec::{ByteReader, ByteWriter};

/// Errors a subsystem can report while applying its chunk.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    /// The chunk describes a configuration this build cannot represent.
    #[error("unsupported {what}: {value:#x}")]
    Unsupported { what: &'static str, value: u32 },
    /// The payload ended before every field was read.
    #[error("payload truncated: needed {needed} bytes, had {available}")]
    Truncated { needed: usize, available: usize },
}

/// A subsystem whose state travels in one chunk.
///
/// `save_state` must write exactly `state_size()` bytes. `restore_state`
/// may consume fewer or more than the payload holds; the engine compares
/// the reader position against the chunk length and logs any difference.
pub trait Snapshottable {
    /// Payload length, or `None` when the subsystem has nothing to save and
    /// its chunk is omitted from the stream.
    fn state_size(&self) -> Option<usize>;

    fn save_state(&self, w: &mut ByteWriter<'_>);

    /// Apply a payload.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] when the payload cannot be applied. Fields read
    /// before the failure may already have been written.
    fn restore_state(&mut self, r: &mut ByteReader<'_>) -> Result<(), StateError>;
}

/// Serialize a subsystem into a fresh heap buffer.
#[must_use]
pub fn save_to_vec(sub: &dyn Snapshottable) -> Option<Vec<u8>> {
    let len = sub.state_size()?;
    let mut buf = vec![0u8; len];
    let mut w = ByteWriter::new(&mut buf);
    sub.save_state(&mut w);
    debug_assert!(!w.overflowed(), "state_size under-reported");
    Some(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        value: u32,
        present: bool,
    }

    impl Snapshottable for Counter {
        fn state_size(&self) -> Option<usize> {
            self.present.then_some(4)
        }

        fn save_state(&self, w: &mut ByteWriter<'_>) {
            w.write_u32(self.value);
        }

        fn restore_state(&mut self, r: &mut ByteReader<'_>) -> Result<(), StateError> {
            if r.remaining() < 4 {
                return Err(StateError::Truncated {
                    needed: 4,
                    available: r.remaining(),
                });
            }
            self.value = r.read_u32();
            Ok(())
        }
    }

    #[test]
    fn absent_subsystem_saves_nothing() {
        let c = Counter {
            value: 7,
            present: false,
        };
        assert!(save_to_vec(&c).is_none());
    }

    #[test]
    fn save_then_restore() {
        let c = Counter {
            value: 0x0102_0304,
            present: true,
        };
        let bytes = save_to_vec(&c).expect("present");
        assert_eq!(bytes, [1, 2, 3, 4]);

        let mut d = Counter {
            value: 0,
            present: true,
        };
        d.restore_state(&mut ByteReader::new(&bytes)).expect("valid");
        assert_eq!(d.value, 0x0102_0304);
    }

    #[test]
    fn short_payload_reports_truncation() {
        let mut d = Counter {
            value: 0,
            present: true,
        };
        let err = d.restore_state(&mut ByteReader::new(&[1, 2])).unwrap_err();
        assert_eq!(
            err,
            StateError::Truncated {
                needed: 4,
                available: 2
            }
        );
    }
}
