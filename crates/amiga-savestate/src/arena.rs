//! Fixed-size bump allocator for buffer-mode saves.
//!
//! Chunk payloads drawn from the arena live until the next [`Arena::reset`],
//! which the engine issues at the start of every buffer save. Nothing is
//! freed individually.

/// Allocation granularity.
pub const ARENA_ALIGN: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("arena overflow: {requested} bytes requested, {available} of {capacity} free")]
pub struct ArenaError {
    pub requested: usize,
    pub available: usize,
    pub capacity: usize,
}

pub struct Arena {
    buf: Box<[u8]>,
    pos: usize,
    high_water: usize,
}

impl Arena {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity].into_boxed_slice(),
            pos: 0,
            high_water: 0,
        }
    }

    pub fn reset(&mut self) {
        self.pos = 0;
    }

    /// Hand out `size` zeroed bytes. The cursor advances by `size` rounded
    /// up to [`ARENA_ALIGN`].
    pub fn alloc(&mut self, size: usize) -> Result<&mut [u8], ArenaError> {
        let step = size.div_ceil(ARENA_ALIGN) * ARENA_ALIGN;
        let available = self.buf.len() - self.pos;
        if step > available {
            return Err(ArenaError {
                requested: size,
                available,
                capacity: self.buf.len(),
            });
        }
        let start = self.pos;
        self.pos += step;
        self.high_water = self.high_water.max(self.pos);
        let region = &mut self.buf[start..start + size];
        region.fill(0);
        Ok(region)
    }

    #[must_use]
    pub fn used(&self) -> usize {
        self.pos
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Largest cursor position seen since creation.
    #[must_use]
    pub fn high_water(&self) -> usize {
        self.high_water
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocations_are_aligned() {
        let mut arena = Arena::new(64);
        assert_eq!(arena.alloc(5).expect("fits").len(), 5);
        assert_eq!(arena.used(), 8);
        arena.alloc(4).expect("fits");
        assert_eq!(arena.used(), 12);
    }

    #[test]
    fn overflow_reports_and_keeps_cursor() {
        let mut arena = Arena::new(16);
        arena.alloc(12).expect("fits");
        let err = arena.alloc(5).unwrap_err();
        assert_eq!(
            err,
            ArenaError {
                requested: 5,
                available: 4,
                capacity: 16
            }
        );
        assert_eq!(arena.used(), 12);
        arena.alloc(4).expect("exact fit");
    }

    #[test]
    fn reset_reclaims_and_zeroes_on_reuse() {
        let mut arena = Arena::new(8);
        arena.alloc(8).expect("fits").fill(0xAA);
        arena.reset();
        assert_eq!(arena.used(), 0);
        assert!(arena.alloc(8).expect("fits").iter().all(|&b| b == 0));
        assert_eq!(arena.high_water(), 8);
    }
}
