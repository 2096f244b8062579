//! Cycle-based event scheduler.
//!
//! One entry per event source. An entry is due at `evtime`; `oldcycles` is
//! the cycle at which the source last caught up with the machine. Neither
//! field is saved: both are rebuilt after a restore.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Hsync,
    Cia,
    Audio,
}

impl EventKind {
    pub const ALL: [Self; 3] = [Self::Hsync, Self::Cia, Self::Audio];

    fn index(self) -> usize {
        match self {
            Self::Hsync => 0,
            Self::Cia => 1,
            Self::Audio => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventEntry {
    pub active: bool,
    pub evtime: u64,
    pub oldcycles: u64,
}

#[derive(Debug, Default)]
pub struct EventScheduler {
    now: u64,
    entries: [EventEntry; 3],
}

impl EventScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn set_now(&mut self, now: u64) {
        self.now = now;
    }

    #[must_use]
    pub fn entry(&self, kind: EventKind) -> EventEntry {
        self.entries[kind.index()]
    }

    pub fn entry_mut(&mut self, kind: EventKind) -> &mut EventEntry {
        &mut self.entries[kind.index()]
    }

    pub fn schedule(&mut self, kind: EventKind, evtime: u64) {
        let entry = self.entry_mut(kind);
        entry.active = true;
        entry.evtime = evtime;
    }

    pub fn disable(&mut self, kind: EventKind) {
        self.entry_mut(kind).active = false;
    }

    /// `kind` is active and its time has come.
    #[must_use]
    pub fn is_due(&self, kind: EventKind) -> bool {
        let entry = self.entry(kind);
        entry.active && entry.evtime <= self.now
    }

    /// Earliest active due time.
    #[must_use]
    pub fn next_due(&self) -> Option<u64> {
        self.entries
            .iter()
            .filter(|e| e.active)
            .map(|e| e.evtime)
            .min()
    }

    /// Bring every entry's last-processed cycle to now.
    pub fn resync_clocks(&mut self) {
        let now = self.now;
        for entry in &mut self.entries {
            entry.oldcycles = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_due_ignores_inactive_entries() {
        let mut ev = EventScheduler::new();
        assert_eq!(ev.next_due(), None);
        ev.schedule(EventKind::Hsync, 454);
        ev.schedule(EventKind::Cia, 100);
        ev.disable(EventKind::Cia);
        assert_eq!(ev.next_due(), Some(454));
    }

    #[test]
    fn due_only_once_time_arrives() {
        let mut ev = EventScheduler::new();
        ev.schedule(EventKind::Audio, 50);
        ev.set_now(49);
        assert!(!ev.is_due(EventKind::Audio));
        ev.set_now(50);
        assert!(ev.is_due(EventKind::Audio));
    }

    #[test]
    fn resync_moves_every_clock() {
        let mut ev = EventScheduler::new();
        ev.set_now(1000);
        ev.resync_clocks();
        for kind in EventKind::ALL {
            assert_eq!(ev.entry(kind).oldcycles, 1000);
        }
    }
}
