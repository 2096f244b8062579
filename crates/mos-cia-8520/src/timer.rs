//! One 16-bit CIA interval timer.
//!
//! A running timer at value N underflows on the (N+1)th tick it counts,
//! reloads from the latch, and carries on (continuous) or stops (one-shot).

pub(crate) struct Timer {
    counter: u16,
    latch: u16,
    running: bool,
    oneshot: bool,
}

impl Timer {
    pub(crate) fn new() -> Self {
        Self {
            counter: 0xFFFF,
            latch: 0xFFFF,
            running: false,
            oneshot: false,
        }
    }

    pub(crate) fn counter(&self) -> u16 {
        self.counter
    }

    pub(crate) fn latch(&self) -> u16 {
        self.latch
    }

    pub(crate) fn running(&self) -> bool {
        self.running
    }

    pub(crate) fn oneshot(&self) -> bool {
        self.oneshot
    }

    /// Ticks between consecutive underflows in continuous mode.
    pub(crate) fn period(&self) -> u64 {
        u64::from(self.latch) + 1
    }

    pub(crate) fn ticks_to_underflow(&self) -> u64 {
        u64::from(self.counter) + 1
    }

    pub(crate) fn set_latch_lo(&mut self, value: u8) {
        self.latch = (self.latch & 0xFF00) | u16::from(value);
    }

    /// Returns true when the write started a stopped one-shot timer.
    pub(crate) fn set_latch_hi(&mut self, value: u8) -> bool {
        self.latch = (self.latch & 0x00FF) | (u16::from(value) << 8);
        if self.running {
            return false;
        }
        self.counter = self.latch;
        if self.oneshot {
            self.running = true;
            return true;
        }
        false
    }

    /// Apply a control register write (CRA/CRB low nibble plus force load).
    pub(crate) fn set_control(&mut self, value: u8) {
        self.running = value & 0x01 != 0;
        self.oneshot = value & 0x08 != 0;
        if value & 0x10 != 0 {
            self.counter = self.latch;
        }
    }

    pub(crate) fn restore(&mut self, counter: u16, latch: u16, control: u8) {
        self.counter = counter;
        self.latch = latch;
        self.running = control & 0x01 != 0;
        self.oneshot = control & 0x08 != 0;
    }

    /// Count `ticks` and return how many underflows happened.
    pub(crate) fn advance(&mut self, ticks: u64) -> u64 {
        if !self.running || ticks == 0 {
            return 0;
        }
        let first = self.ticks_to_underflow();
        if ticks < first {
            self.counter -= ticks as u16;
            return 0;
        }
        if self.oneshot {
            self.counter = self.latch;
            self.running = false;
            return 1;
        }
        let rest = ticks - first;
        let period = self.period();
        self.counter = self.latch - (rest % period) as u16;
        1 + rest / period
    }
}
