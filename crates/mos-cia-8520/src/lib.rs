//! MOS 8520 Complex Interface Adapter (CIA).
//!
//! The 8520 is a general-purpose I/O and timer chip used in the Amiga (two
//! instances: CIA-A and CIA-B). It provides two 8-bit I/O ports, two 16-bit
//! countdown timers, a 24-bit time-of-day counter, a serial shift register,
//! and an interrupt controller.
//!
//! Timers are advanced in batches rather than per E-clock. The host feeds
//! CPU cycles through [`Cia8520::advance_cycles`]; a sub-E-clock remainder
//! carries the fraction left over when the cycle count is not a multiple of
//! ten. [`Cia8520::cycles_until_event`] tells the host scheduler when the
//! next timer underflow is due.

mod timer;

use format_asf::{ByteReader, ByteWriter, Snapshottable, StateError};

use timer::Timer;

/// CPU cycles per E-clock tick.
pub const CYCLES_PER_ECLOCK: u64 = 10;

/// Cached countdown value meaning "no timer event pending".
pub const EVENT_SENTINEL: u32 = u32::MAX;

/// `CIAA`/`CIAB` chunk payload length.
pub const STATE_SIZE: usize = 29;

/// ICR bits.
pub const ICR_TA: u8 = 0x01;
pub const ICR_TB: u8 = 0x02;
pub const ICR_ALARM: u8 = 0x04;
pub const ICR_SP: u8 = 0x08;
pub const ICR_FLAG: u8 = 0x10;

/// MOS 8520 Complex Interface Adapter.
pub struct Cia8520 {
    label: &'static str,
    port_a: u8,
    port_b: u8,
    ddr_a: u8,
    ddr_b: u8,
    pub external_a: u8,
    pub external_b: u8,

    timer_a: Timer,
    timer_b: Timer,

    icr_status: u8,
    icr_mask: u8,

    cra: u8,
    crb: u8,

    sdr: u8,
    tod_counter: u32,
    tod_alarm: u32,

    // TOD read latch: reading the MSB (reg A) freezes a snapshot.
    // Subsequent reads of regs 9/8 return latched values.
    // Reading reg 8 releases the latch.
    tod_latch: u32,
    tod_latched: bool,

    // TOD write halt: writing the MSB (reg A) stops the counter.
    // Writing the LSB (reg 8) restarts it.
    tod_halted: bool,

    /// CPU cycles accumulated toward the next E-clock tick (0..10).
    div10: u8,

    /// E-clock ticks until the next timer underflow, or [`EVENT_SENTINEL`].
    /// Derived from the timers and never serialized.
    event_countdown: u32,
}

impl Cia8520 {
    #[must_use]
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            port_a: 0xFF,
            port_b: 0xFF,
            ddr_a: 0,
            ddr_b: 0,
            external_a: 0xFF,
            external_b: 0xFF,
            timer_a: Timer::new(),
            timer_b: Timer::new(),
            icr_status: 0,
            icr_mask: 0,
            cra: 0,
            crb: 0,
            sdr: 0,
            tod_counter: 0,
            tod_alarm: 0,
            tod_latch: 0,
            tod_latched: false,
            tod_halted: false,
            div10: 0,
            event_countdown: EVENT_SENTINEL,
        }
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Run the timers for `cycles` CPU cycles. Returns the ICR bits raised.
    pub fn advance_cycles(&mut self, cycles: u64) -> u8 {
        let total = u64::from(self.div10) + cycles;
        self.div10 = (total % CYCLES_PER_ECLOCK) as u8;
        self.advance_eclocks(total / CYCLES_PER_ECLOCK)
    }

    /// Run the timers for `eclocks` E-clock ticks. Returns the ICR bits raised.
    pub fn advance_eclocks(&mut self, eclocks: u64) -> u8 {
        let mut raised = 0;

        let a_underflows = if self.timer_a_counts_eclock() {
            self.timer_a.advance(eclocks)
        } else {
            0
        };
        if a_underflows > 0 {
            raised |= ICR_TA;
            if self.timer_a.oneshot() {
                self.cra &= !0x01;
            }
        }

        let b_ticks = match self.timer_b_source() {
            0 => eclocks,
            2 | 3 => a_underflows,
            _ => 0,
        };
        if self.timer_b.running() && self.timer_b.advance(b_ticks) > 0 {
            raised |= ICR_TB;
            if self.timer_b.oneshot() {
                self.crb &= !0x01;
            }
        }

        self.icr_status |= raised;
        self.recompute_countdown();
        raised
    }

    fn timer_a_counts_eclock(&self) -> bool {
        self.timer_a.running() && self.cra & 0x20 == 0
    }

    fn timer_b_source(&self) -> u8 {
        (self.crb >> 5) & 0x03
    }

    /// E-clock ticks until the next timer A or B underflow.
    #[must_use]
    pub fn next_underflow_eclocks(&self) -> Option<u64> {
        let a = self
            .timer_a_counts_eclock()
            .then(|| self.timer_a.ticks_to_underflow());

        let b = if self.timer_b.running() {
            match self.timer_b_source() {
                0 => Some(self.timer_b.ticks_to_underflow()),
                2 | 3 if self.timer_a_counts_eclock() => {
                    let b_left = u64::from(self.timer_b.counter());
                    if b_left == 0 {
                        a
                    } else if self.timer_a.oneshot() {
                        None
                    } else {
                        a.map(|first| first + b_left * self.timer_a.period())
                    }
                }
                _ => None,
            }
        } else {
            None
        };

        match (a, b) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Rebuild the cached event countdown from the current timer state.
    pub fn recompute_countdown(&mut self) {
        self.event_countdown = self.expected_countdown();
    }

    /// The countdown the current timer state implies. A cached value that
    /// differs from this was computed for some other timer state.
    #[must_use]
    pub fn expected_countdown(&self) -> u32 {
        self.next_underflow_eclocks()
            .map_or(EVENT_SENTINEL, |n| n.min(u64::from(EVENT_SENTINEL - 1)) as u32)
    }

    /// Park the cached countdown at the sentinel until the next recompute.
    pub fn force_countdown_sentinel(&mut self) {
        self.event_countdown = EVENT_SENTINEL;
    }

    #[must_use]
    pub fn event_countdown(&self) -> u32 {
        self.event_countdown
    }

    /// CPU cycles until the cached timer event, or `None` when nothing is
    /// pending.
    #[must_use]
    pub fn cycles_until_event(&self) -> Option<u64> {
        if self.event_countdown == EVENT_SENTINEL || self.event_countdown == 0 {
            return None;
        }
        let to_next_tick = CYCLES_PER_ECLOCK - u64::from(self.div10);
        Some(to_next_tick + (u64::from(self.event_countdown) - 1) * CYCLES_PER_ECLOCK)
    }

    /// Drop the sub-E-clock remainder.
    pub fn reset_divider(&mut self) {
        self.div10 = 0;
    }

    #[must_use]
    pub fn divider(&self) -> u8 {
        self.div10
    }

    #[must_use]
    pub fn irq_active(&self) -> bool {
        (self.icr_status & self.icr_mask & 0x1F) != 0
    }

    pub fn read(&mut self, reg: u8) -> u8 {
        match reg & 0x0F {
            0x00 => self.port_a_output(),
            0x01 => self.port_b_output(),
            0x02 => self.ddr_a,
            0x03 => self.ddr_b,
            0x04 => self.timer_a.counter() as u8,
            0x05 => (self.timer_a.counter() >> 8) as u8,
            0x06 => self.timer_b.counter() as u8,
            0x07 => (self.timer_b.counter() >> 8) as u8,
            0x08 => {
                let val = self.tod_visible();
                self.tod_latched = false;
                val as u8
            }
            0x09 => (self.tod_visible() >> 8) as u8,
            0x0A => {
                if !self.tod_latched {
                    self.tod_latch = self.tod_counter;
                    self.tod_latched = true;
                }
                (self.tod_latch >> 16) as u8
            }
            0x0C => self.sdr,
            0x0D => self.read_icr_and_clear(),
            0x0E => self.cra,
            0x0F => self.crb,
            _ => 0xFF,
        }
    }

    fn tod_visible(&self) -> u32 {
        if self.tod_latched {
            self.tod_latch
        } else {
            self.tod_counter
        }
    }

    pub fn read_icr_and_clear(&mut self) -> u8 {
        let any = if self.irq_active() { 0x80 } else { 0x00 };
        let result = self.icr_status | any;
        self.icr_status = 0;
        result
    }

    pub fn write(&mut self, reg: u8, value: u8) {
        match reg & 0x0F {
            0x00 => self.port_a = value,
            0x01 => self.port_b = value,
            0x02 => self.ddr_a = value,
            0x03 => self.ddr_b = value,
            0x04 => self.timer_a.set_latch_lo(value),
            0x05 => {
                // 8520: in one-shot mode, writing the high byte starts the timer.
                if self.timer_a.set_latch_hi(value) {
                    self.cra |= 0x01;
                }
            }
            0x06 => self.timer_b.set_latch_lo(value),
            0x07 => {
                if self.timer_b.set_latch_hi(value) {
                    self.crb |= 0x01;
                }
            }
            0x08 => {
                self.write_tod_register(0, value);
                self.tod_halted = false;
            }
            0x09 => self.write_tod_register(1, value),
            0x0A => {
                self.write_tod_register(2, value);
                self.tod_halted = true;
            }
            0x0C => self.sdr = value,
            0x0D => {
                if value & 0x80 != 0 {
                    self.icr_mask |= value & 0x1F;
                } else {
                    self.icr_mask &= !(value & 0x1F);
                }
            }
            // Bit 4 (force load) is a strobe and never reads back.
            0x0E => {
                self.cra = value & !0x10;
                self.timer_a.set_control(value);
            }
            0x0F => {
                self.crb = value & !0x10;
                self.timer_b.set_control(value);
            }
            _ => {}
        }
        self.recompute_countdown();
    }

    /// Pulse the TOD counter. Call this from the system when the
    /// appropriate external signal arrives:
    /// - CIA-A: VSYNC (once per frame)
    /// - CIA-B: HSYNC (once per scanline)
    pub fn tod_pulse(&mut self) {
        if self.tod_halted {
            return;
        }
        self.tod_counter = self.tod_counter.wrapping_add(1) & 0xFF_FFFF;
        if self.tod_counter == self.tod_alarm {
            self.icr_status |= ICR_ALARM;
        }
    }

    fn write_tod_register(&mut self, byte_index: u8, value: u8) {
        let shift = u32::from(byte_index) * 8;
        let mask = !(0xFFu32 << shift);
        if self.crb & 0x80 != 0 {
            self.tod_alarm = ((self.tod_alarm & mask) | (u32::from(value) << shift)) & 0xFF_FFFF;
        } else {
            self.tod_counter =
                ((self.tod_counter & mask) | (u32::from(value) << shift)) & 0xFF_FFFF;
        }
    }

    #[must_use]
    pub fn tod_counter(&self) -> u32 {
        self.tod_counter
    }
    #[must_use]
    pub fn tod_alarm(&self) -> u32 {
        self.tod_alarm
    }
    #[must_use]
    pub fn tod_halted(&self) -> bool {
        self.tod_halted
    }

    #[must_use]
    pub fn timer_a(&self) -> u16 {
        self.timer_a.counter()
    }
    #[must_use]
    pub fn timer_b(&self) -> u16 {
        self.timer_b.counter()
    }
    #[must_use]
    pub fn timer_a_running(&self) -> bool {
        self.timer_a.running()
    }
    #[must_use]
    pub fn timer_b_running(&self) -> bool {
        self.timer_b.running()
    }
    #[must_use]
    pub fn icr_status(&self) -> u8 {
        self.icr_status
    }
    #[must_use]
    pub fn icr_mask(&self) -> u8 {
        self.icr_mask
    }
    #[must_use]
    pub fn cra(&self) -> u8 {
        self.cra
    }
    #[must_use]
    pub fn crb(&self) -> u8 {
        self.crb
    }

    #[must_use]
    pub fn port_a_output(&self) -> u8 {
        (self.port_a & self.ddr_a) | (self.external_a & !self.ddr_a)
    }

    #[must_use]
    pub fn port_b_output(&self) -> u8 {
        (self.port_b & self.ddr_b) | (self.external_b & !self.ddr_b)
    }

    /// Hardware reset: clears all registers to power-on state.
    /// TOD counter and alarm survive.
    pub fn reset(&mut self) {
        self.port_a = 0xFF;
        self.port_b = 0xFF;
        self.ddr_a = 0;
        self.ddr_b = 0;
        self.timer_a = Timer::new();
        self.timer_b = Timer::new();
        self.icr_status = 0;
        self.icr_mask = 0;
        self.cra = 0;
        self.crb = 0;
        self.sdr = 0;
        self.tod_latched = false;
        self.tod_halted = false;
        self.div10 = 0;
        self.event_countdown = EVENT_SENTINEL;
    }
}

fn write_u24(w: &mut ByteWriter<'_>, value: u32) {
    w.write_u8(value as u8);
    w.write_u8((value >> 8) as u8);
    w.write_u8((value >> 16) as u8);
}

fn read_u24(r: &mut ByteReader<'_>) -> u32 {
    let lo = u32::from(r.read_u8());
    let mid = u32::from(r.read_u8());
    let hi = u32::from(r.read_u8());
    lo | (mid << 8) | (hi << 16)
}

impl Snapshottable for Cia8520 {
    fn state_size(&self) -> Option<usize> {
        Some(STATE_SIZE)
    }

    fn save_state(&self, w: &mut ByteWriter<'_>) {
        w.write_u8(self.port_a);
        w.write_u8(self.port_b);
        w.write_u8(self.ddr_a);
        w.write_u8(self.ddr_b);
        w.write_u8(self.timer_a.counter() as u8);
        w.write_u8((self.timer_a.counter() >> 8) as u8);
        w.write_u8(self.timer_b.counter() as u8);
        w.write_u8((self.timer_b.counter() >> 8) as u8);
        write_u24(w, self.tod_counter);
        w.write_u8(0xFF);
        w.write_u8(self.sdr);
        w.write_u8(self.icr_status);
        w.write_u8(self.cra);
        w.write_u8(self.crb);

        w.write_u8(self.icr_mask);
        w.write_u8(self.timer_a.latch() as u8);
        w.write_u8((self.timer_a.latch() >> 8) as u8);
        w.write_u8(self.timer_b.latch() as u8);
        w.write_u8((self.timer_b.latch() >> 8) as u8);
        write_u24(w, self.tod_latch);
        write_u24(w, self.tod_alarm);
        w.write_u8(u8::from(self.tod_latched) | (u8::from(self.tod_halted) << 1));
        w.write_u8(self.div10);
    }

    /// The cached event countdown is left alone: it belongs to the host
    /// scheduler and is rebuilt once the restore is complete.
    fn restore_state(&mut self, r: &mut ByteReader<'_>) -> Result<(), StateError> {
        if r.remaining() < STATE_SIZE {
            return Err(StateError::Truncated {
                needed: STATE_SIZE,
                available: r.remaining(),
            });
        }
        self.port_a = r.read_u8();
        self.port_b = r.read_u8();
        self.ddr_a = r.read_u8();
        self.ddr_b = r.read_u8();
        let ta = r.read_u16().swap_bytes();
        let tb = r.read_u16().swap_bytes();
        self.tod_counter = read_u24(r);
        r.skip(1);
        self.sdr = r.read_u8();
        self.icr_status = r.read_u8();
        self.cra = r.read_u8() & !0x10;
        self.crb = r.read_u8() & !0x10;

        self.icr_mask = r.read_u8();
        let ta_latch = r.read_u16().swap_bytes();
        let tb_latch = r.read_u16().swap_bytes();
        self.tod_latch = read_u24(r);
        self.tod_alarm = read_u24(r);
        let flags = r.read_u8();
        self.tod_latched = flags & 0x01 != 0;
        self.tod_halted = flags & 0x02 != 0;
        let div10 = r.read_u8();
        if u64::from(div10) >= CYCLES_PER_ECLOCK {
            return Err(StateError::Unsupported {
                what: "E-clock divider",
                value: u32::from(div10),
            });
        }
        self.div10 = div10;

        self.timer_a.restore(ta, ta_latch, self.cra);
        self.timer_b.restore(tb, tb_latch, self.crb);
        Ok(())
    }
}
