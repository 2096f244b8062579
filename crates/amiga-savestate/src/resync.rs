//! Post-restore resynchronization.
//!
//! A snapshot carries register state but not the scheduling state derived
//! from it: pending event times, last-processed cycle stamps, sub-cycle
//! remainders and rendering caches. These steps rebuild it. Each stale
//! event is disabled before its replacement is computed, and the snapshot
//! flag is cleared only after every repair has run.

use log::trace;

use crate::config::DisplayReinit;
use crate::target::{SnapshotState, SnapshotTarget};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResyncStep {
    DisableTimerEvents,
    ResyncEventClocks,
    ResetTimerCarry,
    ForceTimerCountdowns,
    RecomputeTimerEvents,
    DisableAudioEvent,
    ResyncAudioClock,
    RecomputeAudioEvent,
    InvalidateDisplay,
    ReinitDisplayTiming,
    ClearRestoring,
}

impl ResyncStep {
    /// Every step in execution order.
    pub const ORDER: [Self; 11] = [
        Self::DisableTimerEvents,
        Self::ResyncEventClocks,
        Self::ResetTimerCarry,
        Self::ForceTimerCountdowns,
        Self::RecomputeTimerEvents,
        Self::DisableAudioEvent,
        Self::ResyncAudioClock,
        Self::RecomputeAudioEvent,
        Self::InvalidateDisplay,
        Self::ReinitDisplayTiming,
        Self::ClearRestoring,
    ];

    fn run<T: SnapshotTarget + ?Sized>(self, target: &mut T) {
        match self {
            Self::DisableTimerEvents => target.disable_timer_events(),
            Self::ResyncEventClocks => target.resync_event_clocks(),
            Self::ResetTimerCarry => target.reset_timer_carry(),
            Self::ForceTimerCountdowns => target.force_timer_countdowns(),
            Self::RecomputeTimerEvents => target.recompute_timer_events(),
            Self::DisableAudioEvent => target.disable_audio_event(),
            Self::ResyncAudioClock => target.resync_audio_clock(),
            Self::RecomputeAudioEvent => target.recompute_audio_event(),
            Self::InvalidateDisplay => target.invalidate_display(),
            Self::ReinitDisplayTiming => target.reinit_display_timing(),
            Self::ClearRestoring => target.set_snapshot_state(SnapshotState::Idle),
        }
    }
}

/// Run the repair sequence. `prior_restores` counts restores already
/// completed by this engine and selects whether display timing is
/// reinitialised under `policy`.
///
/// Returns the steps that ran.
pub fn resynchronize<T: SnapshotTarget + ?Sized>(
    target: &mut T,
    policy: DisplayReinit,
    prior_restores: u32,
) -> Vec<ResyncStep> {
    let reinit = policy.applies(prior_restores);
    let mut ran = Vec::with_capacity(ResyncStep::ORDER.len());
    for step in ResyncStep::ORDER {
        if step == ResyncStep::ReinitDisplayTiming && !reinit {
            trace!("resync: {step:?} skipped (restore #{})", prior_restores + 1);
            continue;
        }
        trace!("resync: {step:?}");
        step.run(target);
        ran.push(step);
    }
    ran
}
