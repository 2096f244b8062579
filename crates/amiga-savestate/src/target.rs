//! What the engine needs from the emulated machine.

use format_asf::{ChunkId, RamRegion, Snapshottable};

use crate::plan::RamLayout;

/// Process-wide snapshot flag seen by subsystems that initialise
/// differently while a restore is in progress (memory bank sizing, CPU
/// setup).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SnapshotState {
    #[default]
    Idle,
    Restoring,
}

/// Repairs for state that is derived during execution and never saved.
///
/// The engine calls these in a fixed order after every restore; see
/// [`crate::resync`].
pub trait ResyncTarget {
    /// Mark the CIA timer events inactive.
    fn disable_timer_events(&mut self);
    /// Set every scheduler entry's last-processed cycle to now.
    fn resync_event_clocks(&mut self);
    /// Drop sub-E-clock remainders.
    fn reset_timer_carry(&mut self);
    /// Park the timer countdowns at their sentinel.
    fn force_timer_countdowns(&mut self);
    /// Recompute and reschedule the timer event from the restored timers.
    fn recompute_timer_events(&mut self);
    fn disable_audio_event(&mut self);
    fn resync_audio_clock(&mut self);
    fn recompute_audio_event(&mut self);
    /// Clear the framebuffer and forget every cached line decision.
    fn invalidate_display(&mut self);
    /// Recompute display timing from the restored chipset registers.
    fn reinit_display_timing(&mut self);
}

/// A machine the engine can save and restore.
pub trait SnapshotTarget: ResyncTarget {
    /// The subsystem stored under `id`, if this machine has one.
    fn subsystem(&self, id: ChunkId) -> Option<&dyn Snapshottable>;

    fn subsystem_mut(&mut self, id: ChunkId) -> Option<&mut dyn Snapshottable>;

    fn ram(&self, region: RamRegion) -> &[u8];

    fn ram_mut(&mut self, region: RamRegion) -> &mut [u8];

    /// (Re)allocate memory banks. While the snapshot state is
    /// [`SnapshotState::Restoring`], sizes present in `layout` override the
    /// configured ones.
    fn allocate_ram(&mut self, layout: &RamLayout);

    fn snapshot_state(&self) -> SnapshotState;

    fn set_snapshot_state(&mut self, state: SnapshotState);
}
