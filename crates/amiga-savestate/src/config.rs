//! Engine configuration.
//!
//! All fields have defaults, so a JSON file only needs the keys it changes:
//!
//! ```json
//! { "arena_capacity": 16384, "display_reinit": "every_restore" }
//! ```

use std::path::Path;

use format_asf::RamRegion;
use serde::{Deserialize, Serialize};

use crate::error::SnapshotError;

/// Where buffer-mode saves take their chunk payload buffers from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocStrategy {
    /// Bump-allocate from the engine's fixed arena, reset per save.
    Arena,
    /// Allocate one heap buffer per chunk and drop it once written.
    Heap,
}

/// When the last resynchronization step (display timing reinit) runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayReinit {
    /// Only on the first restore since the engine was created.
    FirstRestoreOnly,
    EveryRestore,
    Never,
}

impl DisplayReinit {
    /// Whether the step applies to the restore preceded by `prior_restores`
    /// completed restores.
    #[must_use]
    pub fn applies(self, prior_restores: u32) -> bool {
        match self {
            Self::FirstRestoreOnly => prior_restores == 0,
            Self::EveryRestore => true,
            Self::Never => false,
        }
    }
}

/// Largest bank a restore may size, per RAM region, in bytes. Chunks that
/// ask for more are skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RamLimits {
    pub chip: usize,
    pub bogo: usize,
    pub fast: usize,
    pub z3: usize,
}

impl Default for RamLimits {
    fn default() -> Self {
        Self {
            chip: 8 * 1024 * 1024,
            bogo: 0x1C_0000,
            fast: 8 * 1024 * 1024,
            z3: 256 * 1024 * 1024,
        }
    }
}

impl RamLimits {
    #[must_use]
    pub fn get(&self, region: RamRegion) -> usize {
        match region {
            RamRegion::Chip => self.chip,
            RamRegion::Bogo => self.bogo,
            RamRegion::Fast => self.fast,
            RamRegion::Z3 => self.z3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub arena_capacity: usize,
    pub scratch_capacity: usize,
    /// Buffer size callers must provide; reported by `serialize_size`.
    pub max_snapshot_size: usize,
    pub buffer_alloc: AllocStrategy,
    /// Deflate the chip RAM chunk in file mode.
    pub compress_chip_ram: bool,
    pub display_reinit: DisplayReinit,
    pub ram_limits: RamLimits,
    pub emulator_name: String,
    pub emulator_version: String,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            arena_capacity: 8192,
            scratch_capacity: 32768,
            max_snapshot_size: 5 * 1024 * 1024,
            buffer_alloc: AllocStrategy::Arena,
            compress_chip_ram: true,
            display_reinit: DisplayReinit::FirstRestoreOnly,
            ram_limits: RamLimits::default(),
            emulator_name: "UAE".to_owned(),
            emulator_version: "0.8.29".to_owned(),
        }
    }
}

impl SnapshotConfig {
    pub fn from_json(text: &str) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = SnapshotConfig::from_json(r#"{ "arena_capacity": 16384, "display_reinit": "every_restore" }"#)
            .expect("valid");
        assert_eq!(cfg.arena_capacity, 16384);
        assert_eq!(cfg.display_reinit, DisplayReinit::EveryRestore);
        assert_eq!(cfg.scratch_capacity, 32768);
        assert_eq!(cfg.emulator_name, "UAE");
    }

    #[test]
    fn json_round_trips() {
        let cfg = SnapshotConfig {
            buffer_alloc: AllocStrategy::Heap,
            compress_chip_ram: false,
            ..SnapshotConfig::default()
        };
        let text = cfg.to_json().expect("serializable");
        assert_eq!(SnapshotConfig::from_json(&text).expect("valid"), cfg);
    }

    #[test]
    fn bad_json_is_a_config_error() {
        let err = SnapshotConfig::from_json("{ arena_capacity: }").unwrap_err();
        assert!(matches!(err, SnapshotError::Config(_)));
    }

    #[test]
    fn ram_limits_can_be_narrowed_per_bank() {
        let cfg = SnapshotConfig::from_json(r#"{ "ram_limits": { "fast": 1048576 } }"#).expect("valid");
        assert_eq!(cfg.ram_limits.get(RamRegion::Fast), 0x10_0000);
        assert_eq!(cfg.ram_limits.get(RamRegion::Bogo), 0x1C_0000);
    }

    #[test]
    fn reinit_policies() {
        assert!(DisplayReinit::FirstRestoreOnly.applies(0));
        assert!(!DisplayReinit::FirstRestoreOnly.applies(1));
        assert!(DisplayReinit::EveryRestore.applies(7));
        assert!(!DisplayReinit::Never.applies(0));
    }
}
