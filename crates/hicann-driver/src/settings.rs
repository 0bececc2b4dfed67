//! Explicit run configuration.
//!
//! There is deliberately no process-wide settings object; a [`Settings`]
//! value is built once (by the CLI, from flags and environment) and passed
//! to whatever needs it.

use std::path::PathBuf;

/// Limits for crossbar switch usage per L1 bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrossbarSwitchLimits {
    /// Maximum set switches per row.
    pub max_switches_per_row: usize,
    /// Maximum set switches per column.
    pub max_switches_per_column: usize,
}

impl Default for CrossbarSwitchLimits {
    fn default() -> Self {
        Self {
            max_switches_per_row: 1,
            max_switches_per_column: 1,
        }
    }
}

/// Limits for synapse switch usage per L1 bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynapseSwitchLimits {
    /// Maximum set switches per row.
    pub max_switches_per_row: usize,
    /// Maximum set switches per column and side.
    pub max_switches_per_column_per_side: usize,
}

impl Default for SynapseSwitchLimits {
    fn default() -> Self {
        Self {
            max_switches_per_row: 1,
            max_switches_per_column_per_side: 1,
        }
    }
}

/// Run configuration shared by the tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Path to the YAML hardware database.
    pub hwdb_path: PathBuf,
    /// Root directory of the defect store.
    pub defects_path: PathBuf,
    /// Crossbar switch limits.
    pub crossbar_switches: CrossbarSwitchLimits,
    /// Synapse switch limits.
    pub synapse_switches: SynapseSwitchLimits,
    /// JTAG TCK frequency in Hz.
    pub jtag_frequency_hz: u32,
    /// PLL frequency in MHz used when programming chips.
    pub pll_frequency_mhz: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            hwdb_path: PathBuf::from("hwdb.yaml"),
            defects_path: PathBuf::from("defects"),
            crossbar_switches: CrossbarSwitchLimits::default(),
            synapse_switches: SynapseSwitchLimits::default(),
            jtag_frequency_hz: 10_000_000,
            pll_frequency_mhz: 125,
        }
    }
}

impl Settings {
    /// Default settings with `HICANN_HWDB_PATH` / `HICANN_DEFECTS_PATH`
    /// environment overrides applied. Called by the CLI only; the library
    /// never reads the environment on its own.
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Ok(path) = std::env::var("HICANN_HWDB_PATH") {
            settings.hwdb_path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("HICANN_DEFECTS_PATH") {
            settings.defects_path = PathBuf::from(path);
        }
        settings
    }
}
