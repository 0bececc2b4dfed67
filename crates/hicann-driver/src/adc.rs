//! ADC connection info resolved from the hardware database.

use std::fmt;
use std::net::Ipv4Addr;

/// USB serial number of an ADC board.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AdcSerial(String);

impl AdcSerial {
    /// Create from the board's serial string.
    pub fn new(serial: impl Into<String>) -> Self {
        Self(serial.into())
    }

    /// The serial string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AdcSerial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether to load the per-board calibration when opening the ADC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CalibrationMode {
    /// Load the stored calibration (default).
    #[default]
    LoadCalibration,
    /// Use the raw transfer function.
    NoCalibration,
}

/// Everything needed to record one analog channel of a HICANN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdcConfig {
    /// The ADC board.
    pub coord: AdcSerial,
    /// Input channel on the board.
    pub channel: u8,
    /// Trigger input on the board.
    pub trigger: u8,
    /// Calibration handling.
    pub load_calibration: CalibrationMode,
    /// Remote access endpoint, if the board hangs off another host.
    pub remote: Option<(Ipv4Addr, u16)>,
}
