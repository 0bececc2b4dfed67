//! Error types for driver operations.

use std::path::PathBuf;

use thiserror::Error;

use hicann_chip::{AnalogOnHicann, FpgaGlobal, HicannGlobal, HicannOnDnc, Wafer};

use crate::data::Subsystem;

/// Result type alias for driver operations.
pub type Result<T> = std::result::Result<T, DriverError>;

/// Errors that can occur while staging, applying or verifying configuration.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Wafer is not registered in the hardware database.
    #[error("wafer {wafer} not in hardware database")]
    WaferNotFound {
        /// Looked-up wafer.
        wafer: Wafer,
    },

    /// FPGA is not registered in the hardware database.
    #[error("FPGA {fpga} not in hardware database")]
    FpgaNotFound {
        /// Looked-up FPGA.
        fpga: FpgaGlobal,
    },

    /// HICANN is not registered in the hardware database.
    #[error("HICANN {hicann} not in hardware database")]
    HicannNotFound {
        /// Looked-up HICANN.
        hicann: HicannGlobal,
    },

    /// No ADC is registered for the HICANN/analog-channel pair.
    #[error("no ADC registered for {hicann} channel {analog}")]
    AdcNotFound {
        /// Looked-up HICANN.
        hicann: HicannGlobal,
        /// Looked-up analog channel.
        analog: AnalogOnHicann,
    },

    /// The hardware database file is malformed.
    #[error("invalid hardware database: {reason}")]
    InvalidDatabase {
        /// What is wrong with the file.
        reason: String,
    },

    /// A subsystem is read back before it was ever written.
    #[error("{subsystem} of HICANN slot {hicann} was never written")]
    BlockNotWritten {
        /// HICANN slot on the link's reticle.
        hicann: HicannOnDnc,
        /// Subsystem that was requested.
        subsystem: Subsystem,
    },

    /// The link to an FPGA is not open.
    #[error("no open link to {fpga}")]
    NotConnected {
        /// FPGA without a link.
        fpga: FpgaGlobal,
    },

    /// Data transfer over a link failed.
    #[error("transfer failed: {reason}")]
    TransferFailed {
        /// Reason for failure.
        reason: String,
    },

    /// A bring-up subprocess could not be spawned or waited for.
    #[error("bring-up command {command:?} failed: {source}")]
    BringupCommand {
        /// The command that failed.
        command: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The defect store could not be read or written.
    #[error("defect store {path}: {reason}")]
    DefectStore {
        /// Store file involved.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// I/O error.
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// YAML (de)serialization error.
    #[error("YAML error: {source}")]
    Yaml {
        /// Underlying serde error.
        #[from]
        source: serde_yaml::Error,
    },
}

impl DriverError {
    /// Create a transfer failed error.
    pub fn transfer_failed(reason: impl Into<String>) -> Self {
        Self::TransferFailed {
            reason: reason.into(),
        }
    }

    /// Create an invalid database error.
    pub fn invalid_database(reason: impl Into<String>) -> Self {
        Self::InvalidDatabase {
            reason: reason.into(),
        }
    }
}
