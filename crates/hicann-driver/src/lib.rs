//! Staged configuration, readback verification and link bring-up for
//! HICANN wafer systems.
//!
//! The flow every tool follows:
//!
//! ```text
//! YAML hardware database ──┐
//!                          ▼
//! WaferData (staged) ── connect ──→ WaferConnection (one link per reticle)
//!                          │
//!                    configure(&configurator)     apply, FPGA before HICANN
//!                          │
//!                    configure(&VerifyConfigurator)   read back and diff
//!                          │
//!                    DefectStore                  persist what is broken
//! ```
//!
//! # Quick start
//!
//! ```no_run
//! use hicann_chip::{HicannOnWafer, Wafer};
//! use hicann_driver::prelude::*;
//!
//! # fn main() -> hicann_driver::Result<()> {
//! let db = HardwareDb::open("hwdb.yaml")?;
//! let mut wafer = WaferData::new(Wafer::new(3));
//! wafer.hicann_mut(HicannOnWafer::new(88).expect("valid coordinate"));
//!
//! let connector = SimConnector::new();
//! let mut conn = wafer.connect(&db, &connector)?;
//! configure(&wafer, &mut conn, &HicannConfigurator::new())?;
//!
//! let verify = VerifyConfigurator::new();
//! configure(&wafer, &mut conn, &verify)?;
//! println!("{} mismatches", verify.error_count(false));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

pub mod adc;
pub mod backend;
pub mod backends;
pub mod bringup;
pub mod configure;
pub mod data;
pub mod defects;
mod error;
pub mod hwdb;
pub mod settings;
pub mod verify;
pub mod wafer;

pub use adc::{AdcConfig, AdcSerial, CalibrationMode};
pub use backend::{ChipLink, Connector, LinkMode};
pub use backends::{SimConnector, SimLink};
pub use bringup::{run_bringup, LinkOps, LinkState, ProcessLinkOps};
pub use configure::{
    configure, ConfigStep, Configurator, HicannConfigurator, JustResetConfigurator,
    NopConfigurator, CONFIG_ORDER,
};
pub use data::{Block, FpgaData, HicannData, Subsystem};
pub use defects::{DefectStore, FpgaDefects, WaferDefects};
pub use error::{DriverError, Result};
pub use hwdb::HardwareDb;
pub use settings::Settings;
pub use verify::{VerificationResult, VerifyConfigurator, VERIFY_ORDER};
pub use wafer::{FpgaLink, WaferConnection, WaferData};

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        configure, run_bringup, Configurator, DefectStore, DriverError, HardwareDb,
        HicannConfigurator, JustResetConfigurator, LinkOps, LinkState, Result, Settings,
        SimConnector, VerifyConfigurator, WaferConnection, WaferData,
    };
}
