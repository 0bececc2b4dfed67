//! Link bring-up with JTAG fallback.
//!
//! Decides, for one HICANN, whether it is reachable via the highspeed
//! channel, the JTAG fallback, or not at all, and persists that decision:
//!
//! ```text
//! reset → highspeed ──ok──────────────────────────→ HighspeedOk
//!            │fail
//!         reset → jtag ──ok──→ disable hs link  ──→ HighspeedFailedJtagOk
//!                   │fail
//!                   └────────→ disable HICANN   ──→ BothFailed
//! ```
//!
//! The JTAG attempt only runs after a highspeed failure: highspeed is
//! fast, JTAG is slow, so the fallback is lazy. Persistence failures abort
//! the run; a bring-up decision must never be lost silently.

use std::fmt;
use std::path::PathBuf;
use std::process::Command;

use tracing::{info, warn};

use hicann_chip::HicannGlobal;

use crate::defects::DefectStore;
use crate::error::{DriverError, Result};

/// Disposition of one link after a bring-up run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    /// No attempt made yet.
    #[default]
    Untested,
    /// Highspeed channel works; nothing persisted.
    HighspeedOk,
    /// Highspeed failed but JTAG works; highspeed link disabled in the
    /// defect store, the HICANN stays usable in JTAG-only mode.
    HighspeedFailedJtagOk,
    /// Neither channel works; the HICANN is disabled in the defect store.
    BothFailed,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Untested => f.write_str("untested"),
            Self::HighspeedOk => f.write_str("highspeed ok"),
            Self::HighspeedFailedJtagOk => f.write_str("highspeed failed, jtag ok"),
            Self::BothFailed => f.write_str("highspeed and jtag failed"),
        }
    }
}

/// The three operations a bring-up run needs from the outside world.
pub trait LinkOps {
    /// Reset the reticle, clearing partial state. Invoked before every
    /// bring-up attempt so attempts are independent.
    fn reset(&mut self) -> Result<()>;

    /// Attempt highspeed bring-up; true on success.
    fn init_highspeed(&mut self) -> Result<bool>;

    /// Attempt JTAG bring-up; true on success.
    fn init_jtag(&mut self) -> Result<bool>;
}

/// Run the bring-up state machine for one HICANN and persist the outcome.
///
/// Exactly one of the three terminal dispositions is returned. The defect
/// store is written at most once: on `HighspeedFailedJtagOk` the highspeed
/// link is disabled in the FPGA resource, on `BothFailed` the HICANN is
/// disabled in the wafer resource. Both writes are idempotent.
pub fn run_bringup(
    hicann: HicannGlobal,
    ops: &mut dyn LinkOps,
    store: &DefectStore,
) -> Result<LinkState> {
    ops.reset()?;
    if ops.init_highspeed()? {
        info!("{hicann}: highspeed bring-up ok");
        return Ok(LinkState::HighspeedOk);
    }
    warn!("{hicann}: highspeed bring-up failed, falling back to JTAG");

    ops.reset()?;
    if ops.init_jtag()? {
        let mut defects = store.load_fpga(hicann.fpga())?;
        defects.disable(hicann.hicann.highspeed_link());
        store.save_fpga(&defects)?;
        warn!("{hicann}: JTAG ok, highspeed link disabled");
        Ok(LinkState::HighspeedFailedJtagOk)
    } else {
        let mut defects = store.load_wafer(hicann.wafer)?;
        defects.disable(hicann.hicann);
        store.save_wafer(&defects)?;
        warn!("{hicann}: JTAG failed as well, HICANN disabled");
        Ok(LinkState::BothFailed)
    }
}

/// [`LinkOps`] that shells out to the init tooling, exit-status semantics.
///
/// The reset runs the reticle-init tool in FPGA-only mode; the bring-up
/// attempts run the single-chip init with and without `--jtag`. Non-zero
/// exit of an init attempt means failure; the reset's exit status is only
/// logged, matching the historical tooling.
pub struct ProcessLinkOps {
    program: PathBuf,
    reset_args: Vec<String>,
    highspeed_args: Vec<String>,
    jtag_args: Vec<String>,
}

impl ProcessLinkOps {
    /// Build the three command lines for one HICANN.
    pub fn new(
        program: impl Into<PathBuf>,
        hicann: HicannGlobal,
        pll_mhz: u32,
        zero_synapses: bool,
    ) -> Self {
        let wafer = hicann.wafer.value().to_string();
        let chip = hicann.hicann.value().to_string();
        let fpga = hicann.hicann.fpga().value().to_string();

        let reset_args = vec![
            "reticle-init".into(),
            "--wafer".into(),
            wafer.clone(),
            "--fpga".into(),
            fpga,
            "--config-fpga-only".into(),
        ];
        let mut highspeed_args = vec![
            "init".into(),
            "--wafer".into(),
            wafer,
            "--hicann".into(),
            chip,
            "--pll".into(),
            pll_mhz.to_string(),
        ];
        if zero_synapses {
            highspeed_args.push("--zero-synapses".into());
        }
        let mut jtag_args = highspeed_args.clone();
        jtag_args.push("--jtag".into());

        Self {
            program: program.into(),
            reset_args,
            highspeed_args,
            jtag_args,
        }
    }

    fn run(&self, args: &[String]) -> Result<bool> {
        let status = Command::new(&self.program)
            .args(args)
            .status()
            .map_err(|source| DriverError::BringupCommand {
                command: format!("{} {}", self.program.display(), args.join(" ")),
                source,
            })?;
        Ok(status.success())
    }
}

impl LinkOps for ProcessLinkOps {
    fn reset(&mut self) -> Result<()> {
        if !self.run(&self.reset_args)? {
            warn!("reticle reset exited non-zero");
        }
        Ok(())
    }

    fn init_highspeed(&mut self) -> Result<bool> {
        self.run(&self.highspeed_args)
    }

    fn init_jtag(&mut self) -> Result<bool> {
        self.run(&self.jtag_args)
    }
}
