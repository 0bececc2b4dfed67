//! Link abstraction for reticle transports.
//!
//! A [`ChipLink`] is one open connection to one FPGA and the eight HICANNs
//! behind it. The real transports live in the lab; the in-repo
//! implementation is [`crate::backends::SimLink`], which mirrors written
//! state in memory and answers readback from it.

use std::net::Ipv4Addr;

use hicann_chip::{FpgaGlobal, HicannOnDnc};

use crate::data::{Block, Subsystem};
use crate::error::Result;

/// Which physical channel configures a HICANN.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMode {
    /// Fast serial link, less robust.
    Highspeed,
    /// Slow scan chain, works when the highspeed link does not.
    Jtag,
}

impl std::fmt::Display for LinkMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Highspeed => f.write_str("highspeed"),
            Self::Jtag => f.write_str("jtag"),
        }
    }
}

/// One open transport to a reticle.
pub trait ChipLink: Send {
    /// Reset the FPGA and all HICANNs behind it, clearing partial state.
    /// Idempotent.
    fn reset(&mut self) -> Result<()>;

    /// Bring up the channel to one HICANN slot.
    fn bring_up(&mut self, slot: HicannOnDnc, mode: LinkMode) -> Result<()>;

    /// Transfer one subsystem's configuration to a HICANN.
    fn write_block(&mut self, slot: HicannOnDnc, block: Block) -> Result<()>;

    /// Read one subsystem's configuration back from a HICANN.
    fn read_block(&self, slot: HicannOnDnc, subsystem: Subsystem) -> Result<Block>;
}

/// Opens [`ChipLink`]s during wafer connection.
pub trait Connector {
    /// Open a link to the given FPGA at the given address.
    fn open(&self, fpga: FpgaGlobal, ip: Ipv4Addr) -> Result<Box<dyn ChipLink>>;
}
