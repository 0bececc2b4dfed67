//! In-memory reticle transport.
//!
//! [`SimLink`] keeps every written block per HICANN slot and answers
//! readback from that store, so configure-then-verify runs end to end
//! without hardware. Tests inspect the recorded event log through the
//! [`SimConnector`] that opened the link.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

use tracing::debug;

use hicann_chip::{FpgaGlobal, HicannOnDnc};

use crate::backend::{ChipLink, Connector, LinkMode};
use crate::data::{Block, Subsystem};
use crate::error::{DriverError, Result};

/// One transport-level operation, recorded in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Reticle reset.
    Reset,
    /// Channel bring-up for one slot.
    BringUp {
        /// HICANN slot.
        slot: HicannOnDnc,
        /// Channel used.
        mode: LinkMode,
    },
    /// Block transfer to one slot.
    Write {
        /// HICANN slot.
        slot: HicannOnDnc,
        /// Subsystem written.
        subsystem: Subsystem,
    },
}

/// Mirrored state of one simulated reticle.
#[derive(Debug, Default)]
pub struct SimState {
    /// Operations in the order the link saw them.
    pub events: Vec<LinkEvent>,
    /// Last written block per (slot, subsystem).
    pub blocks: BTreeMap<(u8, Subsystem), Block>,
    /// Slots whose highspeed channel refuses to come up.
    pub broken_highspeed: Vec<HicannOnDnc>,
}

/// In-memory link to one reticle.
#[derive(Debug)]
pub struct SimLink {
    fpga: FpgaGlobal,
    state: Arc<Mutex<SimState>>,
}

impl SimLink {
    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        // A poisoned mutex means a configuration thread panicked; the
        // mirrored state is gone either way.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl ChipLink for SimLink {
    fn reset(&mut self) -> Result<()> {
        debug!("{}: reset", self.fpga);
        let mut state = self.lock();
        state.blocks.clear();
        state.events.push(LinkEvent::Reset);
        Ok(())
    }

    fn bring_up(&mut self, slot: HicannOnDnc, mode: LinkMode) -> Result<()> {
        let mut state = self.lock();
        if mode == LinkMode::Highspeed && state.broken_highspeed.contains(&slot) {
            return Err(DriverError::transfer_failed(format!(
                "{} slot {slot}: highspeed channel did not lock",
                self.fpga
            )));
        }
        debug!("{} slot {slot}: bring up via {mode}", self.fpga);
        state.events.push(LinkEvent::BringUp { slot, mode });
        Ok(())
    }

    fn write_block(&mut self, slot: HicannOnDnc, block: Block) -> Result<()> {
        let subsystem = block.subsystem();
        let mut state = self.lock();
        state.events.push(LinkEvent::Write { slot, subsystem });
        state.blocks.insert((slot.value(), subsystem), block);
        Ok(())
    }

    fn read_block(&self, slot: HicannOnDnc, subsystem: Subsystem) -> Result<Block> {
        let state = self.lock();
        state
            .blocks
            .get(&(slot.value(), subsystem))
            .cloned()
            .ok_or(DriverError::BlockNotWritten {
                hicann: slot,
                subsystem,
            })
    }
}

/// Opens [`SimLink`]s and keeps a handle to every opened reticle's state.
#[derive(Debug, Default)]
pub struct SimConnector {
    fleet: Mutex<BTreeMap<FpgaGlobal, Arc<Mutex<SimState>>>>,
}

impl SimConnector {
    /// Create a connector with no open links.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirrored state of an opened reticle, if any.
    pub fn state(&self, fpga: FpgaGlobal) -> Option<Arc<Mutex<SimState>>> {
        self.fleet
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&fpga)
            .cloned()
    }

    /// Mark one slot's highspeed channel as broken before connecting.
    pub fn break_highspeed(&self, fpga: FpgaGlobal, slot: HicannOnDnc) {
        let state = self
            .fleet
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .entry(fpga)
            .or_default()
            .clone();
        state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .broken_highspeed
            .push(slot);
    }
}

impl Connector for SimConnector {
    fn open(&self, fpga: FpgaGlobal, ip: Ipv4Addr) -> Result<Box<dyn ChipLink>> {
        debug!("{fpga}: opening simulated link ({ip})");
        let state = self
            .fleet
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .entry(fpga)
            .or_default()
            .clone();
        Ok(Box::new(SimLink { fpga, state }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hicann_chip::{FpgaOnWafer, Wafer};

    fn fpga() -> FpgaGlobal {
        FpgaOnWafer::new(0).unwrap().global(Wafer::new(0))
    }

    fn slot(s: u8) -> HicannOnDnc {
        HicannOnDnc::new(s).unwrap()
    }

    #[test]
    fn readback_returns_last_written_block() {
        let connector = SimConnector::new();
        let mut link = connector.open(fpga(), Ipv4Addr::LOCALHOST).unwrap();
        link.write_block(slot(0), Block::Phase(0)).unwrap();
        link.write_block(slot(0), Block::Phase(3)).unwrap();
        assert_eq!(
            link.read_block(slot(0), Subsystem::Phase).unwrap(),
            Block::Phase(3)
        );
    }

    #[test]
    fn readback_of_unwritten_block_is_an_error() {
        let connector = SimConnector::new();
        let link = connector.open(fpga(), Ipv4Addr::LOCALHOST).unwrap();
        assert!(matches!(
            link.read_block(slot(1), Subsystem::Phase),
            Err(DriverError::BlockNotWritten { .. })
        ));
    }

    #[test]
    fn reset_clears_written_state() {
        let connector = SimConnector::new();
        let mut link = connector.open(fpga(), Ipv4Addr::LOCALHOST).unwrap();
        link.write_block(slot(0), Block::Phase(1)).unwrap();
        link.reset().unwrap();
        assert!(link.read_block(slot(0), Subsystem::Phase).is_err());
    }

    #[test]
    fn broken_highspeed_rejects_bring_up() {
        let connector = SimConnector::new();
        connector.break_highspeed(fpga(), slot(2));
        let mut link = connector.open(fpga(), Ipv4Addr::LOCALHOST).unwrap();
        assert!(link.bring_up(slot(2), LinkMode::Highspeed).is_err());
        assert!(link.bring_up(slot(2), LinkMode::Jtag).is_ok());
        assert!(link.bring_up(slot(3), LinkMode::Highspeed).is_ok());
    }
}
